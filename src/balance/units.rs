//! Quantity parsing and unit formatting for native balances.

/// Parse a JSON-RPC hex quantity (`0x1bc16d674ec80000`). Rejects empty or signed digits
/// and values that do not fit in 128 bits.
pub fn parse_quantity(raw: &str) -> Option<u128> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    // from_str_radix tolerates a leading sign; a quantity never carries one.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(0);
    }
    if significant.len() > 32 {
        return None;
    }
    u128::from_str_radix(significant, 16).ok()
}

/// Exact decimal rendering of `amount` smallest units at `decimals` precision,
/// trailing fractional zeros removed: `1234500000000000000` @18 -> `1.2345`.
pub fn format_units(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let digits = amount.to_string();
    let decimals = decimals as usize;
    let (whole, frac) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() { whole } else { format!("{whole}.{frac}") }
}

/// Truncate a decimal string to `places` fractional digits, padding with zeros.
pub fn truncate_decimal(value: &str, places: usize) -> String {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    if places == 0 {
        return whole.to_string();
    }
    let mut frac: String = frac.chars().take(places).collect();
    while frac.len() < places {
        frac.push('0');
    }
    format!("{whole}.{frac}")
}
