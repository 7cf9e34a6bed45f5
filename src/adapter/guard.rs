//! Single-flight initialization guard.
//!
//! Owned by the composition root and handed to whatever must initialise once
//! per process (the aggregator). Concurrent callers wait on the same attempt;
//! a failed attempt leaves the guard open so a later call can retry.

use crate::error::WalletResult;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Clone, Default)]
pub struct InitGuard {
    cell: Arc<OnceCell<()>>,
    runs: Arc<AtomicUsize>,
}

impl InitGuard {
    pub fn new() -> Self { Self::default() }

    pub async fn ensure<F, Fut>(&self, init: F) -> WalletResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WalletResult<()>>,
    {
        let runs = &self.runs;
        self.cell
            .get_or_try_init(|| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                init().await
            })
            .await
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool { self.cell.initialized() }

    /// Number of times the init closure actually ran.
    pub fn runs(&self) -> usize { self.runs.load(Ordering::SeqCst) }
}
