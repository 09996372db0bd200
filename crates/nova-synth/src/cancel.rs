use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{SynthError, SynthResult};

#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(SynthError::Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> SynthResult<()> {
        if self.is_cancelled() {
            Err(SynthError::Cancelled)
        } else {
            Ok(())
        }
    }
}
