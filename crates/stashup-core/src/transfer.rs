use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What the user asked an active transfer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSignal {
    Continue,
    Pause,
    Cancel,
}

impl TransferSignal {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransferSignal::Pause,
            2 => TransferSignal::Cancel,
            _ => TransferSignal::Continue,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransferSignal::Continue => 0,
            TransferSignal::Pause => 1,
            TransferSignal::Cancel => 2,
        }
    }
}

/// Shared flag checked by the stash transfer between chunks.
///
/// Clones observe the same flag. Cancel wins over pause: once cancelled, a later
/// pause request is ignored.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    signal: Arc<AtomicU8>,
}

impl TransferHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let _ = self.signal.compare_exchange(
            TransferSignal::Continue.as_u8(),
            TransferSignal::Pause.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn cancel(&self) {
        self.signal
            .store(TransferSignal::Cancel.as_u8(), Ordering::SeqCst);
    }

    pub fn signal(&self) -> TransferSignal {
        TransferSignal::from_u8(self.signal.load(Ordering::SeqCst))
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal() != TransferSignal::Continue
    }
}
