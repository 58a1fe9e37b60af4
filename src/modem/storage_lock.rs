use tokio::sync::{Mutex, MutexGuard};

/// Coordinates exclusive access to the modem's two storage banks (mem1 for
/// read/delete, mem2 for write) so a multi-command operation — e.g. storing
/// then immediately sending a part — can't be interleaved with another
/// operation that swaps `AT+CPMS` storage selection out from under it.
///
/// Acquire the guard once for the whole command sequence and drop it on
/// every exit path, success or failure, by simply letting it go out of scope.
#[derive(Default)]
pub struct StorageLocks {
    mem1: Mutex<()>,
    mem2: Mutex<()>,
}

pub struct StorageGuard<'a> {
    _mem1: Option<MutexGuard<'a, ()>>,
    _mem2: Option<MutexGuard<'a, ()>>,
}

impl StorageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read/delete access: locks mem1 only.
    pub async fn lock_read(&self) -> StorageGuard<'_> {
        StorageGuard {
            _mem1: Some(self.mem1.lock().await),
            _mem2: None,
        }
    }

    /// Write access: locks mem2 only.
    pub async fn lock_write(&self) -> StorageGuard<'_> {
        StorageGuard {
            _mem1: None,
            _mem2: Some(self.mem2.lock().await),
        }
    }

    /// Store-then-send and similar sequences that touch both banks.
    pub async fn lock_both(&self) -> StorageGuard<'_> {
        // Fixed lock order (mem1 then mem2) avoids deadlocking against a
        // concurrent lock_read/lock_write pair.
        StorageGuard {
            _mem1: Some(self.mem1.lock().await),
            _mem2: Some(self.mem2.lock().await),
        }
    }
}
