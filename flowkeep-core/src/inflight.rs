//! Tracking of side effects that `drain()` has to wait for.

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;

/// Each drain waits on the current group and installs a fresh one, so the
/// tracker stays usable across batches.
#[derive(Debug, Default)]
pub struct InFlight {
    group: Mutex<WaitGroup>,
}

impl InFlight {
    /// Mark one blob write or record delivery as started. It finishes when
    /// the guard drops.
    pub fn track(&self) -> InFlightGuard {
        InFlightGuard {
            _member: self.group.lock().clone(),
        }
    }

    /// Block until everything tracked before the call has finished.
    pub fn wait_idle(&self) {
        let group = std::mem::take(&mut *self.group.lock());
        group.wait();
    }
}

pub struct InFlightGuard {
    _member: WaitGroup,
}
