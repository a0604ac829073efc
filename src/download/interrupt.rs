use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Exit status used when a signal ends the process outright.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Ctrl-C / SIGTERM state shared between the signal handler and the
/// downloader. A signal that arrives while a transfer runs only raises the
/// flag so the `.part` file can be dealt with; outside a transfer, or on a
/// second signal, the process exits.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    requested: Arc<AtomicBool>,
    transferring: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the process wide handler.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || {
            if interrupt.signal() {
                eprintln!("Interrupted.");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        })
    }

    /// Records a signal. Returns `true` when the process should exit now.
    pub fn signal(&self) -> bool {
        if !self.transferring.load(Ordering::SeqCst) {
            return true;
        }
        self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Marks a transfer as running until the guard is dropped.
    pub fn transfer(&self) -> TransferGuard<'_> {
        self.transferring.store(true, Ordering::SeqCst);
        TransferGuard { interrupt: self }
    }
}

pub struct TransferGuard<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        self.interrupt.transferring.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_outside_transfer_exits() {
        let interrupt = Interrupt::new();
        assert!(interrupt.signal());
        assert!(!interrupt.requested());
    }

    #[test]
    fn first_signal_during_transfer_only_raises_flag() {
        let interrupt = Interrupt::new();
        let guard = interrupt.transfer();
        assert!(!interrupt.signal());
        assert!(interrupt.requested());
        assert!(interrupt.signal(), "second signal must exit");
        drop(guard);
    }

    #[test]
    fn guard_ends_transfer() {
        let interrupt = Interrupt::new();
        drop(interrupt.transfer());
        assert!(interrupt.signal());
    }

    #[test]
    fn clones_share_state() {
        let interrupt = Interrupt::new();
        let handler_side = interrupt.clone();
        let _guard = interrupt.transfer();
        assert!(!handler_side.signal());
        assert!(interrupt.requested());
    }
}
