use std::sync::atomic::{AtomicBool, Ordering};

/// Lock-free "skip, don't queue" guard.
///
/// A caller that loses the race is turned away immediately instead of
/// waiting, so a slow push never builds a backlog of pending pushes.
#[derive(Debug, Default)]
pub struct SingleFlightGuard {
    held: AtomicBool,
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free -> Held. Returns false without touching the flag if already held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Held -> Free. Must pair with exactly one successful `try_acquire`.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Scoped acquisition: the returned permit releases the flag on drop,
    /// including during unwinding.
    pub fn permit(&self) -> Option<FlightPermit<'_>> {
        self.try_acquire().then(|| FlightPermit { guard: self })
    }
}

/// RAII proof that the holder owns the single flight
#[must_use = "dropping the permit releases the guard immediately"]
pub struct FlightPermit<'a> {
    guard: &'a SingleFlightGuard,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
