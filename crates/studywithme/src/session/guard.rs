use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Kind of backend round-trip currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Chat = 1,
    Image = 2,
    QuizStart = 3,
    QuizAnswer = 4,
}

impl Operation {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Operation::Chat),
            2 => Some(Operation::Image),
            3 => Some(Operation::QuizStart),
            4 => Some(Operation::QuizAnswer),
            _ => None,
        }
    }
}

/// Single in-flight slot shared by every round-trip that mutates the
/// transcript or the quiz ledger. Flag reports only count toward busy;
/// they never take the slot.
#[derive(Debug, Default)]
pub struct InFlight {
    slot: AtomicU8,
    flags: AtomicUsize,
}

impl InFlight {
    pub fn try_begin(&self, op: Operation) -> Option<InFlightGuard<'_>> {
        self.slot
            .compare_exchange(0, op as u8, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { slot: &self.slot })
    }

    pub fn current(&self) -> Option<Operation> {
        Operation::from_u8(self.slot.load(Ordering::Acquire))
    }

    pub fn begin_flag(&self) -> FlagGuard<'_> {
        self.flags.fetch_add(1, Ordering::AcqRel);
        FlagGuard { count: &self.flags }
    }

    pub fn flags_outstanding(&self) -> usize {
        self.flags.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some() || self.flags_outstanding() > 0
    }
}

/// Releases the slot when dropped, on success, failure or cancellation.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    slot: &'a AtomicU8,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct FlagGuard<'a> {
    count: &'a AtomicUsize,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}
