use crate::opcode::Opcode;

/// The behavioural contract every virtual device implements. One call
/// performs one step of a possibly multi-step operation; the returned opcode
/// is the continuation: the operation's own opcode while more bytes are
/// expected, `Opcode::NoOp` once it has completed.
///
/// On a read, a device that has nothing to say leaves the byte slot
/// untouched and returns `NoOp`.
pub trait Device {
    fn read(&mut self, opcode: Opcode, byte: &mut u8) -> Opcode;
    fn write(&mut self, opcode: Opcode, byte: u8) -> Opcode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active { op: Opcode, count: u16 },
}

/// Per-device transfer progress. Tracks which operation is in flight and how
/// many bytes of it have been exchanged, so that a multi-byte operation can
/// be reassembled from single-byte bus accesses. Seeing a different opcode
/// than the active one abandons the old operation and starts fresh; the
/// caller is responsible for completing operations in full.
#[derive(Debug, Default)]
pub struct Session {
    phase: Phase,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

impl Session {
    pub fn new() -> Self {
        Session { phase: Phase::Idle }
    }

    /// Enter a step of the given operation, returning its 0-based byte index.
    /// A fresh operation (idle, or a different opcode active) starts at 0.
    pub fn step(&mut self, op: Opcode) -> u16 {
        match self.phase {
            Phase::Active { op: active, count } if active == op => count,
            _ => {
                self.phase = Phase::Active { op, count: 0 };
                0
            }
        }
    }

    /// Mark the current step consumed; the next `step` call continues at the
    /// following byte index.
    pub fn advance(&mut self) {
        if let Phase::Active { count, .. } = &mut self.phase {
            *count += 1;
        }
    }

    /// Complete the current operation and return to idle.
    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
    }

    /// The continuation opcode to hand back over the bus.
    pub fn continuation(&self) -> Opcode {
        match self.phase {
            Phase::Idle => Opcode::NoOp,
            Phase::Active { op, .. } => op,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.phase != Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_operation_starts_at_zero() {
        let mut session = Session::new();
        assert!(!session.in_progress());
        assert_eq!(session.step(Opcode::WriteSect), 0);
        assert_eq!(session.continuation(), Opcode::WriteSect);
        assert!(session.in_progress());
    }

    #[test]
    fn test_advance_counts_steps() {
        let mut session = Session::new();
        for expected in 0..5 {
            assert_eq!(session.step(Opcode::ReadSect), expected);
            session.advance();
        }
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let mut session = Session::new();
        session.step(Opcode::SelTrack);
        session.advance();
        session.finish();
        assert_eq!(session.continuation(), Opcode::NoOp);
        // The same opcode afterwards is a fresh operation.
        assert_eq!(session.step(Opcode::SelTrack), 0);
    }

    #[test]
    fn test_different_opcode_abandons_operation() {
        let mut session = Session::new();
        session.step(Opcode::WriteSect);
        session.advance();
        session.advance();
        assert_eq!(session.step(Opcode::WriteSect), 2);
        // A new opcode mid-flight restarts the counter.
        assert_eq!(session.step(Opcode::SelTrack), 0);
        assert_eq!(session.continuation(), Opcode::SelTrack);
    }
}
