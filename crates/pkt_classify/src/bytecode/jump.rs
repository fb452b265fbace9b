//! Branch Targets
//!
//! Every instruction has two branches. A branch either steps forward to
//! another instruction or ends classification on an output port.

use core::fmt;

/// Port reported for packets that match no pattern.
pub const DROP_PORT: u32 = 0x7FFF_FFFF;

/// Target of an instruction branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Jump {
    /// Continue at the instruction with this index.
    Step(usize),
    /// Classification ends on this output port.
    Output(u32),
    /// The packet is dropped.
    Never,
    /// Placeholder for "the enclosing subtree failed".
    Failure,
    /// Placeholder for "the enclosing subtree succeeded".
    Success,
}

impl Jump {
    /// Target instruction of a step.
    #[inline]
    pub const fn step(self) -> Option<usize> {
        match self {
            Self::Step(target) => Some(target),
            _ => None,
        }
    }

    /// Check if this branch continues to another instruction.
    #[inline]
    pub const fn is_step(self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Check if this is a construction-time placeholder.
    #[inline]
    pub const fn is_placeholder(self) -> bool {
        matches!(self, Self::Failure | Self::Success)
    }

    /// Output port of a terminal branch.
    ///
    /// `Never` reports [`DROP_PORT`]. Steps and placeholders have no port.
    #[inline]
    pub const fn port(self) -> Option<u32> {
        match self {
            Self::Output(port) => Some(port),
            Self::Never => Some(DROP_PORT),
            _ => None,
        }
    }

    /// Shift a step target by `by` instructions.
    #[inline]
    pub const fn offset_by(self, by: usize) -> Self {
        match self {
            Self::Step(target) => Self::Step(target + by),
            other => other,
        }
    }

    /// The placeholder-swapped jump used by subtree negation.
    #[inline]
    pub(crate) const fn negated(self) -> Self {
        match self {
            Self::Failure => Self::Success,
            Self::Success => Self::Failure,
            other => other,
        }
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(target) => write!(f, "step {target}"),
            Self::Output(port) => write!(f, "[{port}]"),
            Self::Never => f.write_str("[X]"),
            Self::Failure => f.write_str("[-]"),
            Self::Success => f.write_str("[+]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn display_forms() {
        assert_eq!(format!("{}", Jump::Step(3)), "step 3");
        assert_eq!(format!("{}", Jump::Output(2)), "[2]");
        assert_eq!(format!("{}", Jump::Never), "[X]");
        assert_eq!(format!("{}", Jump::Failure), "[-]");
        assert_eq!(format!("{}", Jump::Success), "[+]");
    }

    #[test]
    fn ports_and_steps() {
        assert_eq!(Jump::Output(5).port(), Some(5));
        assert_eq!(Jump::Never.port(), Some(DROP_PORT));
        assert_eq!(Jump::Step(1).port(), None);
        assert_eq!(Jump::Step(1).offset_by(4), Jump::Step(5));
        assert_eq!(Jump::Output(1).offset_by(4), Jump::Output(1));
        assert_eq!(Jump::Failure.negated(), Jump::Success);
        assert!(Jump::Success.is_placeholder());
        assert!(!Jump::Never.is_placeholder());
    }
}
