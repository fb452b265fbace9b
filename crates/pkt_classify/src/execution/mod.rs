//! Packet Classification
//!
//! Matching engines that run a program against packet bytes and report the
//! output port.
//!
//! | Engine | Program form | Use |
//! |--------|--------------|-----|
//! | [`Program`](crate::bytecode::program::Program) | editable DAG | reference semantics, tests |
//! | [`CompressedProgram`](crate::bytecode::compressed::CompressedProgram) | packed words | packet hot path |
//! | [`SharedClassifier`] | swappable compressed program | concurrent readers with reloads |
//!
//! Matching never fails. A packet that reaches no output, including one
//! run through a malformed program, classifies as [`DROP_PORT`].
//!
//! # Short Packets
//!
//! Packets shorter than the program's safe length take the length-checked
//! path: any test that needs bytes beyond the packet takes its short branch
//! without reading.

mod interpreter;
mod shared;

pub use crate::bytecode::jump::DROP_PORT;
pub use shared::SharedClassifier;

/// Trait for classification engines.
pub trait Classify {
    /// Classify `packet` and return its output port.
    ///
    /// `packet` starts at the first packet byte; instruction offsets are
    /// relative to the aligned frame `align_offset` bytes earlier.
    fn classify(&self, packet: &[u8]) -> u32;
}
