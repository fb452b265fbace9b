//! Classification Program Representation
//!
//! A [`Program`] is a forward-only decision DAG of [`Insn`]s. Matching
//! starts at instruction 0 and follows branches until one ends on an output
//! port. A program with no instructions sends every packet to
//! `output_everything`.
//!
//! Programs are built with the subtree cursor in [`super::tree`], then
//! [`optimize`](Program::optimize)d and compiled into a
//! [`CompressedProgram`](super::compressed::CompressedProgram).

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use thiserror::Error;

use super::insn::Insn;
use super::jump::{DROP_PORT, Jump};
use crate::config::OFFSET_MAX;
use crate::optimizer::cfg;

/// Errors for structurally invalid programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("instruction {insn_idx} still jumps to placeholder {jump}")]
    UnresolvedJump { insn_idx: usize, jump: Jump },
    #[error("instruction {insn_idx} jumps to {target}, past the end of a {len}-instruction program")]
    JumpOutOfRange {
        insn_idx: usize,
        target: usize,
        len: usize,
    },
    #[error("instruction {insn_idx} jumps backward to {target}")]
    BackwardJump { insn_idx: usize, target: usize },
    #[error("instruction {insn_idx} outputs to invalid port {port}")]
    PortOutOfRange { insn_idx: usize, port: u32 },
    #[error("instruction {insn_idx} tests offset {offset}, beyond the encodable range")]
    OffsetOutOfRange { insn_idx: usize, offset: u32 },
    #[error("whole-program output {0} is not a port")]
    InvalidOutput(Jump),
    #[error("compressed program of {words} words is too large")]
    ProgramTooLarge { words: usize },
}

/// Result alias for program construction and compilation.
pub type ProgramResult<T> = Result<T, ProgramError>;

/// A wordwise classification program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    insns: Vec<Insn>,
    /// Where every packet goes when `insns` is empty.
    output_everything: Option<Jump>,
    /// Packets at least this long never hit a short branch.
    safe_length: u32,
    /// Bytes between the aligned frame start and the packet's first byte.
    align_offset: u32,
}

impl Program {
    /// Create an empty program that drops every packet.
    pub const fn new() -> Self {
        Self {
            insns: Vec::new(),
            output_everything: Some(Jump::Never),
            safe_length: u32::MAX,
            align_offset: 0,
        }
    }

    /// Builder-style setter for the alignment offset.
    ///
    /// Instruction offsets are expressed in the aligned frame, which starts
    /// `align_offset` bytes before the packet data.
    pub const fn with_align_offset(mut self, align_offset: u32) -> Self {
        self.align_offset = align_offset;
        self
    }

    #[inline]
    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    #[inline]
    pub fn insn(&self, idx: usize) -> Option<&Insn> {
        self.insns.get(idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Destination of every packet, set only when the program is empty or
    /// before any instruction has been added.
    #[inline]
    pub const fn output_everything(&self) -> Option<Jump> {
        self.output_everything
    }

    #[inline]
    pub const fn safe_length(&self) -> u32 {
        self.safe_length
    }

    #[inline]
    pub const fn align_offset(&self) -> u32 {
        self.align_offset
    }

    pub(crate) fn insns_mut(&mut self) -> &mut Vec<Insn> {
        &mut self.insns
    }

    pub(crate) fn set_output_everything(&mut self, output: Option<Jump>) {
        self.output_everything = output;
    }

    pub(crate) fn set_safe_length(&mut self, safe_length: u32) {
        self.safe_length = safe_length;
    }

    /// Append a ready-made instruction and return its index.
    pub fn add_raw_insn(&mut self, insn: Insn) -> usize {
        self.insns.push(insn);
        self.output_everything = None;
        self.safe_length = u32::MAX;
        self.insns.len() - 1
    }

    /// Resolve every remaining [`Jump::Failure`] to `failure`.
    pub fn set_failure(&mut self, failure: Jump) {
        if self.output_everything == Some(Jump::Failure) {
            self.output_everything = Some(failure);
        }
        for insn in &mut self.insns {
            for jump in &mut insn.j {
                if *jump == Jump::Failure {
                    *jump = failure;
                }
            }
        }
    }

    /// Append `next` as an alternative: packets that fail this program are
    /// classified by `next`.
    ///
    /// This program must already be finished except for its failure jumps.
    /// If it sends every packet to a port, `next` is unreachable and ignored.
    pub fn add_or_program(&mut self, next: &Program) {
        match self.output_everything {
            Some(Jump::Failure) if self.insns.is_empty() => {
                self.insns = next.insns.clone();
                self.output_everything = next.output_everything;
            }
            None | Some(Jump::Failure) => {
                let base = self.insns.len();
                let failure = next.output_everything.unwrap_or(Jump::Step(base));
                self.set_failure(failure);
                if next.output_everything.is_none() {
                    self.insns
                        .extend(next.insns.iter().map(|insn| insn.offset_by(base)));
                }
            }
            Some(_) => return,
        }
        self.safe_length = u32::MAX;
    }

    /// Check that the program can be optimized, compiled and matched.
    ///
    /// # Errors
    /// Returns the first structural problem found: unresolved placeholders,
    /// non-forward or out-of-range steps, invalid ports or offsets.
    pub fn validate(&self) -> ProgramResult<()> {
        let len = self.insns.len();
        for (insn_idx, insn) in self.insns.iter().enumerate() {
            if insn.offset > OFFSET_MAX {
                return Err(ProgramError::OffsetOutOfRange {
                    insn_idx,
                    offset: insn.offset,
                });
            }
            for jump in insn.j {
                match jump {
                    Jump::Step(target) if target <= insn_idx => {
                        return Err(ProgramError::BackwardJump { insn_idx, target });
                    }
                    Jump::Step(target) if target >= len => {
                        return Err(ProgramError::JumpOutOfRange {
                            insn_idx,
                            target,
                            len,
                        });
                    }
                    Jump::Output(port) if port >= DROP_PORT => {
                        return Err(ProgramError::PortOutOfRange { insn_idx, port });
                    }
                    jump if jump.is_placeholder() => {
                        return Err(ProgramError::UnresolvedJump { insn_idx, jump });
                    }
                    _ => {}
                }
            }
        }

        match self.output_everything {
            Some(jump) if jump.is_step() || jump.is_placeholder() => {
                Err(ProgramError::InvalidOutput(jump))
            }
            Some(jump @ Jump::Output(port)) if port >= DROP_PORT => {
                Err(ProgramError::InvalidOutput(jump))
            }
            _ => Ok(()),
        }
    }

    /// For each instruction, how many branches lead to it.
    pub fn count_inbranches(&self) -> Vec<cfg::InBranch> {
        cfg::count_inbranches(&self.insns)
    }

    /// Ports below `noutputs` that no packet can reach.
    pub fn unused_outputs(&self, noutputs: u32) -> Vec<u32> {
        let used = match self.output_everything {
            Some(jump) if self.insns.is_empty() => jump.port().into_iter().collect(),
            _ => cfg::reachable_ports(&self.insns),
        };
        (0..noutputs).filter(|port| !used.contains(port)).collect()
    }

    /// Log a warning for every unreachable output below `noutputs` and
    /// return them.
    pub fn warn_unused_outputs(&self, noutputs: u32) -> Vec<u32> {
        let unused = self.unused_outputs(noutputs);
        for port in &unused {
            log::warn!("output {port} matches no packets");
        }
        unused
    }

    /// Human-readable listing of the program.
    pub fn unparse(&self) -> String {
        self.to_string()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, insn) in self.insns.iter().enumerate() {
            let mut shown = *insn;
            shown.offset = shown.offset.wrapping_sub(self.align_offset);
            writeln!(f, "{idx:>2} {shown}")?;
        }
        if self.insns.is_empty() {
            writeln!(f, "all->{}", self.output_everything.unwrap_or(Jump::Never))?;
        }
        writeln!(f, "safe length {}", self.safe_length)?;
        writeln!(f, "alignment offset {}", self.align_offset)
    }
}
