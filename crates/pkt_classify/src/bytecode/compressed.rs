//! Compressed Program Encoding
//!
//! A [`CompressedProgram`] packs an optimized [`Program`] into a flat array
//! of 32-bit words for fast matching. Chains of tests that differ only in
//! their value ("port 80 or port 443 or ...") collapse into one instruction
//! carrying a value set.
//!
//! # Layout
//!
//! ```text
//! +-----------+--------+--------+--------+--------+-------
//! |nval|S|off |   no   |   yes  |  mask  |  value | value...
//! +-----------+--------+--------+--------+--------+-------
//! ```
//!
//! - `off` (bits 0-15): offset of the tested word in the aligned frame
//! - `S` (bit 16): short output
//! - `nval` (bits 17-31): number of values
//! - `no`/`yes`: a positive word is a forward distance in words from the
//!   start of this instruction; zero or negative is the negated output port
//!
//! The test succeeds if the masked word equals any of the values. Value
//! sets large enough for binary search are stored sorted.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use super::insn::Insn;
use super::jump::{DROP_PORT, Jump};
use super::program::{Program, ProgramError, ProgramResult};
use crate::config::CompileConfig;

/// Largest offset a compressed instruction can encode.
pub const MAX_COMPRESSED_OFFSET: u32 = 0xFFFF;

/// Largest value set a compressed instruction can carry.
pub const MAX_COMPRESSED_VALUES: usize = 0x7FFF;

/// Words preceding the value set of each instruction.
pub(crate) const HEADER_WORDS: usize = 4;

const SHORT_BIT: u32 = 1 << 16;
const NVAL_SHIFT: u32 = 17;

/// Decoded branch of a compressed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedJump {
    /// Continue this many words further on.
    Forward(usize),
    /// Classification ends on this port ([`DROP_PORT`] for drops).
    Output(u32),
}

impl CompressedJump {
    #[inline]
    pub(crate) const fn decode(word: u32) -> Self {
        let signed = word as i32;
        if signed > 0 {
            Self::Forward(signed as usize)
        } else {
            Self::Output(signed.unsigned_abs())
        }
    }

    #[inline]
    const fn encode_port(port: u32) -> u32 {
        (port as i32).wrapping_neg() as u32
    }
}

/// Borrowed view of one compressed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedInsn<'a> {
    /// Word index of the instruction header.
    pub position: usize,
    pub offset: u32,
    pub short_output: bool,
    pub mask: u32,
    pub no: CompressedJump,
    pub yes: CompressedJump,
    /// Values, sorted when `bisect` is set.
    pub values: &'a [u32],
    /// Whether matching binary searches `values`.
    pub bisect: bool,
}

impl CompressedInsn<'_> {
    /// Word index of the next instruction in the encoding.
    #[inline]
    pub fn next_position(&self) -> usize {
        self.position + HEADER_WORDS + self.values.len()
    }

    /// Packet bytes (aligned frame) needed to evaluate this test.
    #[inline]
    pub const fn required_length(&self) -> u32 {
        Insn::new(self.offset, 0, self.mask, Jump::Never, Jump::Never).required_length()
    }

    /// Whether the masked word is one of the values.
    #[inline]
    pub fn matches(&self, masked: u32) -> bool {
        if self.bisect {
            self.values.binary_search(&masked).is_ok()
        } else {
            self.values.contains(&masked)
        }
    }
}

/// Iterator over the instructions of a [`CompressedProgram`].
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    words: &'a [u32],
    pos: usize,
    config: CompileConfig,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = CompressedInsn<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let insn = decode_at(self.words, self.pos, self.config)?;
        self.pos = insn.next_position();
        Some(insn)
    }
}

/// Decode the instruction whose header is at `pos`.
#[inline]
pub(crate) fn decode_at(words: &[u32], pos: usize, config: CompileConfig) -> Option<CompressedInsn<'_>> {
    let header = *words.get(pos)?;
    let nval = (header >> NVAL_SHIFT) as usize;
    let values = words.get(pos + HEADER_WORDS..pos + HEADER_WORDS + nval)?;
    Some(CompressedInsn {
        position: pos,
        offset: header & MAX_COMPRESSED_OFFSET,
        short_output: header & SHORT_BIT != 0,
        mask: words[pos + 3],
        no: CompressedJump::decode(words[pos + 1]),
        yes: CompressedJump::decode(words[pos + 2]),
        values,
        bisect: config.bisects(nval),
    })
}

/// A program packed for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedProgram {
    words: Vec<u32>,
    output_everything: Option<Jump>,
    safe_length: u32,
    align_offset: u32,
    config: CompileConfig,
}

impl CompressedProgram {
    /// Compress `prog` with the default configuration.
    ///
    /// # Errors
    /// See [`compile_with`](Self::compile_with).
    pub fn compile(prog: &Program) -> ProgramResult<Self> {
        Self::compile_with(prog, CompileConfig::default())
    }

    /// Compress `prog`.
    ///
    /// Unreachable instructions are dropped. A no-chain of tests sharing
    /// offset, mask, short output and yes-target, whose members are reached
    /// only through that chain, becomes one instruction with a value set.
    ///
    /// # Errors
    /// Returns an error if the program is malformed or does not fit the
    /// encoding (offsets above [`MAX_COMPRESSED_OFFSET`], oversized output).
    pub fn compile_with(prog: &Program, config: CompileConfig) -> ProgramResult<Self> {
        prog.validate()?;
        let insns = prog.insns();
        let len = insns.len();

        let mut wanted = vec![0u32; len];
        if let Some(first) = wanted.first_mut() {
            *first = 1;
        }
        for (idx, insn) in insns.iter().enumerate() {
            if wanted[idx] > 0 {
                for target in insn.j.iter().filter_map(|jump| jump.step()) {
                    wanted[target] += 1;
                }
            }
        }

        let mut words: Vec<u32> = Vec::new();
        let mut positions = Vec::with_capacity(len + 1);
        let mut fixups: Vec<(usize, [Jump; 2])> = Vec::new();

        for (insn_idx, insn) in insns.iter().enumerate() {
            positions.push(words.len());
            if wanted[insn_idx] == 0 {
                continue;
            }
            if insn.offset > MAX_COMPRESSED_OFFSET {
                return Err(ProgramError::OffsetOutOfRange {
                    insn_idx,
                    offset: insn.offset,
                });
            }

            let mut values = vec![insn.value];
            let mut no = insn.no();
            while let Jump::Step(next) = no {
                let other = &insns[next];
                if wanted[next] != 1
                    || other.yes() != insn.yes()
                    || other.offset != insn.offset
                    || other.mask != insn.mask
                    || other.short_output != insn.short_output
                    || values.len() == MAX_COMPRESSED_VALUES
                {
                    break;
                }
                values.push(other.value);
                wanted[next] -= 1;
                no = other.no();
            }
            if config.bisects(values.len()) {
                values.sort_unstable();
            }

            let head = words.len();
            let short = if insn.short_output { SHORT_BIT } else { 0 };
            words.push(insn.offset | short | ((values.len() as u32) << NVAL_SHIFT));
            words.extend([0, 0, insn.mask]);
            words.extend_from_slice(&values);
            fixups.push((head, [no, insn.yes()]));
        }
        positions.push(words.len());

        if words.len() > i32::MAX as usize {
            return Err(ProgramError::ProgramTooLarge { words: words.len() });
        }

        for (head, jumps) in fixups {
            for (k, jump) in jumps.into_iter().enumerate() {
                words[head + 1 + k] = match jump {
                    Jump::Step(target) => (positions[target] - head) as u32,
                    Jump::Output(port) => CompressedJump::encode_port(port),
                    _ => CompressedJump::encode_port(DROP_PORT),
                };
            }
        }

        log::debug!(
            "compressed {} instructions into {} words",
            len,
            words.len()
        );

        Ok(Self {
            output_everything: if words.is_empty() {
                Some(prog.output_everything().unwrap_or(Jump::Never))
            } else {
                None
            },
            words,
            safe_length: prog.safe_length(),
            align_offset: prog.align_offset(),
            config,
        })
    }

    /// Raw encoded words.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

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

    #[inline]
    pub const fn config(&self) -> CompileConfig {
        self.config
    }

    /// Iterate over the decoded instructions in encoding order.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            words: &self.words,
            pos: 0,
            config: self.config,
        }
    }

    /// Ports below `noutputs` that no packet can reach.
    pub fn unused_outputs(&self, noutputs: u32) -> Vec<u32> {
        let mut used = vec![false; noutputs as usize];
        let mut mark = |port: u32| {
            if let Some(slot) = used.get_mut(port as usize) {
                *slot = true;
            }
        };
        match self.output_everything {
            Some(jump) => jump.port().into_iter().for_each(&mut mark),
            None => {
                for insn in self.instructions() {
                    for jump in [insn.no, insn.yes] {
                        if let CompressedJump::Output(port) = jump {
                            mark(port);
                        }
                    }
                }
            }
        }
        (0..noutputs).filter(|&port| !used[port as usize]).collect()
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

    /// Human-readable listing, one line per value.
    pub fn unparse(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompressedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first expanded step of the instruction at each word position
        let mut stepno = vec![0usize; self.words.len() + 1];
        for insn in self.instructions() {
            stepno[insn.next_position()] = stepno[insn.position] + insn.values.len();
        }
        let target = |insn: &CompressedInsn<'_>, jump: CompressedJump| match jump {
            CompressedJump::Forward(distance) => Jump::Step(stepno[insn.position + distance]),
            CompressedJump::Output(DROP_PORT) => Jump::Never,
            CompressedJump::Output(port) => Jump::Output(port),
        };

        for insn in self.instructions() {
            let first = stepno[insn.position];
            for (j, &value) in insn.values.iter().enumerate() {
                let step = first + j;
                let no = if j + 1 < insn.values.len() {
                    Jump::Step(step + 1)
                } else {
                    target(&insn, insn.no)
                };
                let shown = Insn::new(
                    insn.offset.wrapping_sub(self.align_offset),
                    value,
                    insn.mask,
                    target(&insn, insn.yes),
                    no,
                )
                .with_short_output(insn.short_output);
                writeln!(f, "{step:>2} {shown}")?;
            }
        }
        if self.words.is_empty() {
            writeln!(f, "all->{}", self.output_everything.unwrap_or(Jump::Never))?;
        }
        writeln!(f, "safe length {}", self.safe_length)?;
        writeln!(f, "alignment offset {}", self.align_offset)
    }
}
