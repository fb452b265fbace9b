//! Program Interpreters
//!
//! [`Classify`] for both program forms. Each walk starts at the first
//! instruction and only ever moves forward, so it ends within one step per
//! instruction.

use super::{Classify, DROP_PORT};
use crate::bytecode::compressed::{self, CompressedJump, CompressedProgram};
use crate::bytecode::jump::Jump;
use crate::bytecode::program::Program;

/// Big-endian word at `offset` of the aligned frame.
///
/// Bytes outside the packet read as zero.
#[inline]
fn load_word(packet: &[u8], offset: u32, align_offset: u32) -> u32 {
    let start = i64::from(offset) - i64::from(align_offset);
    if let Ok(start) = usize::try_from(start) {
        if let Some(&[b0, b1, b2, b3]) = packet.get(start..start.saturating_add(4)) {
            return u32::from_be_bytes([b0, b1, b2, b3]);
        }
    }
    (0..4).fold(0, |word, idx| {
        let byte = usize::try_from(start + idx)
            .ok()
            .and_then(|idx| packet.get(idx))
            .copied()
            .unwrap_or(0);
        (word << 8) | u32::from(byte)
    })
}

/// Packet length in the aligned frame, and whether tests may be short.
#[inline]
fn frame_length(packet: &[u8], safe_length: u32, align_offset: u32) -> (u32, bool) {
    let len = u32::try_from(packet.len()).unwrap_or(u32::MAX);
    (len.saturating_add(align_offset), len < safe_length)
}

#[inline]
fn terminal_port(jump: Jump) -> u32 {
    jump.port().unwrap_or(DROP_PORT)
}

impl Classify for Program {
    fn classify(&self, packet: &[u8]) -> u32 {
        if self.is_empty() {
            return terminal_port(self.output_everything().unwrap_or(Jump::Never));
        }

        let align = self.align_offset();
        let (packet_length, checked) = frame_length(packet, self.safe_length(), align);
        let mut state = 0;
        while let Some(insn) = self.insn(state) {
            let hit = if checked && insn.is_short_for(packet_length) {
                insn.short_output
            } else {
                load_word(packet, insn.offset, align) & insn.mask == insn.value
            };
            match insn.j[hit as usize] {
                Jump::Step(next) if next > state => state = next,
                other => return terminal_port(other),
            }
        }
        DROP_PORT
    }
}

impl Classify for CompressedProgram {
    fn classify(&self, packet: &[u8]) -> u32 {
        if let Some(output) = self.output_everything() {
            return terminal_port(output);
        }

        let align = self.align_offset();
        let (packet_length, checked) = frame_length(packet, self.safe_length(), align);
        let words = self.words();
        let config = self.config();
        let mut pos = 0;
        while let Some(insn) = compressed::decode_at(words, pos, config) {
            let hit = if checked && insn.required_length() > packet_length {
                insn.short_output
            } else {
                insn.matches(load_word(packet, insn.offset, align) & insn.mask)
            };
            match if hit { insn.yes } else { insn.no } {
                CompressedJump::Forward(distance) => pos += distance,
                CompressedJump::Output(port) => return port,
            }
        }
        DROP_PORT
    }
}
