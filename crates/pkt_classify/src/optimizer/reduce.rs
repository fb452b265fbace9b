//! State Reduction Passes
//!
//! Local rewrites applied after the dominator pass:
//!
//! - [`Program::combine_compatible_states`] merges adjacent tests of the
//!   same word into one test
//! - [`Program::remove_unused_states`] drops tests that cannot affect the
//!   outcome and compacts the program

extern crate alloc;

use alloc::vec;

use crate::bytecode::jump::Jump;
use crate::bytecode::program::Program;

impl Program {
    /// Merge neighbouring tests on the same word.
    ///
    /// Works backward from the last state. For each state:
    ///
    /// - a single-bit test is flipped when that lines it up with its
    ///   no-successor
    /// - `word == A || word == B` with `A ^ B` a single bit becomes one test
    ///   with that bit ignored
    /// - `a && b`, where both fail to the same place, becomes one test of
    ///   the union of their masks
    ///
    /// A state that was rewritten is examined again, so the program must
    /// already be validated.
    pub(crate) fn combine_compatible_states(&mut self) {
        let insns = self.insns_mut();
        let mut state = insns.len();
        while state > 0 {
            state -= 1;
            loop {
                let insn = insns[state];
                if let Jump::Step(no_state) = insn.no() {
                    let no_in = insns[no_state];
                    if no_in.compatible(&insn, false) && insn.flippable() {
                        insns[state].flip();
                    } else if insn.generalizable_or_pair(&no_in) {
                        let bit = insn.value ^ no_in.value;
                        let merged = &mut insns[state];
                        merged.value &= !bit;
                        merged.mask &= !bit;
                        merged.set_no(no_in.no());
                        continue;
                    }
                }

                let insn = insns[state];
                let Jump::Step(yes_state) = insn.yes() else {
                    break;
                };
                if insn.no() == insns[yes_state].yes() && insns[yes_state].flippable() {
                    insns[yes_state].flip();
                }
                let yes_in = insns[yes_state];
                if insn.no() != yes_in.no() || !yes_in.compatible(&insn, true) {
                    break;
                }
                let Some(short_output) = insn.merged_short_output(&yes_in) else {
                    break;
                };

                let merged = &mut insns[state];
                merged.set_yes(yes_in.yes());
                if merged.mask == 0 {
                    merged.offset = yes_in.offset;
                }
                merged.value = (merged.value & merged.mask) | (yes_in.value & yes_in.mask);
                merged.mask |= yes_in.mask;
                merged.short_output = short_output;
            }
        }
    }

    /// Bypass tests whose branches agree or whose mask is empty, then drop
    /// unreachable states and renumber the rest.
    ///
    /// If state 0 itself is bypassed to a port, the program becomes empty
    /// and sends everything there. Expects a validated program.
    pub(crate) fn remove_unused_states(&mut self) {
        if self.is_empty() {
            return;
        }

        // destination of a branch into each state, skipping uninteresting ones
        let insns = self.insns_mut();
        let len = insns.len();
        let mut destination = vec![Jump::Never; len];
        for state in (0..len).rev() {
            let insn = &mut insns[state];
            for jump in &mut insn.j {
                if let Jump::Step(target) = *jump {
                    *jump = destination[target];
                }
            }
            destination[state] = if insn.yes() != insn.no() && insn.mask != 0 {
                Jump::Step(state)
            } else {
                insn.yes()
            };
        }

        let output_everything = match destination[0] {
            Jump::Step(0) => None,
            Jump::Step(target) => {
                insns[0] = insns[target];
                None
            }
            terminal => Some(terminal),
        };

        // renumber reachable states
        let mut new_index: alloc::vec::Vec<Option<usize>> = vec![None; len];
        if output_everything.is_none() {
            let reachable = super::cfg::reachable(insns);
            let mut next = 0;
            for state in 0..len {
                if reachable[state] {
                    new_index[state] = Some(next);
                    next += 1;
                }
            }
        }

        let mut kept = 0;
        for state in 0..len {
            let Some(idx) = new_index[state] else {
                continue;
            };
            let mut insn = insns[state];
            for jump in &mut insn.j {
                if let Jump::Step(target) = *jump {
                    // targets of reachable states are reachable
                    *jump = Jump::Step(new_index[target].unwrap_or(target));
                }
            }
            insns[idx] = insn;
            kept = idx + 1;
        }
        insns.truncate(kept);
        self.set_output_everything(output_everything);
    }
}
