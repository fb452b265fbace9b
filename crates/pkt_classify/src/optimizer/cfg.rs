//! Control Flow Analysis
//!
//! Branch counting, predecessor lookup and reachability over the
//! instruction DAG. Branches are numbered `state * 2 + k`, where `k` is the
//! branch index (0 = no, 1 = yes).
//!
//! The queries accept unvalidated programs: a step that is not forward or
//! lands past the end is a dead end, as in the interpreter.

extern crate alloc;

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use crate::bytecode::insn::Insn;
use crate::bytecode::jump::Jump;
use crate::config::OFFSET_MAX;

/// Branch number of branch `k` of `state`.
#[inline]
pub const fn brno(state: usize, k: bool) -> usize {
    state * 2 + k as usize
}

/// State a branch number leaves from.
#[inline]
pub const fn stateno(brno: usize) -> usize {
    brno / 2
}

/// Whether a branch number is a yes branch.
#[inline]
pub const fn br_yes(brno: usize) -> bool {
    brno & 1 != 0
}

/// Target of a step from `state`, if it is forward and in range.
#[inline]
fn forward_step(jump: Jump, state: usize, len: usize) -> Option<usize> {
    jump.step().filter(|&target| target > state && target < len)
}

/// Incoming branches of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InBranch {
    /// Nothing jumps here.
    None,
    /// Exactly one branch of the given state jumps here.
    One(usize),
    /// More than one branch jumps here.
    Many,
}

/// Count the incoming branches of every state.
pub fn count_inbranches(insns: &[Insn]) -> Vec<InBranch> {
    let len = insns.len();
    let mut inbranch = vec![InBranch::None; len];
    for (state, insn) in insns.iter().enumerate() {
        for target in insn.j.iter().filter_map(|&jump| forward_step(jump, state, len)) {
            inbranch[target] = match inbranch[target] {
                InBranch::None => InBranch::One(state),
                _ => InBranch::Many,
            };
        }
    }
    inbranch
}

/// Branch numbers that jump to `state`, in ascending order.
pub fn predecessors(insns: &[Insn], state: usize) -> Vec<usize> {
    let mut preds = Vec::new();
    for (from, insn) in insns.iter().enumerate().take(state) {
        for k in [false, true] {
            if insn.j[k as usize].step() == Some(state) {
                preds.push(brno(from, k));
            }
        }
    }
    preds
}

/// Which states can be reached from state 0.
pub fn reachable(insns: &[Insn]) -> Vec<bool> {
    let len = insns.len();
    let mut seen = vec![false; len];
    if let Some(first) = seen.first_mut() {
        *first = true;
    }
    // branches only go forward, so one pass suffices
    for state in 0..len {
        if seen[state] {
            for target in insns[state].j.iter().filter_map(|&jump| forward_step(jump, state, len)) {
                seen[target] = true;
            }
        }
    }
    seen
}

/// Output ports reachable from state 0.
pub fn reachable_ports(insns: &[Insn]) -> BTreeSet<u32> {
    reachable(insns)
        .into_iter()
        .zip(insns)
        .filter(|&(seen, _)| seen)
        .flat_map(|(_, insn)| insn.j.into_iter().filter_map(|jump| jump.port()))
        .collect()
}

/// Lower bound on the packet length (aligned frame) guaranteed on entry
/// to each state.
///
/// Taking an instruction's non-short branch proves the packet holds all of
/// its masked bytes. Unreachable states keep [`OFFSET_MAX`].
pub fn known_lengths(insns: &[Insn]) -> Vec<u32> {
    let len = insns.len();
    let mut known = vec![OFFSET_MAX; len];
    if let Some(first) = known.first_mut() {
        *first = 0;
    }
    for state in 0..len {
        let insn = &insns[state];
        let tested = insn.required_length().max(known[state]);
        let short = insn.short_output as usize;
        if let Some(target) = forward_step(insn.j[1 - short], state, len) {
            known[target] = known[target].min(tested);
        }
        if let Some(target) = forward_step(insn.j[short], state, len) {
            known[target] = known[target].min(known[state]);
        }
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Vec<Insn> {
        vec![
            Insn::new(12, 0x0800_0000, 0xFFFF_0000, Jump::Step(1), Jump::Step(2)),
            Insn::new(23, 0x0600_0000, 0xFF00_0000, Jump::Step(3), Jump::Output(1)),
            Insn::new(0, 0, 0, Jump::Output(2), Jump::Never),
            Insn::new(34, 0x0050_0000, 0xFFFF_0000, Jump::Output(0), Jump::Output(1)),
        ]
    }

    #[test]
    fn branch_numbers() {
        assert_eq!(brno(3, true), 7);
        assert_eq!(stateno(7), 3);
        assert!(br_yes(7));
        assert!(!br_yes(6));
    }

    #[test]
    fn inbranch_counts() {
        let mut insns = diamond();
        insns[2].set_yes(Jump::Step(3));
        assert_eq!(
            count_inbranches(&insns),
            [InBranch::None, InBranch::One(0), InBranch::One(0), InBranch::Many]
        );
    }

    #[test]
    fn predecessor_scan() {
        let mut insns = diamond();
        insns[2].set_yes(Jump::Step(3));
        insns[2].set_no(Jump::Step(3));
        assert_eq!(predecessors(&insns, 3), [brno(1, true), brno(2, false), brno(2, true)]);
        assert!(predecessors(&insns, 0).is_empty());
    }

    #[test]
    fn reachability() {
        let mut insns = diamond();
        insns[0].set_no(Jump::Step(3));
        assert_eq!(reachable(&insns), [true, true, false, true]);
        assert_eq!(reachable_ports(&insns), BTreeSet::from([0, 1]));
    }

    #[test]
    fn known_length_propagation() {
        let known = known_lengths(&diamond());
        assert_eq!(known, [0, 14, 0, 24]);

        let mut insns = diamond();
        insns[1].short_output = true;
        // the yes branch of a short-to-yes test proves nothing
        assert_eq!(known_lengths(&insns)[3], 14);
    }

    #[test]
    fn malformed_steps_are_dead_ends() {
        let past_end = [Insn::new(12, 0x0800_0000, 0xFFFF_0000, Jump::Step(5), Jump::Output(1))];
        assert_eq!(count_inbranches(&past_end), [InBranch::None]);
        assert_eq!(reachable(&past_end), [true]);
        assert_eq!(reachable_ports(&past_end), BTreeSet::from([1]));
        assert_eq!(known_lengths(&past_end), [0]);

        let mut insns = diamond();
        insns[1].set_yes(Jump::Step(1));
        insns[2].set_yes(Jump::Step(0));
        assert_eq!(
            count_inbranches(&insns),
            [InBranch::None, InBranch::One(0), InBranch::One(0), InBranch::None]
        );
        assert_eq!(reachable(&insns), [true, true, true, false]);
        assert_eq!(known_lengths(&insns), [0, 14, 0, OFFSET_MAX]);
    }
}
