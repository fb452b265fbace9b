//! Dominator-Based Branch Shifting
//!
//! For every state the optimizer keeps a bounded set of *dominator lists*.
//! Each list is a sequence of facts "test T took branch b", and every path
//! from state 0 to the state passes all the facts of at least one list.
//!
//! # Architecture
//!
//! States are processed once, in index order:
//!
//! 1. Collect the lists of every predecessor, appending the fact for the
//!    branch taken. Lists that contradict themselves (T took both branches)
//!    describe impossible paths and are dropped.
//! 2. If more than `max_dominator_lists` remain, replace them with their
//!    intersection, which is still dominating.
//! 3. If every list already decides this state's test (an identical test
//!    was passed earlier), predecessors jump straight past it.
//! 4. Each branch of the state is shifted forward past every later test
//!    whose outcome the lists imply.
//!
//! Facts name tests by id: identical tests share the id of the first
//! occurrence, so a repeat of an earlier test is recognized as decided.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use super::cfg::{self, br_yes, brno, stateno};
use crate::bytecode::insn::Insn;
use crate::bytecode::jump::Jump;

/// Facts known along a set of paths, as test-id branch numbers.
type DomList = Vec<usize>;

pub(crate) struct DominatorOptimizer<'a> {
    insns: &'a mut [Insn],
    max_lists: usize,
    /// Test id of each state: the index of the first identical test.
    insn_id: Vec<usize>,
    /// Known packet length on entry, per test id.
    known_length: Vec<u32>,
    /// Dominator lists per processed state; empty means unreachable.
    dom: Vec<Vec<DomList>>,
}

impl<'a> DominatorOptimizer<'a> {
    pub(crate) fn new(insns: &'a mut [Insn], max_lists: usize) -> Self {
        let len = insns.len();
        let state_known = cfg::known_lengths(insns);

        let mut insn_id: Vec<usize> = (0..len).collect();
        for state in 0..len {
            if let Some(first) = (0..state).find(|&other| insns[other].same_test(&insns[state])) {
                insn_id[state] = insn_id[first];
            }
        }

        // an id's facts may come from any of its states
        let mut known_length = vec![u32::MAX; len];
        for state in 0..len {
            let id = insn_id[state];
            known_length[id] = known_length[id].min(state_known[state]);
        }

        Self {
            insns,
            max_lists,
            insn_id,
            known_length,
            dom: Vec::with_capacity(len),
        }
    }

    /// Process every state in order.
    pub(crate) fn run(mut self) {
        for state in 0..self.insns.len() {
            self.calculate_dom(state);
            self.shift_branch(state, true);
            self.shift_branch(state, false);
        }
        if log::log_enabled!(log::Level::Trace) {
            for (state, lists) in self.dom.iter().enumerate() {
                log::trace!("dominators of state {} (id {}): {:?}", state, self.insn_id[state], lists);
            }
        }
    }

    fn calculate_dom(&mut self, state: usize) {
        debug_assert_eq!(self.dom.len(), state);
        if state == 0 {
            self.dom.push(vec![Vec::new()]);
            return;
        }

        let preds = cfg::predecessors(self.insns, state);
        let mut lists: Vec<DomList> = Vec::new();
        let mut i = 0;
        while i < preds.len() {
            let pred_br = preds[i];
            let pred = stateno(pred_br);
            if preds.get(i + 1).is_some_and(|&next| stateno(next) == pred) {
                // both branches lead here, so the predecessor's test says nothing
                lists.extend(self.dom[pred].iter().cloned());
                i += 2;
                continue;
            }

            let fact = brno(self.insn_id[pred], br_yes(pred_br));
            for list in &self.dom[pred] {
                if list.contains(&(fact ^ 1)) {
                    continue;
                }
                let mut list = list.clone();
                if !list.contains(&fact) {
                    list.push(fact);
                }
                lists.push(list);
            }
            i += 1;
        }

        if lists.is_empty() {
            self.mark_impossible(state);
            return;
        }

        if lists.len() > self.max_lists {
            self.dom.push(vec![intersect(&lists)]);
            return;
        }

        // a state is redundant if every list already decides its test
        let my_id = self.insn_id[state];
        let decided = lists
            .iter()
            .map(|list| list.iter().rev().find(|&&fact| stateno(fact) == my_id).copied())
            .reduce(|a, b| if a == b { a } else { None })
            .flatten();
        if let Some(fact) = decided {
            let new_target = self.insns[state].j[br_yes(fact) as usize];
            for pred_br in preds {
                self.insns[stateno(pred_br)].j[br_yes(pred_br) as usize] = new_target;
            }
            self.mark_impossible(state);
            return;
        }

        self.dom.push(lists);
    }

    /// Record that no path reaches `state`.
    fn mark_impossible(&mut self, state: usize) {
        self.insns[state].j = [Jump::Never; 2];
        self.dom.push(Vec::new());
    }

    /// Move branch `br` of `state` as far forward as its dominators allow.
    fn shift_branch(&mut self, state: usize, br: bool) {
        let start = self.insns[state].j[br as usize];
        if !start.is_step() || self.dom[state].is_empty() {
            return;
        }

        let fact = brno(self.insn_id[state], br);
        let chains: Vec<Vec<Jump>> = self.dom[state]
            .iter()
            .map(|list| self.follow(list, fact, start))
            .collect();

        let target = match chains.as_slice() {
            [only] => only.last().copied(),
            [first, rest @ ..] => first
                .iter()
                .rev()
                .find(|jump| rest.iter().all(|chain| chain.contains(jump)))
                .copied(),
            [] => None,
        };
        if let Some(target) = target {
            self.insns[state].j[br as usize] = target;
        }
    }

    /// States a packet provably passes from `start`, given `list` and `fact`.
    fn follow(&self, list: &[usize], fact: usize, start: Jump) -> Vec<Jump> {
        let mut chain = vec![start];
        let mut at = start;
        while let Jump::Step(to_state) = at {
            let to = &self.insns[to_state];
            let next = core::iter::once(&fact).chain(list.iter().rev()).find_map(|&known| {
                if self.br_implies(known, to) {
                    Some(to.yes())
                } else if self.br_implies_not(known, to) {
                    Some(to.no())
                } else {
                    None
                }
            });
            match next {
                Some(next) => {
                    chain.push(next);
                    at = next;
                }
                None => break,
            }
        }
        chain
    }

    /// Whether the fact `known` forces `to` down its yes branch.
    fn br_implies(&self, known: usize, to: &Insn) -> bool {
        let id = stateno(known);
        let from = &self.insns[id];
        let known_length = self.known_length[id];
        if br_yes(known) {
            from.implies(to, known_length)
        } else {
            from.not_implies(to, known_length)
        }
    }

    /// Whether the fact `known` forces `to` down its no branch.
    fn br_implies_not(&self, known: usize, to: &Insn) -> bool {
        let id = stateno(known);
        let from = &self.insns[id];
        let known_length = self.known_length[id];
        if br_yes(known) {
            from.implies_not(to, known_length)
        } else {
            from.not_implies_not(to, known_length)
        }
    }
}

/// Facts present in every list, in the order of the first.
fn intersect(lists: &[DomList]) -> DomList {
    match lists {
        [] => Vec::new(),
        [first, rest @ ..] => first
            .iter()
            .copied()
            .filter(|fact| rest.iter().all(|list| list.contains(fact)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHER_IP: (u32, u32, u32) = (12, 0x0800_0000, 0xFFFF_0000);

    fn test_insn((offset, value, mask): (u32, u32, u32), yes: Jump, no: Jump) -> Insn {
        Insn::new(offset, value, mask, yes, no)
    }

    #[test]
    fn repeated_test_on_yes_branch_is_skipped() {
        let mut insns = vec![
            test_insn(ETHER_IP, Jump::Step(1), Jump::Output(1)),
            test_insn(ETHER_IP, Jump::Output(0), Jump::Output(2)),
        ];
        DominatorOptimizer::new(&mut insns, 4).run();
        assert_eq!(insns[0].yes(), Jump::Output(0));
        assert_eq!(insns[0].no(), Jump::Output(1));
        assert_eq!(insns[1].j, [Jump::Never; 2]);
    }

    #[test]
    fn repeated_test_on_no_branch_is_skipped() {
        let mut insns = vec![
            test_insn(ETHER_IP, Jump::Output(0), Jump::Step(1)),
            test_insn(ETHER_IP, Jump::Output(1), Jump::Output(2)),
        ];
        DominatorOptimizer::new(&mut insns, 4).run();
        assert_eq!(insns[0].no(), Jump::Output(2));
    }

    #[test]
    fn implied_failure_shifts_branch() {
        // ethertype is IP, so it cannot also be ARP
        let mut insns = vec![
            test_insn(ETHER_IP, Jump::Step(1), Jump::Output(3)),
            test_insn((12, 0x0806_0000, 0xFFFF_0000), Jump::Output(0), Jump::Step(2)),
            test_insn((23, 0x0600_0000, 0xFF00_0000), Jump::Output(2), Jump::Output(3)),
        ];
        DominatorOptimizer::new(&mut insns, 4).run();
        assert_eq!(insns[0].yes(), Jump::Step(2));
    }

    #[test]
    fn merge_point_keeps_common_facts() {
        // both paths into state 3 know ethertype is IP
        let mut insns = vec![
            test_insn(ETHER_IP, Jump::Step(1), Jump::Output(3)),
            test_insn((23, 0x0600_0000, 0xFF00_0000), Jump::Step(3), Jump::Step(2)),
            test_insn((23, 0x1100_0000, 0xFF00_0000), Jump::Step(3), Jump::Output(3)),
            test_insn(ETHER_IP, Jump::Output(0), Jump::Output(1)),
        ];
        DominatorOptimizer::new(&mut insns, 4).run();
        assert_eq!(insns[1].yes(), Jump::Output(0));
        assert_eq!(insns[2].yes(), Jump::Output(0));
        assert_eq!(insns[3].j, [Jump::Never; 2]);
    }

    #[test]
    fn intersection_bounds_lists() {
        let lists = vec![vec![0, 3, 5], vec![3, 6], vec![7, 3, 8]];
        assert_eq!(intersect(&lists), [3]);
        assert!(intersect(&[]).is_empty());

        // state 3 is reached along two lists; collapsing them keeps the
        // fact both share
        for max_lists in [1, 4] {
            let mut insns = vec![
                test_insn(ETHER_IP, Jump::Step(1), Jump::Output(3)),
                test_insn((23, 0x0600_0000, 0xFF00_0000), Jump::Step(3), Jump::Step(2)),
                test_insn((23, 0x1100_0000, 0xFF00_0000), Jump::Step(3), Jump::Output(3)),
                test_insn((36, 0x0050_0000, 0xFFFF_0000), Jump::Step(4), Jump::Output(1)),
                test_insn(ETHER_IP, Jump::Output(0), Jump::Output(2)),
            ];
            DominatorOptimizer::new(&mut insns, max_lists).run();
            assert_eq!(insns[1].yes(), Jump::Step(3));
            assert_eq!(insns[2].yes(), Jump::Step(3));
            assert_eq!(insns[3].yes(), Jump::Output(0));
            assert_eq!(insns[4].j, [Jump::Never; 2]);
        }
    }

    #[test]
    fn short_branch_blocks_shift() {
        // the first test sends short packets to its yes branch, so its
        // success says nothing about the narrower second test
        let mut insns = vec![
            test_insn((12, 0x0800_0045, 0xFFFF_FFFF), Jump::Step(1), Jump::Output(1)).with_short_output(true),
            test_insn(ETHER_IP, Jump::Output(0), Jump::Output(2)),
        ];
        DominatorOptimizer::new(&mut insns, 4).run();
        assert_eq!(insns[0].yes(), Jump::Step(1));
    }
}
