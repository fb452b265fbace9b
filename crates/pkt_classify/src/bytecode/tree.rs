//! Subtree Builder
//!
//! Patterns are added to a [`Program`] as nested subtrees. A [`Tree`]
//! cursor tracks the nesting level at which each instruction was added.
//! Finishing a subtree wires its children together with a [`Combinator`]
//! and resolves their [`Jump::Success`]/[`Jump::Failure`] placeholders.
//!
//! # Example
//!
//! ```ignore
//! // (ethertype == ARP) && (opcode == request) -> port 0, else drop
//! let mut prog = Program::new();
//! let mut tree = prog.init_subtree();
//! prog.start_subtree(&mut tree);
//! prog.add_insn(&mut tree, 12, 0x0806_0000, 0xFFFF_0000);
//! prog.add_insn(&mut tree, 20, 0x0001_0000, 0xFFFF_0000);
//! prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(0), Jump::Never);
//! ```

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use super::insn::Insn;
use super::jump::Jump;
use super::program::Program;

/// How the children of a subtree are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every child must succeed.
    And,
    /// Any child may succeed.
    Or,
    /// Children taken in `(condition, then, else)` triples.
    Ternary,
}

/// Construction cursor for a [`Program`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    depth: u32,
    /// Per instruction: the level of the subtree it starts, if any.
    marks: Vec<Option<u32>>,
}

impl Tree {
    /// Current nesting depth.
    #[inline]
    pub const fn depth(&self) -> u32 {
        self.depth
    }
}

impl Program {
    /// Create a cursor positioned after the current instructions.
    pub fn init_subtree(&self) -> Tree {
        Tree {
            depth: 0,
            marks: vec![None; self.len()],
        }
    }

    /// Open a nested subtree.
    pub fn start_subtree(&self, tree: &mut Tree) {
        tree.depth += 1;
    }

    /// Append the test `(word(offset) & mask) == value` to the current
    /// subtree. Its branches stay unresolved until a subtree is finished.
    /// Returns the new instruction's index.
    pub fn add_insn(&mut self, tree: &mut Tree, offset: u32, value: u32, mask: u32) -> usize {
        let idx = self.add_raw_insn(Insn::unlinked(offset, value, mask));
        tree.marks.resize(idx, None);
        tree.marks.push(Some(tree.depth));
        idx
    }

    /// Close the current subtree, combining its children with `combinator`.
    ///
    /// The subtree as a whole continues to `success` or `failure`; pass the
    /// placeholders to leave it for an enclosing subtree to resolve.
    pub fn finish_subtree(
        &mut self,
        tree: &mut Tree,
        combinator: Combinator,
        success: Jump,
        failure: Jump,
    ) {
        let level = tree.depth;
        let len = self.len();
        tree.marks.resize(len, None);

        // walk back to the enclosing subtree, then collect our children
        let mut start = len;
        while start > 0 && tree.marks[start - 1].is_none_or(|mark| mark >= level) {
            start -= 1;
        }
        let children: Vec<usize> = (start..len)
            .filter(|&idx| tree.marks[idx] == Some(level))
            .collect();

        if let Some(&first) = children.first() {
            tree.marks[first] = level.checked_sub(1);
            for mark in &mut tree.marks[first + 1..] {
                *mark = None;
            }

            let mut t = 0;
            while t + 1 < children.len() {
                let (cur, next) = (children[t], children[t + 1]);
                match combinator {
                    Combinator::And => self.redirect(cur..next, Jump::Step(next), failure),
                    Combinator::Or => self.redirect(cur..next, success, Jump::Step(next)),
                    Combinator::Ternary if t + 2 < children.len() => {
                        let next2 = children[t + 2];
                        self.redirect(cur..next, Jump::Step(next), Jump::Step(next2));
                        self.redirect(next..next2, success, failure);
                        t += 1;
                    }
                    // a trailing pair acts as AND
                    Combinator::Ternary => self.redirect(cur..next, Jump::Step(next), failure),
                }
                t += 1;
            }
            if let Some(&last) = children.get(t) {
                self.redirect(last..len, success, failure);
            }
        }

        tree.depth = tree.depth.saturating_sub(1);
    }

    /// Negate the most recently finished subtree at the current level,
    /// swapping its unresolved success and failure jumps. With `flip_short`,
    /// short packets switch sides as well.
    pub fn negate_subtree(&mut self, tree: &mut Tree, flip_short: bool) {
        let level = tree.depth;
        tree.marks.resize(self.len(), None);
        let Some(first) = tree.marks.iter().rposition(|&mark| mark == Some(level)) else {
            return;
        };
        for insn in &mut self.insns_mut()[first..] {
            insn.j = [insn.j[0].negated(), insn.j[1].negated()];
            if flip_short {
                insn.short_output = !insn.short_output;
            }
        }
    }

    fn redirect(&mut self, range: core::ops::Range<usize>, success: Jump, failure: Jump) {
        for insn in &mut self.insns_mut()[range] {
            for jump in &mut insn.j {
                match *jump {
                    Jump::Success => *jump = success,
                    Jump::Failure => *jump = failure,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_chain() {
        let mut prog = Program::new();
        let mut tree = prog.init_subtree();
        prog.start_subtree(&mut tree);
        prog.add_insn(&mut tree, 12, 0x0806_0000, 0xFFFF_0000);
        prog.add_insn(&mut tree, 20, 0x0001_0000, 0xFFFF_0000);
        prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(0), Jump::Never);

        assert_eq!(tree.depth(), 0);
        assert_eq!(prog.insns()[0].j, [Jump::Never, Jump::Step(1)]);
        assert_eq!(prog.insns()[1].j, [Jump::Never, Jump::Output(0)]);
        assert_eq!(prog.validate(), Ok(()));
    }

    #[test]
    fn or_of_and_patterns() {
        let mut prog = Program::new();
        let mut tree = prog.init_subtree();
        prog.start_subtree(&mut tree);
        for (port, value) in [(0, 0x0001_0000), (1, 0x0002_0000)] {
            prog.start_subtree(&mut tree);
            prog.add_insn(&mut tree, 12, 0x0806_0000, 0xFFFF_0000);
            prog.add_insn(&mut tree, 20, value, 0xFFFF_0000);
            prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(port), Jump::Failure);
        }
        prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);

        assert_eq!(prog.insns()[0].j, [Jump::Step(2), Jump::Step(1)]);
        assert_eq!(prog.insns()[1].j, [Jump::Step(2), Jump::Output(0)]);
        assert_eq!(prog.insns()[2].j, [Jump::Never, Jump::Step(3)]);
        assert_eq!(prog.insns()[3].j, [Jump::Never, Jump::Output(1)]);
        assert_eq!(prog.validate(), Ok(()));
    }

    #[test]
    fn ternary_triple() {
        let mut prog = Program::new();
        let mut tree = prog.init_subtree();
        prog.start_subtree(&mut tree);
        prog.add_insn(&mut tree, 0, 0x0100_0000, 0xFF00_0000);
        prog.add_insn(&mut tree, 4, 0x0200_0000, 0xFF00_0000);
        prog.add_insn(&mut tree, 8, 0x0300_0000, 0xFF00_0000);
        prog.finish_subtree(&mut tree, Combinator::Ternary, Jump::Output(1), Jump::Output(2));

        // condition chooses between the then and else children
        assert_eq!(prog.insns()[0].j, [Jump::Step(2), Jump::Step(1)]);
        assert_eq!(prog.insns()[1].j, [Jump::Output(2), Jump::Output(1)]);
        assert_eq!(prog.insns()[2].j, [Jump::Output(2), Jump::Output(1)]);
    }

    #[test]
    fn negation_swaps_placeholders() {
        let mut prog = Program::new();
        let mut tree = prog.init_subtree();
        prog.start_subtree(&mut tree);
        prog.start_subtree(&mut tree);
        prog.add_insn(&mut tree, 12, 0x0000_1234, 0x0000_FFFF);
        prog.finish_subtree(&mut tree, Combinator::And, Jump::Success, Jump::Failure);
        prog.negate_subtree(&mut tree, true);
        assert_eq!(prog.insns()[0].j, [Jump::Success, Jump::Failure]);
        assert!(prog.insns()[0].short_output);

        prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(1), Jump::Output(2));
        assert_eq!(prog.insns()[0].j, [Jump::Output(1), Jump::Output(2)]);
    }

    #[test]
    fn finishing_empty_subtree_is_harmless() {
        let mut prog = Program::new();
        let mut tree = prog.init_subtree();
        prog.start_subtree(&mut tree);
        prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);
        prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);
        assert_eq!(tree.depth(), 0);
        assert!(prog.is_empty());
        assert_eq!(prog.output_everything(), Some(Jump::Never));
    }
}
