//! AND-Chain Sorting
//!
//! Reorders consecutive tests that share a failure target into a canonical
//! order (offset rank, then mask, then value). Canonical chains expose more
//! repeated prefixes to the dominator pass.

use super::cfg::{self, InBranch};
use crate::bytecode::program::Program;
use crate::config::OffsetOrder;

impl Program {
    /// Bubble-sort chains of tests.
    ///
    /// Two tests `e1 -k-> e2` are swapped when `e2` is reached only from
    /// `e1`, both send their other branch to the same place, and `e2`
    /// sorts before `e1`. Tests at offsets at or past `last_offset` stay
    /// where they are. Expects a validated program.
    pub(crate) fn bubble_sort_and_exprs(&mut self, order: &OffsetOrder, last_offset: u32) {
        let inbranch = cfg::count_inbranches(self.insns());
        let insns = self.insns_mut();

        let mut i = 0;
        while i < insns.len() {
            let mut restart = None;
            for k in [false, true] {
                let e1 = insns[i];
                let Some(j) = e1.j[k as usize].step() else {
                    continue;
                };
                if e1.offset >= last_offset || inbranch[j] != InBranch::One(i) {
                    continue;
                }
                let e2 = insns[j];
                if e1.j[!k as usize] != e2.j[!k as usize] {
                    continue;
                }

                let key1 = (order.rank(e1.offset), e1.mask, e1.value);
                let key2 = (order.rank(e2.offset), e2.mask, e2.value);
                if key1 > key2 {
                    let mut moved_up = e2;
                    moved_up.j[k as usize] = e1.j[k as usize];
                    let mut moved_down = e1;
                    moved_down.j[k as usize] = e2.j[k as usize];
                    insns[i] = moved_up;
                    insns[j] = moved_down;
                    // step back so the predecessor is compared again
                    restart = Some(match inbranch[i] {
                        InBranch::One(pred) => pred,
                        _ => i.saturating_sub(1),
                    });
                    break;
                }
            }
            match restart {
                Some(pred) => i = pred,
                None => i += 1,
            }
        }
    }
}
