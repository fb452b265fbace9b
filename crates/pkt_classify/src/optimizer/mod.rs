//! Program Optimizer
//!
//! Rewrites a finished [`Program`] in place into an equivalent, usually much
//! smaller one. Every pass preserves the port each packet is classified to,
//! short packets included.
//!
//! # Architecture
//!
//! ```text
//! validate -> sort AND chains -> dominator pass -> combine states -> remove unused
//! ```
//!
//! - [`sort`]: canonical ordering of AND chains, so that equal prefixes of
//!   different patterns line up
//! - [`dominator`]: skips tests whose outcome earlier tests already decided
//! - [`reduce`]: merges tests on the same word and drops dead states
//!
//! [`cfg`] holds the graph queries the passes share.

pub mod cfg;
mod dominator;
mod reduce;
mod sort;

use crate::bytecode::jump::Jump;
use crate::bytecode::program::{Program, ProgramResult};
use crate::config::{OffsetOrder, OptimizeConfig};
use dominator::DominatorOptimizer;

impl Program {
    /// Optimize with the given AND-chain offset order and default list bound.
    ///
    /// # Errors
    /// See [`optimize_with`](Self::optimize_with).
    pub fn optimize(&mut self, order: &OffsetOrder, last_offset: u32) -> ProgramResult<()> {
        let config = OptimizeConfig::new()
            .with_offset_order(order.clone())
            .with_last_offset(last_offset);
        self.optimize_with(&config)
    }

    /// Run the full optimization pipeline.
    ///
    /// Afterwards [`safe_length`](Self::safe_length) is the packet length
    /// from which no instruction can be short.
    ///
    /// # Errors
    /// Returns the [`validate`](Self::validate) error of a malformed program.
    /// The program is left untouched in that case.
    pub fn optimize_with(&mut self, config: &OptimizeConfig) -> ProgramResult<()> {
        self.validate()?;
        let before = self.len();

        self.bubble_sort_and_exprs(&config.offset_order, config.last_offset);
        DominatorOptimizer::new(self.insns_mut(), config.max_dominator_lists).run();
        self.combine_compatible_states();
        self.remove_unused_states();

        if self.is_empty() && self.output_everything().is_none() {
            self.set_output_everything(Some(Jump::Never));
        }

        let widest = self
            .insns()
            .iter()
            .map(|insn| insn.required_length())
            .max()
            .unwrap_or(0);
        self.set_safe_length(widest.saturating_sub(self.align_offset()));

        log::debug!(
            "optimized {} instructions into {}, safe length {}",
            before,
            self.len(),
            self.safe_length()
        );
        Ok(())
    }
}
