//! Wordwise Packet Classification
//!
//! This crate compiles packet-matching patterns into a decision DAG of
//! 32-bit masked word tests, optimizes it, packs it into a compact word
//! array and matches packets against it. Pattern languages (filter
//! expressions, IP/port classifiers) sit on top and only need the subtree
//! builder and [`Classify`](execution::Classify).
//!
//! # Pipeline
//!
//! ```text
//! patterns -> Program (subtree builder) -> optimize -> CompressedProgram -> classify
//! ```
//!
//! # Modules
//!
//! - [`bytecode`] - Instructions, programs, the subtree builder and the
//!   compressed encoding
//! - [`optimizer`] - Dominator-based branch shifting and state reduction
//! - [`execution`] - Matching engines and the swappable shared classifier
//! - [`config`] - Optimizer and compiler tunables
//!
//! # Quick Start
//!
//! ```ignore
//! use pkt_classify::bytecode::compressed::CompressedProgram;
//! use pkt_classify::bytecode::jump::Jump;
//! use pkt_classify::bytecode::program::Program;
//! use pkt_classify::bytecode::tree::Combinator;
//! use pkt_classify::config::{OFFSET_MAX, OffsetOrder};
//! use pkt_classify::execution::Classify;
//!
//! // IPv4 -> port 0, everything else -> port 1
//! let mut prog = Program::new();
//! let mut tree = prog.init_subtree();
//! prog.start_subtree(&mut tree);
//! prog.start_subtree(&mut tree);
//! prog.add_insn(&mut tree, 12, 0x0800_0000, 0xFFFF_0000);
//! prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(0), Jump::Failure);
//! prog.start_subtree(&mut tree);
//! prog.add_insn(&mut tree, 0, 0, 0);
//! prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(1), Jump::Failure);
//! prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);
//!
//! prog.optimize(&OffsetOrder::identity(), OFFSET_MAX)?;
//! let zprog = CompressedProgram::compile(&prog)?;
//! assert_eq!(zprog.classify(&[0u8; 60]), 1);
//! ```

#![no_std]

extern crate alloc;

pub mod bytecode;
pub mod config;
pub mod execution;
pub mod optimizer;

pub use bytecode::compressed::CompressedProgram;
pub use bytecode::jump::{DROP_PORT, Jump};
pub use bytecode::program::{Program, ProgramError, ProgramResult};
pub use execution::{Classify, SharedClassifier};
