//! Classification Bytecode
//!
//! This module defines the wordwise instruction set and the two program
//! forms built from it:
//!
//! - [`program::Program`]: the editable decision DAG produced by the subtree
//!   builder and rewritten by the optimizer
//! - [`compressed::CompressedProgram`]: the packed form used for matching
//!
//! # Instruction Format
//!
//! ```text
//! +--------+---+--------+--------+------+------+
//! | offset | S |  mask  | value  |  no  | yes  |
//! +--------+---+--------+--------+------+------+
//! ```
//!
//! Each instruction compares `word(offset) & mask` against `value`, where
//! `word` is the big-endian 32-bit word at `offset` in the aligned frame.
//! `S` selects the branch taken by packets too short to supply the masked
//! bytes.

pub mod compressed;
pub mod insn;
pub mod jump;
pub mod program;
pub mod tree;
