//! Classification Instructions
//!
//! An [`Insn`] tests one 32-bit big-endian word of the packet:
//!
//! ```text
//! (word(offset) & mask) == value
//! ```
//!
//! and continues at `j[1]` when the test holds, `j[0]` otherwise. Packets
//! too short to supply every masked byte skip the comparison and take
//! `j[short_output]`.
//!
//! # Implication Predicates
//!
//! The optimizer reasons about pairs of tests. Each predicate answers a
//! question of the form "if `self` took branch A, must `x` take branch B?"
//! for any packet at least `known_length` bytes long (in the aligned frame).
//! Short packets are accounted for on both sides: a predicate only holds if
//! it also holds for packets that reached either test's short branch.

use core::fmt;

use super::jump::Jump;

/// Width in bytes of the word an instruction tests.
pub const WORD_WIDTH: u32 = 4;

/// A single wordwise test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Insn {
    /// Offset of the tested word in the aligned packet frame.
    pub offset: u32,
    /// Branch taken by packets too short for this test (`true` = yes).
    pub short_output: bool,
    /// Bits of the word that are compared.
    pub mask: u32,
    /// Expected value of the masked word. Always a subset of `mask`.
    pub value: u32,
    /// Branch targets, indexed by outcome: `j[0]` is no, `j[1]` is yes.
    pub j: [Jump; 2],
}

impl Insn {
    /// Create a test with explicit branches. `value` is reduced to `mask`.
    pub const fn new(offset: u32, value: u32, mask: u32, yes: Jump, no: Jump) -> Self {
        Self {
            offset,
            short_output: false,
            mask,
            value: value & mask,
            j: [no, yes],
        }
    }

    /// Create a test whose branches are the subtree placeholders:
    /// yes goes to [`Jump::Success`], no to [`Jump::Failure`].
    pub const fn unlinked(offset: u32, value: u32, mask: u32) -> Self {
        Self::new(offset, value, mask, Jump::Success, Jump::Failure)
    }

    /// Builder-style setter for the short output.
    pub const fn with_short_output(mut self, short_output: bool) -> Self {
        self.short_output = short_output;
        self
    }

    #[inline]
    pub const fn yes(&self) -> Jump {
        self.j[1]
    }

    #[inline]
    pub const fn no(&self) -> Jump {
        self.j[0]
    }

    #[inline]
    pub fn set_yes(&mut self, jump: Jump) {
        self.j[1] = jump;
    }

    #[inline]
    pub fn set_no(&mut self, jump: Jump) {
        self.j[0] = jump;
    }

    /// Number of packet bytes (from the start of the aligned frame) needed
    /// to evaluate this test. Zero if the mask is empty.
    #[inline]
    pub const fn required_length(&self) -> u32 {
        if self.mask == 0 {
            0
        } else {
            self.offset
                .saturating_add(WORD_WIDTH - self.mask.trailing_zeros() / 8)
        }
    }

    /// Whether a packet of `packet_length` bytes (aligned frame) is too short
    /// for this test.
    #[inline]
    pub const fn is_short_for(&self, packet_length: u32) -> bool {
        self.required_length() > packet_length
    }

    /// Whether `self` and `other` perform exactly the same test.
    #[inline]
    pub const fn same_test(&self, other: &Insn) -> bool {
        self.offset == other.offset
            && self.short_output == other.short_output
            && self.mask == other.mask
            && self.value == other.value
    }

    /// Whether a taken branch implies `x` takes `next_direction`, as far as
    /// short packets are concerned. `direction` is the branch `self` took.
    fn short_ok(&self, direction: bool, x: &Insn, next_direction: bool, known_length: u32) -> bool {
        let r = self.required_length();
        let xr = x.required_length();

        // Packets that took `direction` because they were short for `self`.
        if self.short_output == direction
            && r > known_length
            && !(r <= xr && x.short_output == next_direction)
        {
            return false;
        }

        // Packets long enough for `self` but possibly short for `x`.
        xr <= r.max(known_length) || x.short_output == next_direction
    }

    /// If `self` succeeded, `x` succeeds.
    pub fn implies(&self, x: &Insn, known_length: u32) -> bool {
        if x.mask == 0 {
            return true;
        }
        if x.offset != self.offset || !self.short_ok(true, x, true, known_length) {
            return false;
        }
        let both_mask = self.mask & x.mask;
        both_mask == x.mask && (self.value & both_mask) == x.value
    }

    /// If `self` failed, `x` succeeds.
    ///
    /// Only holds for complementary single-bit tests.
    pub fn not_implies(&self, x: &Insn, known_length: u32) -> bool {
        if x.mask == 0 {
            return true;
        }
        if x.offset != self.offset || !self.short_ok(false, x, true, known_length) {
            return false;
        }
        self.mask.is_power_of_two() && self.mask == x.mask && self.value != x.value
    }

    /// If `self` succeeded, `x` fails.
    pub fn implies_not(&self, x: &Insn, known_length: u32) -> bool {
        if x.mask == 0
            || x.offset != self.offset
            || !self.short_ok(true, x, false, known_length)
        {
            return false;
        }
        let both_mask = self.mask & x.mask;
        both_mask == x.mask && (self.value & both_mask) != x.value
    }

    /// If `self` failed, `x` fails.
    pub fn not_implies_not(&self, x: &Insn, known_length: u32) -> bool {
        // an empty test never fails
        if self.mask == 0 {
            return true;
        }
        if x.offset != self.offset || !self.short_ok(false, x, false, known_length) {
            return false;
        }
        let both_mask = self.mask & x.mask;
        both_mask == self.mask && self.value == (x.value & both_mask)
    }

    /// Whether some packet can pass both `self` and `x`.
    ///
    /// With `consider_short`, tests whose short outputs differ are only
    /// compatible if `self` needs at least as many bytes as `x`.
    pub fn compatible(&self, x: &Insn, consider_short: bool) -> bool {
        if self.mask == 0 || x.mask == 0 {
            return true;
        }
        if x.offset != self.offset
            || (consider_short
                && x.short_output != self.short_output
                && self.required_length() < x.required_length())
        {
            return false;
        }
        let both_mask = self.mask & x.mask;
        (self.value & both_mask) == (x.value & both_mask)
    }

    /// Whether `self` and its no-successor `x` form `word == A || word == B`
    /// with `A` and `B` differing in exactly one bit, so the pair can become
    /// a single test with that bit masked out.
    pub fn generalizable_or_pair(&self, x: &Insn) -> bool {
        let value_diff = self.value ^ x.value;
        if x.offset == self.offset
            && self.mask != 0
            && x.mask == self.mask
            && (self.short_output || !x.short_output)
            && self.yes() == x.yes()
            && value_diff.is_power_of_two()
        {
            let test = Insn::unlinked(self.offset, self.value & !value_diff, self.mask & !value_diff);
            test.required_length() == self.required_length()
        } else {
            false
        }
    }

    /// Short output of the test `self && yes_in` merged into one
    /// instruction, if a single short output reproduces the chain.
    ///
    /// `self` fails to the same place `yes_in` fails to.
    pub fn merged_short_output(&self, yes_in: &Insn) -> Option<bool> {
        if self.mask == 0 {
            return Some(yes_in.short_output);
        }
        if yes_in.mask == 0 {
            return Some(self.short_output);
        }
        let r = self.required_length();
        let yr = yes_in.required_length();
        match (self.short_output, yes_in.short_output) {
            (false, false) => Some(false),
            (false, true) if yr <= r => Some(false),
            (true, false) if yr >= r => Some(false),
            (true, true) if yr == r => Some(true),
            _ => None,
        }
    }

    /// Single-bit tests can be inverted by flipping the bit.
    #[inline]
    pub const fn flippable(&self) -> bool {
        self.mask.is_power_of_two()
    }

    /// Invert the test, swapping its branches and short output so that
    /// every packet still reaches the same target.
    ///
    /// Callers must check [`flippable`](Self::flippable) first.
    pub fn flip(&mut self) {
        debug_assert!(self.flippable());
        self.value ^= self.mask;
        self.j.swap(0, 1);
        self.short_output = !self.short_output;
    }

    /// Shift step targets by `by` instructions.
    #[inline]
    pub const fn offset_by(mut self, by: usize) -> Self {
        self.j = [self.j[0].offset_by(by), self.j[1].offset_by(by)];
        self
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:3}/{:08x}%{:08x}  yes->{}  no->{}",
            self.offset,
            self.value,
            self.mask,
            self.yes(),
            self.no()
        )?;
        if self.short_output {
            f.write_str("  short->yes")?;
        }
        Ok(())
    }
}
