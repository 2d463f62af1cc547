//! Packed-register helpers.
//!
//! N64 peripheral registers are single 32-bit words with named sub-fields.
//! Each status word in this crate is a newtype over `u32` built from the
//! accessors here, so named-field updates and the raw-word view always agree.
//!
//! Several registers (MI mode, DPC status) use the bit-pair write convention:
//! a control write carries two adjacent bits per logical flag, encoding one of
//! {no effect, clear, set}. [`WriteEffect::decode`] implements that
//! convention; a write asserting both bits resolves to **set**.

/// Extract a single bit as a flag.
#[inline]
pub fn bit(word: u32, n: u32) -> bool {
    word >> n & 1 != 0
}

/// Set or clear a single bit in place.
#[inline]
pub fn set_bit(word: &mut u32, n: u32, on: bool) {
    if on {
        *word |= 1 << n;
    } else {
        *word &= !(1 << n);
    }
}

/// Extract `width` bits starting at `lo`.
#[inline]
pub fn bits(word: u32, lo: u32, width: u32) -> u32 {
    word >> lo & ((1 << width) - 1)
}

/// Replace `width` bits starting at `lo`.
#[inline]
pub fn set_bits(word: &mut u32, lo: u32, width: u32, value: u32) {
    let mask = ((1u32 << width) - 1) << lo;
    *word = (*word & !mask) | (value << lo & mask);
}

/// One decoded effect of a bit-pair control write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    None,
    Clear,
    Set,
}

impl WriteEffect {
    /// Decode the (clear, set) bit pair of a control word.
    ///
    /// Both bits asserted resolves to `Set`; the hardware gives the set bit
    /// precedence and this crate follows it rather than leaving the case
    /// unspecified.
    pub fn decode(word: u32, clear_bit: u32, set_bit: u32) -> Self {
        match (bit(word, set_bit), bit(word, clear_bit)) {
            (true, _) => WriteEffect::Set,
            (false, true) => WriteEffect::Clear,
            (false, false) => WriteEffect::None,
        }
    }

    /// Apply this effect to a flag.
    pub fn apply(self, flag: &mut bool) {
        match self {
            WriteEffect::None => {}
            WriteEffect::Clear => *flag = false,
            WriteEffect::Set => *flag = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pair() {
        assert_eq!(WriteEffect::decode(0b00, 0, 1), WriteEffect::None);
        assert_eq!(WriteEffect::decode(0b01, 0, 1), WriteEffect::Clear);
        assert_eq!(WriteEffect::decode(0b10, 0, 1), WriteEffect::Set);
        // Both bits asserted: set wins.
        assert_eq!(WriteEffect::decode(0b11, 0, 1), WriteEffect::Set);
    }

    #[test]
    fn test_apply() {
        let mut flag = false;
        WriteEffect::Set.apply(&mut flag);
        assert!(flag);
        WriteEffect::None.apply(&mut flag);
        assert!(flag);
        WriteEffect::Clear.apply(&mut flag);
        assert!(!flag);
    }

    #[test]
    fn test_bit_field_round_trip() {
        let mut word = 0;
        set_bits(&mut word, 4, 4, 0xA);
        set_bit(&mut word, 12, true);
        assert_eq!(bits(word, 4, 4), 0xA);
        assert!(bit(word, 12));
        assert_eq!(word, 0x10A0);
    }
}
