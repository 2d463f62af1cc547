//! MIPS Interface (MI): interrupt aggregation and system-mode registers.
//!
//! The MI collects the cause bits of the six hardware interrupt sources,
//! masks them, and produces the single pending signal the instruction
//! pipeline polls once per step.
//!
//! # Registers (base `0x0430_0000`)
//!
//! | Offset | Register     | Description                                  |
//! |--------|--------------|----------------------------------------------|
//! | `0x00` | MI_MODE      | Repeat/ebus/upper mode, bit-pair write       |
//! | `0x04` | MI_VERSION   | Hardware revision, constant `0x0202_0102`    |
//! | `0x08` | MI_INTERRUPT | Cause bits, read-only from the bus           |
//! | `0x0C` | MI_MASK      | Mask bits, plain write-through               |
//!
//! # Interrupt sources
//!
//! | Bit | Source | Raised by                          |
//! |-----|--------|------------------------------------|
//! | 0   | SP     | Signal processor (external)        |
//! | 1   | SI     | Serial DMA completion              |
//! | 2   | AI     | Audio DMA slot completion          |
//! | 3   | VI     | Vertical interrupt (external)      |
//! | 4   | PI     | Parallel DMA completion (external) |
//! | 5   | DP     | Display pipeline Sync-Full         |
//!
//! A peripheral touches only its own cause bit, through [`MipsInterface::raise`]
//! and [`MipsInterface::lower`]. The aggregate is always computed from the
//! live cause and mask words, never cached.

use crate::regs::{self, WriteEffect};

pub const MI_MODE: u32 = 0x00;
pub const MI_VERSION: u32 = 0x04;
pub const MI_INTERRUPT: u32 = 0x08;
pub const MI_MASK: u32 = 0x0C;

/// Value read back from MI_VERSION on retail hardware.
pub const MI_VERSION_VALUE: u32 = 0x0202_0102;

/// The six hardware interrupt sources, in cause/mask bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IntSource {
    Sp = 0,
    Si = 1,
    Ai = 2,
    Vi = 3,
    Pi = 4,
    Dp = 5,
}

impl IntSource {
    pub const ALL: [IntSource; 6] = [
        IntSource::Sp,
        IntSource::Si,
        IntSource::Ai,
        IntSource::Vi,
        IntSource::Pi,
        IntSource::Dp,
    ];

    #[inline]
    pub fn mask(self) -> u32 {
        1 << self as u32
    }
}

/// MI register state.
#[derive(Debug, Default)]
pub struct MipsInterface {
    /// Number of bytes (minus one) written in repeat mode.
    repeat_count: u8,
    repeat_mode: bool,
    ebus_test: bool,
    upper_mode: bool,
    interrupt: u32,
    mask: u32,
}

impl MipsInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register read. No side effects.
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            MI_MODE => self.mode(),
            MI_VERSION => MI_VERSION_VALUE,
            MI_INTERRUPT => self.interrupt,
            MI_MASK => self.mask,
            _ => 0,
        }
    }

    /// Register write. MI_VERSION and MI_INTERRUPT are read-only and the
    /// write is absorbed.
    pub fn write(&mut self, offset: u32, value: u32) {
        match offset {
            MI_MODE => self.write_mode(value),
            MI_MASK => self.set_mask(value),
            _ => {}
        }
    }

    /// MI_MODE read composition: repeat length in bits 0-6, repeat mode in
    /// bit 7, ebus test in bit 8, RDRAM-upper mode in bit 9.
    pub fn mode(&self) -> u32 {
        let mut word = u32::from(self.repeat_count) & 0x7F;
        regs::set_bit(&mut word, 7, self.repeat_mode);
        regs::set_bit(&mut word, 8, self.ebus_test);
        regs::set_bit(&mut word, 9, self.upper_mode);
        word
    }

    /// MI_MODE write. Effects apply in ascending bit order:
    /// bits 0-6 repeat length, (7 clear / 8 set) repeat mode,
    /// (9 clear / 10 set) ebus test, bit 11 acknowledges the DP interrupt,
    /// (13 clear / 12 set) upper mode. A pair asserting both bits sets.
    pub fn write_mode(&mut self, value: u32) {
        self.repeat_count = (value & 0x7F) as u8;
        WriteEffect::decode(value, 7, 8).apply(&mut self.repeat_mode);
        WriteEffect::decode(value, 9, 10).apply(&mut self.ebus_test);
        if regs::bit(value, 11) {
            self.lower(IntSource::Dp);
        }
        WriteEffect::decode(value, 13, 12).apply(&mut self.upper_mode);
    }

    /// MI_MASK write: replaces the six mask bits wholesale.
    pub fn set_mask(&mut self, value: u32) {
        self.mask = value & 0x3F;
    }

    /// Raise a source's cause bit.
    pub fn raise(&mut self, source: IntSource) {
        self.interrupt |= source.mask();
    }

    /// Clear a source's cause bit.
    pub fn lower(&mut self, source: IntSource) {
        self.interrupt &= !source.mask();
    }

    pub fn is_raised(&self, source: IntSource) -> bool {
        self.interrupt & source.mask() != 0
    }

    /// Aggregate pending signal: `(cause & mask) != 0`, computed from the
    /// live words on every call.
    #[inline]
    pub fn pending(&self) -> bool {
        self.interrupt & self.mask != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_constant() {
        let mut mi = MipsInterface::new();
        mi.write(MI_VERSION, 0xDEAD_BEEF);
        assert_eq!(mi.read(MI_VERSION), MI_VERSION_VALUE);
    }

    #[test]
    fn test_aggregate_pending_all_pairs() {
        // Every (cause, mask) combination across the six sources.
        for cause in 0u32..64 {
            for mask in 0u32..64 {
                let mut mi = MipsInterface::new();
                for src in IntSource::ALL {
                    if cause & src.mask() != 0 {
                        mi.raise(src);
                    }
                }
                mi.set_mask(mask);
                assert_eq!(mi.pending(), cause & mask != 0, "cause={cause:#x} mask={mask:#x}");
            }
        }
    }

    #[test]
    fn test_each_source_independently() {
        for src in IntSource::ALL {
            let mut mi = MipsInterface::new();
            mi.set_mask(src.mask());
            assert!(!mi.pending());
            mi.raise(src);
            assert!(mi.pending());
            assert!(mi.is_raised(src));
            mi.lower(src);
            assert!(!mi.pending());
        }
    }

    #[test]
    fn test_mask_write_is_wholesale() {
        let mut mi = MipsInterface::new();
        mi.write(MI_MASK, 0x3F);
        assert_eq!(mi.read(MI_MASK), 0x3F);
        // A second write replaces rather than merges, and spills are dropped.
        mi.write(MI_MASK, 0xFFFF_FFC1);
        assert_eq!(mi.read(MI_MASK), 0x01);
    }

    #[test]
    fn test_cause_word_not_writable_from_bus() {
        let mut mi = MipsInterface::new();
        mi.write(MI_INTERRUPT, 0x3F);
        assert_eq!(mi.read(MI_INTERRUPT), 0);
    }

    #[test]
    fn test_mode_bit_pairs() {
        let mut mi = MipsInterface::new();
        mi.write_mode(0x15 | 1 << 8 | 1 << 10 | 1 << 12);
        assert_eq!(mi.mode(), 0x15 | 1 << 7 | 1 << 8 | 1 << 9);

        mi.write_mode(1 << 7 | 1 << 9 | 1 << 13);
        assert_eq!(mi.mode(), 0);

        // Both clear and set asserted resolves to set.
        let mut mi = MipsInterface::new();
        mi.write_mode(1 << 7 | 1 << 8);
        assert!(mi.mode() & 1 << 7 != 0);
    }

    #[test]
    fn test_mode_write_acknowledges_dp() {
        let mut mi = MipsInterface::new();
        mi.raise(IntSource::Dp);
        mi.raise(IntSource::Ai);
        mi.write_mode(1 << 11);
        assert!(!mi.is_raised(IntSource::Dp));
        assert!(mi.is_raised(IntSource::Ai));
    }
}
