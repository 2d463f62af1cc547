//! RDRAM Interface (RI): the memory-controller calibration block.
//!
//! Passive configuration and status state for the RDRAM controller. Nothing
//! here has timing behavior, interrupts or DMA; the block exists because boot
//! code calibrates the RDRAM bus through it and later reads its settings
//! back.
//!
//! # Registers (base `0x0470_0000`)
//!
//! | Offset | Register        | Fields                                   |
//! |--------|-----------------|------------------------------------------|
//! | `0x00` | RI_MODE         | op mode (bits 0-1), stop T (2), stop R (3)|
//! | `0x04` | RI_CONFIG       | current control (bits 0-5), auto CC (6)  |
//! | `0x08` | RI_CURRENT_LOAD | Calibration load latch                   |
//! | `0x0C` | RI_SELECT       | rsel (bits 0-3), tsel (bits 4-7)         |
//! | `0x10` | RI_REFRESH      | Refresh timing word                      |

use crate::regs;

pub const RI_MODE: u32 = 0x00;
pub const RI_CONFIG: u32 = 0x04;
pub const RI_CURRENT_LOAD: u32 = 0x08;
pub const RI_SELECT: u32 = 0x0C;
pub const RI_REFRESH: u32 = 0x10;

/// Packed RI_MODE word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiMode(u32);

impl RiMode {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw & 0xF)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn op_mode(self) -> u32 {
        regs::bits(self.0, 0, 2)
    }

    pub fn stop_t(self) -> bool {
        regs::bit(self.0, 2)
    }

    pub fn stop_r(self) -> bool {
        regs::bit(self.0, 3)
    }
}

/// Packed RI_CONFIG word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiConfig(u32);

impl RiConfig {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw & 0x7F)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn current_control(self) -> u32 {
        regs::bits(self.0, 0, 6)
    }

    pub fn auto_cc(self) -> bool {
        regs::bit(self.0, 6)
    }
}

/// Packed RI_SELECT word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiSelect(u32);

impl RiSelect {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw & 0xFF)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn rsel(self) -> u32 {
        regs::bits(self.0, 0, 4)
    }

    pub fn tsel(self) -> u32 {
        regs::bits(self.0, 4, 4)
    }
}

/// RI register block.
#[derive(Debug)]
pub struct RdramInterface {
    mode: RiMode,
    config: RiConfig,
    select: RiSelect,
    refresh: u32,
    current_load: u32,
    /// Set once boot code has latched a calibration load.
    init: bool,
}

impl Default for RdramInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl RdramInterface {
    /// Power-on state. RI_SELECT comes up as `0x14`: IPL3 reads a non-zero
    /// select word as "RDRAM already calibrated" and skips the init dance,
    /// which is the behavior an emulated session wants.
    pub fn new() -> Self {
        Self {
            mode: RiMode::default(),
            config: RiConfig::default(),
            select: RiSelect::from_raw(0x14),
            refresh: 0,
            current_load: 0,
            init: false,
        }
    }

    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            RI_MODE => self.mode.raw(),
            RI_CONFIG => self.config.raw(),
            RI_CURRENT_LOAD => self.current_load,
            RI_SELECT => self.select.raw(),
            RI_REFRESH => self.refresh,
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        match offset {
            RI_MODE => self.mode = RiMode::from_raw(value),
            RI_CONFIG => self.config = RiConfig::from_raw(value),
            RI_CURRENT_LOAD => {
                self.current_load = value;
                self.init = true;
            }
            RI_SELECT => self.select = RiSelect::from_raw(value),
            RI_REFRESH => self.refresh = value,
            _ => {}
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_power_on_value() {
        let ri = RdramInterface::new();
        assert_eq!(ri.read(RI_SELECT), 0x14);
        assert_eq!(RiSelect::from_raw(0x14).rsel(), 0x4);
        assert_eq!(RiSelect::from_raw(0x14).tsel(), 0x1);
    }

    #[test]
    fn test_write_read_round_trip_with_masks() {
        let mut ri = RdramInterface::new();
        ri.write(RI_MODE, 0xFFFF_FFFE);
        assert_eq!(ri.read(RI_MODE), 0xE);
        assert_eq!(RiMode::from_raw(0xE).op_mode(), 0x2);
        assert!(RiMode::from_raw(0xE).stop_t());
        assert!(RiMode::from_raw(0xE).stop_r());

        ri.write(RI_CONFIG, 0x7F);
        assert_eq!(ri.read(RI_CONFIG), 0x7F);
        assert_eq!(RiConfig::from_raw(0x7F).current_control(), 0x3F);
        assert!(RiConfig::from_raw(0x7F).auto_cc());

        ri.write(RI_SELECT, 0xAB);
        assert_eq!(ri.read(RI_SELECT), 0xAB);
        ri.write(RI_REFRESH, 0x0001_2345);
        assert_eq!(ri.read(RI_REFRESH), 0x0001_2345);
    }

    #[test]
    fn test_current_load_latches_and_marks_init() {
        let mut ri = RdramInterface::new();
        assert!(!ri.is_initialized());
        ri.write(RI_CURRENT_LOAD, 0x1234);
        assert!(ri.is_initialized());
        assert_eq!(ri.read(RI_CURRENT_LOAD), 0x1234);
    }
}
