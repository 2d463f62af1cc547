//! The system bus: memory image ownership and address routing.
//!
//! Every memory-mapped access from the instruction pipeline lands here and is
//! routed to the owning component by physical address range. The bus owns the
//! RDRAM image the DMA engines transfer against, the SP data memory the
//! display interface can source from, and the 64-byte PIF RAM the serial
//! engine walks.
//!
//! # Physical map (routed ranges)
//!
//! | Range                        | Owner            |
//! |------------------------------|------------------|
//! | `0x0000_0000 - 0x007F_FFFF`  | RDRAM            |
//! | `0x0400_0000 - 0x0400_0FFF`  | SP DMEM          |
//! | `0x0410_0000 - 0x0410_001F`  | DPC              |
//! | `0x0430_0000 - 0x0430_000F`  | MI               |
//! | `0x0450_0000 - 0x0450_0017`  | AI               |
//! | `0x0470_0000 - 0x0470_001F`  | RI               |
//! | `0x0480_0000 - 0x0480_001B`  | SI               |
//! | `0x1000_0000 - 0x1FBF_FFFF`  | Cartridge ROM    |
//! | `0x1FC0_07C0 - 0x1FC0_07FF`  | PIF RAM          |
//!
//! Ranges are disjoint. Anything outside them reads as zero and absorbs
//! writes; ROM software probes unmapped space and depends on that.

use log::trace;

use crate::ai::AudioInterface;
use crate::cartridge::Cartridge;
use crate::dpc::DisplayProcessor;
use crate::error::CoreError;
use crate::mi::MipsInterface;
use crate::ri::RdramInterface;
use crate::si::{ControllerState, SerialInterface, PIF_RAM_SIZE};

pub const RDRAM_SIZE: usize = 0x0080_0000;
pub const SP_DMEM_SIZE: usize = 0x1000;

pub const RDRAM_BASE: u32 = 0x0000_0000;
pub const SP_DMEM_BASE: u32 = 0x0400_0000;
pub const DPC_BASE: u32 = 0x0410_0000;
pub const MI_BASE: u32 = 0x0430_0000;
pub const AI_BASE: u32 = 0x0450_0000;
pub const RI_BASE: u32 = 0x0470_0000;
pub const SI_BASE: u32 = 0x0480_0000;
pub const CART_ROM_BASE: u32 = 0x1000_0000;
pub const PIF_RAM_BASE: u32 = 0x1FC0_07C0;

/// The bus and every component it owns. Constructed once per session when a
/// cartridge is loaded and alive until teardown.
pub struct Bus {
    rdram: Vec<u8>,
    sp_dmem: Vec<u8>,
    pif_ram: [u8; PIF_RAM_SIZE],
    controllers: [ControllerState; 4],
    pub cartridge: Cartridge,
    pub mi: MipsInterface,
    pub ai: AudioInterface,
    pub si: SerialInterface,
    pub dpc: DisplayProcessor,
    pub ri: RdramInterface,
}

impl Bus {
    /// Build the bus around a loaded cartridge. The RDRAM allocation is the
    /// one operation here that can fail; it aborts session startup.
    pub fn new(cartridge: Cartridge) -> Result<Self, CoreError> {
        let mut rdram = Vec::new();
        rdram
            .try_reserve_exact(RDRAM_SIZE)
            .map_err(|source| CoreError::RdramAlloc {
                size: RDRAM_SIZE,
                source,
            })?;
        rdram.resize(RDRAM_SIZE, 0);

        let mut controllers = [ControllerState::default(); 4];
        // Port 1 always has a controller plugged in.
        controllers[0].connected = true;
        controllers[0].pak_inserted = true;

        Ok(Self {
            rdram,
            sp_dmem: vec![0; SP_DMEM_SIZE],
            pif_ram: [0; PIF_RAM_SIZE],
            controllers,
            cartridge,
            mi: MipsInterface::new(),
            ai: AudioInterface::new(),
            si: SerialInterface::new(),
            dpc: DisplayProcessor::new(),
            ri: RdramInterface::new(),
        })
    }

    /// Routed word read. KSEG mirrors fold down to the physical address.
    pub fn read_u32(&self, addr: u32) -> u32 {
        let paddr = addr & 0x1FFF_FFFF;
        match paddr {
            RDRAM_BASE..=0x007F_FFFF => read_be32(&self.rdram, paddr as usize),
            SP_DMEM_BASE..=0x0400_0FFF => {
                read_be32(&self.sp_dmem, (paddr - SP_DMEM_BASE) as usize)
            }
            DPC_BASE..=0x0410_001F => self.dpc.read(paddr - DPC_BASE),
            MI_BASE..=0x0430_000F => self.mi.read(paddr - MI_BASE),
            AI_BASE..=0x0450_0017 => self.ai.read(paddr - AI_BASE),
            RI_BASE..=0x0470_001F => self.ri.read(paddr - RI_BASE),
            SI_BASE..=0x0480_001B => self.si.read(paddr - SI_BASE),
            CART_ROM_BASE..=0x1FBF_FFFF => self.cartridge.read_u32(paddr - CART_ROM_BASE),
            PIF_RAM_BASE..=0x1FC0_07FF => {
                read_be32(&self.pif_ram, (paddr - PIF_RAM_BASE) as usize)
            }
            _ => {
                trace!("bus: unmapped read {paddr:#010x}");
                0
            }
        }
    }

    /// Routed word write. Any write that can move an interrupt-cause bit goes
    /// through the owning component with the MI in hand, so the aggregate
    /// signal reported by [`Bus::interrupt_pending`] is current the moment
    /// the write returns.
    pub fn write_u32(&mut self, addr: u32, value: u32) {
        let paddr = addr & 0x1FFF_FFFF;
        match paddr {
            RDRAM_BASE..=0x007F_FFFF => write_be32(&mut self.rdram, paddr as usize, value),
            SP_DMEM_BASE..=0x0400_0FFF => {
                write_be32(&mut self.sp_dmem, (paddr - SP_DMEM_BASE) as usize, value)
            }
            DPC_BASE..=0x0410_001F => self.dpc.write(
                paddr - DPC_BASE,
                value,
                &self.rdram,
                &self.sp_dmem,
                &mut self.mi,
            ),
            MI_BASE..=0x0430_000F => self.mi.write(paddr - MI_BASE, value),
            AI_BASE..=0x0450_0017 => self.ai.write(paddr - AI_BASE, value, &mut self.mi),
            RI_BASE..=0x0470_001F => self.ri.write(paddr - RI_BASE, value),
            SI_BASE..=0x0480_001B => self.si.write(
                paddr - SI_BASE,
                value,
                &mut self.rdram,
                &mut self.pif_ram,
                &self.controllers,
                &mut self.mi,
            ),
            // Cartridge ROM is read-only; writes are absorbed.
            CART_ROM_BASE..=0x1FBF_FFFF => {}
            PIF_RAM_BASE..=0x1FC0_07FF => {
                write_be32(&mut self.pif_ram, (paddr - PIF_RAM_BASE) as usize, value)
            }
            _ => trace!("bus: unmapped write {paddr:#010x} <- {value:#010x}"),
        }
    }

    /// Let every timing-driven engine poll its completion condition once per
    /// simulated time advance.
    pub fn tick(&mut self, cycles: u64) {
        self.ai.step(cycles, &mut self.mi);
        self.si.tick(cycles, &mut self.mi);
        self.dpc.tick(cycles);
    }

    /// Aggregate pending interrupt, the stepping loop's per-step query.
    #[inline]
    pub fn interrupt_pending(&self) -> bool {
        self.mi.pending()
    }

    /// Inject host input for one controller port.
    pub fn set_controller(&mut self, port: usize, state: ControllerState) {
        if let Some(slot) = self.controllers.get_mut(port) {
            *slot = state;
        }
    }

    pub fn rdram(&self) -> &[u8] {
        &self.rdram
    }

    pub fn rdram_mut(&mut self) -> &mut [u8] {
        &mut self.rdram
    }
}

fn read_be32(image: &[u8], addr: usize) -> u32 {
    match image.get(addr..addr + 4) {
        Some(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => 0,
    }
}

fn write_be32(image: &mut [u8], addr: usize, value: u32) {
    if let Some(slot) = image.get_mut(addr..addr + 4) {
        slot.copy_from_slice(&value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai;
    use crate::cartridge::tests::test_rom;
    use crate::mi::{self, IntSource};

    fn bus() -> Bus {
        Bus::new(Cartridge::new(test_rom(b"ZL")).unwrap()).unwrap()
    }

    #[test]
    fn test_rdram_round_trip() {
        let mut bus = bus();
        bus.write_u32(0x0010_0000, 0xDEAD_BEEF);
        assert_eq!(bus.read_u32(0x0010_0000), 0xDEAD_BEEF);
        // KSEG0 mirror of the same word.
        assert_eq!(bus.read_u32(0x8010_0000), 0xDEAD_BEEF);
    }

    #[test]
    fn test_unmapped_access_is_absorbed() {
        let mut bus = bus();
        assert_eq!(bus.read_u32(0x0500_0000), 0);
        bus.write_u32(0x0500_0000, 0x1234_5678);
        assert_eq!(bus.read_u32(0x0500_0000), 0);
    }

    #[test]
    fn test_rom_reads_and_absorbs_writes() {
        let mut bus = bus();
        let magic = bus.read_u32(CART_ROM_BASE);
        assert_eq!(magic, 0x8037_1240);
        bus.write_u32(CART_ROM_BASE, 0);
        assert_eq!(bus.read_u32(CART_ROM_BASE), magic);
    }

    #[test]
    fn test_register_routing() {
        let mut bus = bus();
        assert_eq!(bus.read_u32(MI_BASE + mi::MI_VERSION), mi::MI_VERSION_VALUE);

        bus.write_u32(AI_BASE + ai::AI_DACRATE, 0x3FF);
        assert_eq!(bus.read_u32(AI_BASE + ai::AI_DACRATE), 0x3FF);

        bus.write_u32(RI_BASE + crate::ri::RI_REFRESH, 0x7777);
        assert_eq!(bus.read_u32(RI_BASE + crate::ri::RI_REFRESH), 0x7777);
    }

    #[test]
    fn test_aggregate_recomputed_after_mutation() {
        let mut bus = bus();
        bus.write_u32(MI_BASE + mi::MI_MASK, IntSource::Ai.mask());
        assert!(!bus.interrupt_pending());

        // Queue a one-sample transfer and let it complete.
        bus.write_u32(AI_BASE + ai::AI_CONTROL, 1);
        bus.write_u32(AI_BASE + ai::AI_DACRATE, 0x3FF);
        bus.write_u32(AI_BASE + ai::AI_LENGTH, 8);
        bus.tick(u64::MAX / 2);
        assert!(bus.interrupt_pending());

        // Acknowledging through the AI status register drops the aggregate.
        bus.write_u32(AI_BASE + ai::AI_STATUS, 0);
        assert!(!bus.interrupt_pending());
    }

    #[test]
    fn test_pif_ram_round_trip() {
        let mut bus = bus();
        bus.write_u32(PIF_RAM_BASE + 8, 0xCAFE_F00D);
        assert_eq!(bus.read_u32(PIF_RAM_BASE + 8), 0xCAFE_F00D);
    }
}
