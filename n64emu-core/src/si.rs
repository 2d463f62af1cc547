//! Serial Interface (SI): the controller/peripheral DMA engine.
//!
//! The SI moves fixed 64-byte blocks between RDRAM and PIF RAM and executes
//! the PIF joybus protocol while doing so: channels 0-3 address the four
//! controller ports, channel 4 the cartridge save slot. At most one
//! transaction is ever in flight; firmware polls the busy bit and a request
//! issued while busy is rejected outright rather than queued.
//!
//! # Registers (base `0x0480_0000`)
//!
//! | Offset | Register         | Description                              |
//! |--------|------------------|------------------------------------------|
//! | `0x00` | SI_DRAM_ADDR     | RDRAM transfer address                   |
//! | `0x04` | SI_PIF_AD_RD64B  | Write starts a PIF -> RDRAM DMA          |
//! | `0x10` | SI_PIF_AD_WR64B  | Write starts an RDRAM -> PIF DMA         |
//! | `0x18` | SI_STATUS        | Packed status; write acknowledges the IRQ|

use log::{debug, trace};
use smallvec::SmallVec;

use crate::mi::{IntSource, MipsInterface};
use crate::regs;

pub const SI_DRAM_ADDR: u32 = 0x00;
pub const SI_PIF_AD_RD64B: u32 = 0x04;
pub const SI_PIF_AD_WR64B: u32 = 0x10;
pub const SI_STATUS: u32 = 0x18;

pub const PIF_RAM_SIZE: usize = 64;

/// Fixed setup cost of one SI DMA, before per-byte channel costs.
const DMA_BASE_CYCLES: u64 = 1_880;
/// Approximate CPU cycles per joybus byte moved.
const CYCLES_PER_BYTE: u64 = 200;

/// Packed SI_STATUS word.
///
/// | Bits | Field        |
/// |------|--------------|
/// | 0    | dma_busy     |
/// | 1    | io_busy      |
/// | 2    | read_pending |
/// | 3    | dma_error    |
/// | 4-7  | pch_state    |
/// | 8-11 | dma_state    |
/// | 12   | interrupt    |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiStatus(u32);

impl SiStatus {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn dma_busy(self) -> bool {
        regs::bit(self.0, 0)
    }

    pub fn set_dma_busy(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 0, on);
    }

    pub fn io_busy(self) -> bool {
        regs::bit(self.0, 1)
    }

    pub fn set_io_busy(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 1, on);
    }

    pub fn read_pending(self) -> bool {
        regs::bit(self.0, 2)
    }

    pub fn set_read_pending(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 2, on);
    }

    pub fn dma_error(self) -> bool {
        regs::bit(self.0, 3)
    }

    pub fn set_dma_error(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 3, on);
    }

    pub fn pch_state(self) -> u32 {
        regs::bits(self.0, 4, 4)
    }

    pub fn set_pch_state(&mut self, state: u32) {
        regs::set_bits(&mut self.0, 4, 4, state);
    }

    pub fn dma_state(self) -> u32 {
        regs::bits(self.0, 8, 4)
    }

    pub fn set_dma_state(&mut self, state: u32) {
        regs::set_bits(&mut self.0, 8, 4, state);
    }

    pub fn interrupt(self) -> bool {
        regs::bit(self.0, 12)
    }

    pub fn set_interrupt(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 12, on);
    }
}

/// Transfer direction of one SI transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DmaDirection {
    #[default]
    None,
    /// PIF RAM -> RDRAM (run the joybus walk, then copy responses out).
    Read,
    /// RDRAM -> PIF RAM (copy the command block in, then run the walk).
    Write,
}

/// Host-injected state of one controller port.
#[derive(Debug, Clone, Copy)]
pub struct ControllerState {
    pub connected: bool,
    pub pak_inserted: bool,
    pub buttons: u16,
    pub stick_x: i8,
    pub stick_y: i8,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            connected: false,
            pak_inserted: false,
            buttons: 0,
            stick_x: 0,
            stick_y: 0,
        }
    }
}

/// SI register and transaction state.
#[derive(Debug, Default)]
pub struct SerialInterface {
    status: SiStatus,
    dram_address: u32,
    dir: DmaDirection,
    /// Cycles left until the in-flight transaction completes.
    remaining_cycles: u64,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register read. No side effects.
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            SI_DRAM_ADDR => self.dram_address,
            SI_STATUS => self.status.raw(),
            _ => 0,
        }
    }

    /// Register write. RD64B/WR64B writes start a DMA transaction;
    /// a SI_STATUS write acknowledges the SI interrupt.
    pub fn write(
        &mut self,
        offset: u32,
        value: u32,
        rdram: &mut [u8],
        pif: &mut [u8; PIF_RAM_SIZE],
        input: &[ControllerState; 4],
        mi: &mut MipsInterface,
    ) {
        match offset {
            SI_DRAM_ADDR => self.dram_address = value & 0x00FF_FFF8,
            SI_PIF_AD_RD64B => self.handle_dma(DmaDirection::Read, rdram, pif, input),
            SI_PIF_AD_WR64B => self.handle_dma(DmaDirection::Write, rdram, pif, input),
            SI_STATUS => {
                self.status.set_interrupt(false);
                mi.lower(IntSource::Si);
            }
            _ => {}
        }
    }

    pub fn status(&self) -> SiStatus {
        self.status
    }

    pub fn dram_address(&self) -> u32 {
        self.dram_address
    }

    /// Direction of the in-flight transaction, `None` when idle.
    pub fn direction(&self) -> DmaDirection {
        self.dir
    }

    /// Start one SI transaction. Rejected outright while a transaction is in
    /// flight: registers, channel state and interrupt cause are all left
    /// unchanged, matching the busy-poll contract ROM firmware depends on.
    pub fn handle_dma(
        &mut self,
        dir: DmaDirection,
        rdram: &mut [u8],
        pif: &mut [u8; PIF_RAM_SIZE],
        input: &[ControllerState; 4],
    ) {
        if self.status.dma_busy() {
            debug!("si: dma request while busy, rejected");
            return;
        }

        self.status.set_dma_busy(true);
        self.status.set_dma_state(1);
        self.dir = dir;

        let base = (self.dram_address as usize) & !7;
        let mut cost = DMA_BASE_CYCLES;
        match dir {
            DmaDirection::Write => {
                if let Some(block) = rdram.get(base..base + PIF_RAM_SIZE) {
                    pif.copy_from_slice(block);
                }
                cost += self.process_ram(pif, input);
            }
            DmaDirection::Read => {
                cost += self.process_ram(pif, input);
                if let Some(block) = rdram.get_mut(base..base + PIF_RAM_SIZE) {
                    block.copy_from_slice(pif);
                }
            }
            DmaDirection::None => {}
        }

        self.remaining_cycles = cost;
        debug!(
            "si: {:?} dma at {:#010x}, {} cycles",
            dir, self.dram_address, cost
        );
    }

    /// Poll the in-flight transaction. When the accumulated channel cost has
    /// elapsed the transaction completes: busy clears, the status interrupt
    /// flag latches and the SI cause bit is raised.
    pub fn tick(&mut self, cycles: u64, mi: &mut MipsInterface) {
        if !self.status.dma_busy() {
            return;
        }
        self.remaining_cycles = self.remaining_cycles.saturating_sub(cycles);
        if self.remaining_cycles == 0 {
            self.status.set_dma_busy(false);
            self.status.set_dma_state(0);
            self.status.set_pch_state(0);
            self.dir = DmaDirection::None;
            self.status.set_interrupt(true);
            mi.raise(IntSource::Si);
            debug!("si: dma complete");
        }
    }

    /// Walk the full 64-byte PIF command block, dispatching each command to
    /// its channel in ascending order and accumulating per-channel cost.
    pub fn process_ram(&mut self, pif: &mut [u8; PIF_RAM_SIZE], input: &[ControllerState; 4]) -> u64 {
        let mut cost = 0;
        let mut pos = 0;
        let mut channel = 0;
        while pos < PIF_RAM_SIZE {
            match pif[pos] {
                // End of the command frame.
                0xFE => break,
                // Padding.
                0xFF => pos += 1,
                // Channel skip / reset markers.
                0x00 | 0xFD => {
                    channel += 1;
                    pos += 1;
                }
                tx => {
                    let tx = (tx & 0x3F) as usize;
                    // The rx byte at pos+1, the command byte at pos+2 and the
                    // tx region must all lie inside the block; a truncated
                    // command is absorbed, the walk just stops.
                    if pos + 3 > PIF_RAM_SIZE || pos + 2 + tx > PIF_RAM_SIZE {
                        trace!("si: command block overruns pif ram at {pos}");
                        break;
                    }
                    let rx = (pif[pos + 1] & 0x3F) as usize;
                    cost += self.process_channel(channel, pos, pif, input);
                    pos += 2 + tx + rx;
                    channel += 1;
                }
            }
        }
        cost
    }

    /// Execute one joybus command against `channel`, writing the response
    /// into the block's receive region. Returns the simulated cycle cost.
    pub fn process_channel(
        &mut self,
        channel: usize,
        pos: usize,
        pif: &mut [u8; PIF_RAM_SIZE],
        input: &[ControllerState; 4],
    ) -> u64 {
        let tx = (pif[pos] & 0x3F) as usize;
        let rx = (pif[pos + 1] & 0x3F) as usize;
        let cmd = pif[pos + 2];
        self.status.set_pch_state((channel as u32).min(0xF));

        let mut resp: SmallVec<[u8; PIF_RAM_SIZE]> = SmallVec::new();
        if channel >= 4 {
            // Cartridge slot: EEPROM is always reported present; its backing
            // store lives with the host's save-file handling.
            match cmd {
                0x00 | 0xFF => resp.extend_from_slice(&[0x00, 0x80, 0x00]),
                0x04 => resp.extend_from_slice(&[0; 8]),
                0x05 => resp.push(0x00),
                _ => {
                    pif[pos + 1] |= 0x80;
                    return CYCLES_PER_BYTE;
                }
            }
        } else {
            let pad = &input[channel];
            if !pad.connected {
                // Absent device: the stored rx byte reports the error.
                pif[pos + 1] |= 0x80;
                return CYCLES_PER_BYTE;
            }
            match cmd {
                0x00 | 0xFF => {
                    let pak = if pad.pak_inserted { 0x01 } else { 0x02 };
                    resp.extend_from_slice(&[0x05, 0x00, pak]);
                }
                0x01 => {
                    let buttons = pad.buttons.to_be_bytes();
                    resp.extend_from_slice(&[
                        buttons[0],
                        buttons[1],
                        pad.stick_x as u8,
                        pad.stick_y as u8,
                    ]);
                }
                0x02 => {
                    // Controller pak read: 32 data bytes plus the data CRC.
                    // The address CRC in the tx bytes is accepted as-is.
                    // No pak storage is modeled; reads return zeroes.
                    resp.extend_from_slice(&[0; 32]);
                    let crc = pak_data_crc(&resp[..32]);
                    resp.push(crc);
                }
                0x03 => {
                    // Controller pak write: acknowledge with the data CRC.
                    let data_at = pos + 5;
                    let crc = pif
                        .get(data_at..data_at + 32)
                        .map(pak_data_crc)
                        .unwrap_or(0);
                    resp.push(crc);
                }
                _ => {
                    pif[pos + 1] |= 0x80;
                    return CYCLES_PER_BYTE;
                }
            }
        }

        let resp_at = pos + 2 + tx;
        let count = resp.len().min(rx).min(PIF_RAM_SIZE.saturating_sub(resp_at));
        pif[resp_at..resp_at + count].copy_from_slice(&resp[..count]);
        ((tx + rx) as u64) * CYCLES_PER_BYTE
    }
}

/// Joybus controller-pak data CRC (polynomial 0x85, one flush iteration).
fn pak_data_crc(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for i in 0..=data.len() {
        for bit in (0..8).rev() {
            let xor = if crc & 0x80 != 0 { 0x85 } else { 0 };
            crc <<= 1;
            if i < data.len() && data[i] & (1 << bit) != 0 {
                crc |= 1;
            }
            crc ^= xor;
        }
    }
    crc
}
