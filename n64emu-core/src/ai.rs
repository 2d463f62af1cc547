//! Audio Interface (AI): the audio-output DMA engine.
//!
//! The AI streams sample data from RDRAM to the DAC through a two-slot DMA
//! queue. Writing AI_LENGTH attempts to queue a transfer; a slot's playback
//! duration is derived from its byte length and the DAC rate, and the engine
//! is polled once per simulated time advance until the head slot's duration
//! has elapsed. Completion pops the slot, shifts the remaining one forward
//! and raises the AI interrupt cause bit.
//!
//! # Registers (base `0x0450_0000`)
//!
//! | Offset | Register     | Description                                   |
//! |--------|--------------|-----------------------------------------------|
//! | `0x00` | AI_DRAM_ADDR | Transfer source, masked to `0x00FF_FFF8`      |
//! | `0x04` | AI_LENGTH    | Transfer length; write attempts a DMA push    |
//! | `0x08` | AI_CONTROL   | Bit 0 enables the DMA engine                  |
//! | `0x0C` | AI_STATUS    | Packed status; write acknowledges the IRQ     |
//! | `0x10` | AI_DACRATE   | DAC clock divider (14 bits)                   |
//! | `0x14` | AI_BITRATE   | Bits per sample (4 bits)                      |
//!
//! A push while the queue is full is a silent no-op: real hardware drops the
//! write and ROM audio drivers rely on polling the full bit, so this is not
//! an error path.

use log::{debug, trace};

use crate::mi::{IntSource, MipsInterface};
use crate::regs;

pub const AI_DRAM_ADDR: u32 = 0x00;
pub const AI_LENGTH: u32 = 0x04;
pub const AI_CONTROL: u32 = 0x08;
pub const AI_STATUS: u32 = 0x0C;
pub const AI_DACRATE: u32 = 0x10;
pub const AI_BITRATE: u32 = 0x14;

/// VR4300 core clock; slot durations are expressed in these cycles.
pub const CPU_HZ: u64 = 93_750_000;
/// NTSC DAC clock feeding the AI divider.
pub const DAC_CLOCK_NTSC: u32 = 48_681_812;

/// Packed AI_STATUS word.
///
/// | Bits  | Field    | Meaning                           |
/// |-------|----------|-----------------------------------|
/// | 0     | full     | FIFO holds two slots (mirror of 31)|
/// | 1-15  | count    | Remaining-sample counter          |
/// | 16    | bc       | Buffer counter carry              |
/// | 19    | wc       | Word clock                        |
/// | 25    | enabled  | DMA engine enabled                |
/// | 30    | dma_busy | A transfer is in flight           |
/// | 31    | full     | FIFO holds two slots              |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AiStatus(u32);

impl AiStatus {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn full(self) -> bool {
        regs::bit(self.0, 31)
    }

    /// The full flag is mirrored at bits 0 and 31.
    pub fn set_full(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 0, on);
        regs::set_bit(&mut self.0, 31, on);
    }

    pub fn count(self) -> u32 {
        regs::bits(self.0, 1, 15)
    }

    pub fn set_count(&mut self, count: u32) {
        regs::set_bits(&mut self.0, 1, 15, count);
    }

    pub fn bc(self) -> bool {
        regs::bit(self.0, 16)
    }

    pub fn set_bc(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 16, on);
    }

    pub fn wc(self) -> bool {
        regs::bit(self.0, 19)
    }

    pub fn set_wc(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 19, on);
    }

    pub fn enabled(self) -> bool {
        regs::bit(self.0, 25)
    }

    pub fn set_enabled(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 25, on);
    }

    pub fn dma_busy(self) -> bool {
        regs::bit(self.0, 30)
    }

    pub fn set_dma_busy(&mut self, on: bool) {
        regs::set_bit(&mut self.0, 30, on);
    }
}

/// One queued DMA transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioDma {
    pub address: u32,
    pub length: u32,
    /// Playback duration in CPU cycles, fixed at push time.
    pub duration: u64,
}

/// AI register and DMA-queue state.
#[derive(Debug)]
pub struct AudioInterface {
    dram_address: u32,
    audio_length: u32,
    dac_rate: u32,
    bit_rate: u32,
    /// DAC output frequency in Hz, derived from AI_DACRATE.
    frequency: u32,
    dma_enable: bool,
    /// Ready gate: open while the FIFO has a free slot.
    dma_ready: bool,
    /// The next queued address page-increments when the previous transfer
    /// ended exactly on an 8 KiB boundary.
    delayed_carry: bool,
    fifo: [AudioDma; 2],
    fifo_len: usize,
    /// Cycles elapsed against the head slot's duration.
    counter: u64,
}

impl Default for AudioInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInterface {
    pub fn new() -> Self {
        Self {
            dram_address: 0,
            audio_length: 0,
            dac_rate: 0,
            bit_rate: 0,
            frequency: 33600,
            dma_enable: false,
            dma_ready: true,
            delayed_carry: false,
            fifo: [AudioDma::default(); 2],
            fifo_len: 0,
            counter: 0,
        }
    }

    /// Register read. No side effects.
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            AI_DRAM_ADDR => self.dram_address,
            // Bytes left in the head transfer; reported as the full length
            // until the slot completes.
            AI_LENGTH => {
                if self.fifo_len > 0 {
                    self.fifo[0].length
                } else {
                    0
                }
            }
            AI_CONTROL => self.dma_enable as u32,
            AI_STATUS => self.status().raw(),
            AI_DACRATE => self.dac_rate,
            AI_BITRATE => self.bit_rate,
            _ => 0,
        }
    }

    /// Register write. A write to AI_STATUS acknowledges the AI interrupt.
    pub fn write(&mut self, offset: u32, value: u32, mi: &mut MipsInterface) {
        match offset {
            AI_DRAM_ADDR => self.dram_address = value & 0x00FF_FFF8,
            AI_LENGTH => {
                self.audio_length = value & 0x0003_FFF8;
                self.push_dma(mi);
            }
            AI_CONTROL => self.dma_enable = value & 1 != 0,
            AI_STATUS => mi.lower(IntSource::Ai),
            AI_DACRATE => {
                self.dac_rate = value & 0x3FFF;
                self.frequency = (DAC_CLOCK_NTSC / (self.dac_rate + 1)).max(1);
            }
            AI_BITRATE => self.bit_rate = value & 0xF,
            _ => {}
        }
    }

    /// Compose the packed status word from live engine state.
    pub fn status(&self) -> AiStatus {
        let mut status = AiStatus::default();
        status.set_full(self.fifo_len == 2);
        status.set_dma_busy(self.fifo_len > 0);
        status.set_enabled(self.dma_enable);
        status.set_bc(true);
        status
    }

    /// Queue the latched address/length pair as a new DMA slot.
    ///
    /// Accepted only while the ready gate is open and a slot is free; a push
    /// against a full queue leaves every register and the interrupt state
    /// untouched.
    fn push_dma(&mut self, _mi: &mut MipsInterface) {
        if !self.dma_ready || self.fifo_len == 2 {
            trace!("ai: push dropped, fifo full");
            return;
        }

        let mut address = self.dram_address;
        if self.delayed_carry {
            address = address.wrapping_add(0x2000) & !0x1FFF;
        }
        self.delayed_carry = (address.wrapping_add(self.audio_length)) & 0x1FFF == 0;

        let duration = self.dma_duration();
        self.fifo[self.fifo_len] = AudioDma {
            address,
            length: self.audio_length,
            duration,
        };
        self.fifo_len += 1;
        if self.fifo_len == 2 {
            self.dma_ready = false;
        }
        debug!(
            "ai: queued {} bytes at {:#010x}, duration {} cycles, depth {}",
            self.audio_length, address, duration, self.fifo_len
        );
    }

    /// Retire the head slot: shift the remaining slot forward, reopen the
    /// ready gate and raise the AI cause bit.
    fn pop_dma(&mut self, mi: &mut MipsInterface) {
        self.fifo[0] = self.fifo[1];
        self.fifo[1] = AudioDma::default();
        self.fifo_len -= 1;
        self.counter = 0;
        self.dma_ready = true;
        mi.raise(IntSource::Ai);
        debug!("ai: slot complete, depth {}", self.fifo_len);
    }

    /// Playback duration of the latched length at the current DAC rate:
    /// `samples * cycles-per-sample`, with one stereo sample per 4 bytes.
    pub fn dma_duration(&self) -> u64 {
        let samples = u64::from(self.audio_length / 4);
        samples * (CPU_HZ / u64::from(self.frequency))
    }

    /// Advance the elapsed counter; pops the head slot once its duration has
    /// been reached. Called once per simulated time advance.
    pub fn step(&mut self, cycles: u64, mi: &mut MipsInterface) {
        if self.fifo_len == 0 || !self.dma_enable {
            return;
        }
        self.counter += cycles;
        if self.counter >= self.fifo[0].duration {
            self.pop_dma(mi);
        }
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo_len
    }

    pub fn is_ready(&self) -> bool {
        self.dma_ready
    }

    pub fn head(&self) -> Option<&AudioDma> {
        (self.fifo_len > 0).then(|| &self.fifo[0])
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ai_with_rate(dac_rate: u32) -> (AudioInterface, MipsInterface) {
        let mut ai = AudioInterface::new();
        let mut mi = MipsInterface::new();
        ai.write(AI_DACRATE, dac_rate, &mut mi);
        ai.write(AI_CONTROL, 1, &mut mi);
        (ai, mi)
    }

    #[test]
    fn test_status_round_trip() {
        let mut status = AiStatus::default();
        status.set_full(true);
        status.set_count(0x1234);
        status.set_bc(true);
        status.set_wc(true);
        status.set_enabled(true);
        status.set_dma_busy(true);
        let packed = 1 | 0x1234 << 1 | 1 << 16 | 1 << 19 | 1 << 25 | 1 << 30 | 1 << 31;
        assert_eq!(status.raw(), packed);

        let view = AiStatus::from_raw(packed);
        assert!(view.full());
        assert_eq!(view.count(), 0x1234);
        assert!(view.bc() && view.wc() && view.enabled() && view.dma_busy());
    }

    #[test]
    fn test_duration_formula() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        let frequency = DAC_CLOCK_NTSC / (0x3FF + 1);
        assert_eq!(ai.frequency(), frequency);

        for length in [0x100u32, 0x2000] {
            ai.write(AI_LENGTH, length, &mut mi);
            let expected = u64::from(length / 4) * (CPU_HZ / u64::from(frequency));
            assert_eq!(ai.head().unwrap().duration, expected);
            // Drain so the next push lands at the head.
            ai.step(expected, &mut mi);
        }
    }

    #[test]
    fn test_pop_fires_exactly_at_duration() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        ai.write(AI_DRAM_ADDR, 0x1000, &mut mi);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        let duration = ai.head().unwrap().duration;

        ai.step(duration - 1, &mut mi);
        assert!(!mi.is_raised(IntSource::Ai));
        assert_eq!(ai.fifo_len(), 1);

        ai.step(1, &mut mi);
        assert!(mi.is_raised(IntSource::Ai));
        assert_eq!(ai.fifo_len(), 0);
        assert!(ai.is_ready());
    }

    #[test]
    fn test_push_while_full_is_silent_noop() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        ai.write(AI_LENGTH, 0x200, &mut mi);
        assert_eq!(ai.fifo_len(), 2);
        assert!(!ai.is_ready());
        assert!(ai.status().full());

        let head = *ai.head().unwrap();
        ai.write(AI_LENGTH, 0x300, &mut mi);
        assert_eq!(ai.fifo_len(), 2);
        assert_eq!(*ai.head().unwrap(), head);
        assert!(!ai.is_ready());
        assert!(!mi.is_raised(IntSource::Ai));
    }

    #[test]
    fn test_fifo_is_strict_fifo_and_gate_reopens() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        ai.write(AI_DRAM_ADDR, 0x1000, &mut mi);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        ai.write(AI_DRAM_ADDR, 0x4000, &mut mi);
        ai.write(AI_LENGTH, 0x200, &mut mi);

        let first = ai.head().unwrap().duration;
        ai.step(first, &mut mi);
        assert_eq!(ai.fifo_len(), 1);
        assert!(ai.is_ready());
        // The second slot shifted forward in order.
        assert_eq!(ai.head().unwrap().address, 0x4000);
        assert_eq!(ai.head().unwrap().length, 0x200);
    }

    #[test]
    fn test_delayed_carry_page_increments_next_slot() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        // First transfer ends exactly on an 8 KiB boundary, arming the carry.
        ai.write(AI_DRAM_ADDR, 0x1000, &mut mi);
        ai.write(AI_LENGTH, 0x1000, &mut mi);
        // The next queued address is bumped to the following 8 KiB page.
        ai.write(AI_DRAM_ADDR, 0x1F00, &mut mi);
        ai.write(AI_LENGTH, 0x100, &mut mi);

        ai.step(ai.head().unwrap().duration, &mut mi);
        assert_eq!(ai.head().unwrap().address, 0x2000);

        // That transfer ends mid-page, so the slot after it queues as-is.
        ai.step(ai.head().unwrap().duration, &mut mi);
        ai.write(AI_DRAM_ADDR, 0x3000, &mut mi);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        assert_eq!(ai.head().unwrap().address, 0x3000);
    }

    #[test]
    fn test_disabled_engine_does_not_advance() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        ai.write(AI_CONTROL, 0, &mut mi);
        ai.step(u64::MAX / 2, &mut mi);
        assert_eq!(ai.fifo_len(), 1);
        assert!(!mi.is_raised(IntSource::Ai));
    }

    #[test]
    fn test_status_write_acknowledges_interrupt() {
        let (mut ai, mut mi) = ai_with_rate(0x3FF);
        ai.write(AI_LENGTH, 0x100, &mut mi);
        ai.step(ai.head().unwrap().duration, &mut mi);
        assert!(mi.is_raised(IntSource::Ai));
        ai.write(AI_STATUS, 0, &mut mi);
        assert!(!mi.is_raised(IntSource::Ai));
    }
}
