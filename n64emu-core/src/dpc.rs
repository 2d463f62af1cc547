//! Display Processor Command interface (DPC): display-list ingestion and the
//! frame-synchronization handshake.
//!
//! The stepping loop hands display lists to the RDP by writing a start/end
//! pointer pair; the interface reads the addressed words out of the memory
//! image and buffers them as one ordered row per span. Rows accumulate until
//! the external renderer drains them through the export protocol: a flattened
//! word sequence plus a parallel row-length sequence, gated by the
//! commands-ready flag. A Sync-Full command reaching the pipeline sets the
//! frame-finished flag and raises the DP interrupt; the interface will not
//! produce the next frame's rows until the consumer has cleared the flag.
//!
//! # Registers (base `0x0410_0000`)
//!
//! | Offset | Register     | Description                                 |
//! |--------|--------------|---------------------------------------------|
//! | `0x00` | DPC_START    | Span start pointer                          |
//! | `0x04` | DPC_END      | Span end pointer; write ingests the span    |
//! | `0x08` | DPC_CURRENT  | Read-only ingestion cursor                  |
//! | `0x0C` | DPC_STATUS   | Packed status, bit-pair write               |
//! | `0x10` | DPC_CLOCK    | 24-bit clock counter, read-only             |
//! | `0x14` | DPC_BUFBUSY  | 24-bit buffer-busy counter, read-only       |
//! | `0x18` | DPC_PIPEBUSY | 24-bit pipe-busy counter, read-only         |
//! | `0x1C` | DPC_TMEM     | 24-bit TMEM-busy counter, read-only         |

use log::{debug, trace};

use crate::mi::{IntSource, MipsInterface};
use crate::regs::{self, WriteEffect};

pub const DPC_START: u32 = 0x00;
pub const DPC_END: u32 = 0x04;
pub const DPC_CURRENT: u32 = 0x08;
pub const DPC_STATUS: u32 = 0x0C;
pub const DPC_CLOCK: u32 = 0x10;
pub const DPC_BUFBUSY: u32 = 0x14;
pub const DPC_PIPEBUSY: u32 = 0x18;
pub const DPC_TMEM: u32 = 0x1C;

/// RDP command id of Sync Full, in bits 29-24 of the even word.
const SYNC_FULL: u32 = 0x29;

/// Packed DPC_STATUS word.
///
/// | Bit | Field         |
/// |-----|---------------|
/// | 0   | xbus          |
/// | 1   | freeze        |
/// | 2   | flush         |
/// | 3   | start_gclk    |
/// | 4   | tmem_busy     |
/// | 5   | pipe_busy     |
/// | 6   | cmd_busy      |
/// | 7   | cbuf_ready    |
/// | 8   | dma_busy      |
/// | 9   | end_pending   |
/// | 10  | start_pending |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DpStatus(u32);

macro_rules! dp_status_bit {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(self) -> bool {
            regs::bit(self.0, $bit)
        }

        pub fn $set(&mut self, on: bool) {
            regs::set_bit(&mut self.0, $bit, on);
        }
    };
}

impl DpStatus {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    dp_status_bit!(xbus, set_xbus, 0);
    dp_status_bit!(freeze, set_freeze, 1);
    dp_status_bit!(flush, set_flush, 2);
    dp_status_bit!(start_gclk, set_start_gclk, 3);
    dp_status_bit!(tmem_busy, set_tmem_busy, 4);
    dp_status_bit!(pipe_busy, set_pipe_busy, 5);
    dp_status_bit!(cmd_busy, set_cmd_busy, 6);
    dp_status_bit!(cbuf_ready, set_cbuf_ready, 7);
    dp_status_bit!(dma_busy, set_dma_busy, 8);
    dp_status_bit!(end_pending, set_end_pending, 9);
    dp_status_bit!(start_pending, set_start_pending, 10);
}

/// Owned snapshot of the pending command rows, for consumers in another
/// execution context. `row_lengths` partitions `words` in production order;
/// `sum(row_lengths) == words.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    pub words: Vec<u32>,
    pub row_lengths: Vec<u32>,
}

/// DPC register state and the pending-row buffer.
#[derive(Debug)]
pub struct DisplayProcessor {
    start: u32,
    end: u32,
    current: u32,
    status: DpStatus,
    clock_counter: u32,
    bufbusy_counter: u32,
    pipebusy_counter: u32,
    tmem_counter: u32,
    frame_finished: bool,
    /// Flattened command words of every pending row, production order.
    words: Vec<u32>,
    /// Length of each pending row, parallel to `words`.
    row_lengths: Vec<u32>,
}

impl Default for DisplayProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayProcessor {
    pub fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            current: 0,
            status: DpStatus::default(),
            clock_counter: 0,
            bufbusy_counter: 0,
            pipebusy_counter: 0x00FF_FFFF,
            tmem_counter: 0,
            frame_finished: false,
            words: Vec::new(),
            row_lengths: Vec::new(),
        }
    }

    /// Register read. Returns the raw value of the addressed register with no
    /// side effect; counters are 24-bit.
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            DPC_START => self.start,
            DPC_END => self.end,
            DPC_CURRENT => self.current,
            DPC_STATUS => self.status.raw(),
            DPC_CLOCK => self.clock_counter & 0x00FF_FFFF,
            DPC_BUFBUSY => self.bufbusy_counter & 0x00FF_FFFF,
            DPC_PIPEBUSY => self.pipebusy_counter & 0x00FF_FFFF,
            DPC_TMEM => self.tmem_counter & 0x00FF_FFFF,
            _ => 0,
        }
    }

    /// Register write. Pointer writes route to the span registers; a
    /// DPC_END write ingests the closed span from `rdram` (or `dmem` when
    /// the xbus source flag is set).
    pub fn write(
        &mut self,
        offset: u32,
        value: u32,
        rdram: &[u8],
        dmem: &[u8],
        mi: &mut MipsInterface,
    ) {
        match offset {
            DPC_START => {
                self.start = value & 0x00FF_FFF8;
                self.status.set_start_pending(true);
            }
            DPC_END => {
                self.end = value & 0x00FF_FFF8;
                self.ingest(rdram, dmem, mi);
            }
            DPC_STATUS => self.write_status(value),
            _ => {}
        }
    }

    /// DPC_STATUS write. Bit-pair effects in ascending order:
    /// (0 clear / 1 set) xbus, (2 clear / 3 set) freeze,
    /// (4 clear / 5 set) flush; bits 6-9 clear the TMEM, pipe, buffer and
    /// clock counters respectively. Both bits of a pair asserted sets.
    pub fn write_status(&mut self, value: u32) {
        let mut xbus = self.status.xbus();
        WriteEffect::decode(value, 0, 1).apply(&mut xbus);
        self.status.set_xbus(xbus);

        let mut freeze = self.status.freeze();
        WriteEffect::decode(value, 2, 3).apply(&mut freeze);
        self.status.set_freeze(freeze);

        let mut flush = self.status.flush();
        WriteEffect::decode(value, 4, 5).apply(&mut flush);
        self.status.set_flush(flush);

        if regs::bit(value, 6) {
            self.tmem_counter = 0;
        }
        if regs::bit(value, 7) {
            self.pipebusy_counter = 0;
            self.status.set_pipe_busy(false);
        }
        if regs::bit(value, 8) {
            self.bufbusy_counter = 0;
        }
        if regs::bit(value, 9) {
            self.clock_counter = 0;
        }
    }

    /// Ingest the span closed by a DPC_END write as one new row.
    ///
    /// While the previous frame's finished flag is still unacknowledged the
    /// span registers keep tracking firmware writes but no row is produced:
    /// the interface never re-enters frame production before the consumer's
    /// clear. A frozen pipeline likewise latches pointers without ingesting.
    fn ingest(&mut self, rdram: &[u8], dmem: &[u8], mi: &mut MipsInterface) {
        let begin = if self.status.start_pending() {
            self.status.set_start_pending(false);
            self.current = self.start;
            self.start
        } else {
            self.current
        };

        if self.end <= begin {
            self.current = self.end;
            return;
        }
        if self.frame_finished {
            debug!("dpc: span held, frame-finished not yet acknowledged");
            self.current = self.end;
            return;
        }
        if self.status.freeze() {
            trace!("dpc: span latched while frozen");
            self.current = self.end;
            return;
        }

        let count = ((self.end - begin) / 4) as usize;
        let mut row = Vec::with_capacity(count);
        for i in 0..count {
            let addr = begin as usize + i * 4;
            let word = if self.status.xbus() {
                read_be32(dmem, addr & (dmem.len() - 1))
            } else {
                read_be32(rdram, addr & (rdram.len() - 1))
            };
            row.push(word);
        }

        self.status.set_pipe_busy(true);
        self.status.set_cmd_busy(true);
        self.clock_counter = self.clock_counter.wrapping_add(count as u32) & 0x00FF_FFFF;

        // Commands are 64-bit; the id lives in bits 29-24 of the even word.
        let mut sync = false;
        for pair in row.chunks(2) {
            if pair[0] >> 24 & 0x3F == SYNC_FULL {
                sync = true;
            }
        }

        self.row_lengths.push(row.len() as u32);
        self.words.extend_from_slice(&row);
        self.status.set_cbuf_ready(true);
        self.current = self.end;
        trace!("dpc: row of {} words, {} pending", count, self.row_lengths.len());

        if sync {
            self.frame_finished = true;
            self.status.set_pipe_busy(false);
            self.status.set_cmd_busy(false);
            mi.raise(IntSource::Dp);
            debug!("dpc: sync full, frame finished");
        }
    }

    /// Advance the gclk-driven counters. Called once per simulated time
    /// advance while the pipeline is busy.
    pub fn tick(&mut self, cycles: u64) {
        if self.status.pipe_busy() {
            self.pipebusy_counter =
                self.pipebusy_counter.wrapping_add(cycles as u32) & 0x00FF_FFFF;
        }
    }

    /// True while undrained command rows are buffered.
    pub fn commands_ready(&self) -> bool {
        self.status.cbuf_ready()
    }

    /// Flattened pending command words. The slice is valid until the next
    /// mutating call on this interface; consumers that outlive that window
    /// take [`DisplayProcessor::take_commands`] instead.
    pub fn command_words(&self) -> &[u32] {
        &self.words
    }

    /// Pending row lengths, parallel to [`DisplayProcessor::command_words`].
    pub fn row_lengths(&self) -> &[u32] {
        &self.row_lengths
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_lengths.len()
    }

    /// Drain the buffer into an owned copy and acknowledge it in one step.
    pub fn take_commands(&mut self) -> CommandBatch {
        let batch = CommandBatch {
            words: std::mem::take(&mut self.words),
            row_lengths: std::mem::take(&mut self.row_lengths),
        };
        self.status.set_cbuf_ready(false);
        batch
    }

    /// Consumer acknowledgment: empty the buffer and lower commands-ready
    /// together. The producer never clears either on its own.
    pub fn clear_commands(&mut self) {
        self.words.clear();
        self.row_lengths.clear();
        self.status.set_cbuf_ready(false);
    }

    pub fn frame_finished(&self) -> bool {
        self.frame_finished
    }

    /// Consumer acknowledgment of the frame boundary; re-enables ingestion.
    pub fn clear_frame_finished(&mut self) {
        self.frame_finished = false;
    }

    pub fn status(&self) -> DpStatus {
        self.status
    }
}

fn read_be32(image: &[u8], addr: usize) -> u32 {
    match image.get(addr..addr + 4) {
        Some(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => 0,
    }
}
