//! Session object and the stepping-loop boundary.
//!
//! The instruction pipeline is not part of this crate: it is driven through
//! the [`Cpu`] trait, one step at a time, against the session's [`Bus`]. The
//! frame loop mirrors the embedding host's contract: step until the display
//! pipeline reports frame-finished, hand any ready command rows to the
//! consumer along the way, pace to the refresh cadence, then acknowledge the
//! frame so the next one may begin.
//!
//! One [`System`] is one emulation session. Embedders construct it when a
//! cartridge image is loaded and hold it for the session's lifetime; there is
//! no module-wide instance.

use std::time::{Duration, Instant};

use log::info;

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::dpc::CommandBatch;
use crate::error::CoreError;

/// The external instruction pipeline.
///
/// `step` advances the pipeline by one unit against the bus and returns the
/// simulated cycles consumed; the stepping loop feeds that number back into
/// [`Bus::tick`]. After every step the loop queries the aggregate interrupt
/// and, when pending, hands control to `take_interrupt`.
pub trait Cpu {
    fn step(&mut self, bus: &mut Bus) -> u64;

    /// Called when the aggregate interrupt is pending after a step. The
    /// default does nothing; a real pipeline vectors into its handler here.
    fn take_interrupt(&mut self, bus: &mut Bus) {
        let _ = bus;
    }
}

/// Injected frame throttle. The core never sleeps on its own.
pub trait FramePacer {
    fn wait_for_frame(&mut self);
}

/// Sleep-then-spin pacer targeting a fixed refresh rate.
pub struct RefreshPacer {
    last_frame: Instant,
    frame_ns: u64,
}

impl RefreshPacer {
    pub fn new(target_fps: f64) -> Self {
        Self {
            last_frame: Instant::now(),
            frame_ns: (1_000_000_000.0 / target_fps) as u64,
        }
    }
}

impl FramePacer for RefreshPacer {
    fn wait_for_frame(&mut self) {
        let elapsed = self.last_frame.elapsed().as_nanos() as u64;
        if elapsed < self.frame_ns {
            let sleep_ns = self.frame_ns - elapsed;
            // Coarse sleep, then spin out the remainder for precision.
            if sleep_ns > 1_000_000 {
                std::thread::sleep(Duration::from_nanos(sleep_ns - 500_000));
            }
            while (self.last_frame.elapsed().as_nanos() as u64) < self.frame_ns {
                std::hint::spin_loop();
            }
        }
        self.last_frame = Instant::now();
    }
}

/// No-op pacer for headless stepping and tests.
pub struct NullPacer;

impl FramePacer for NullPacer {
    fn wait_for_frame(&mut self) {}
}

/// One emulation session: the bus and everything it owns.
pub struct System {
    pub bus: Bus,
}

impl System {
    /// Load a cartridge image and construct the session.
    pub fn new(rom_bytes: Vec<u8>) -> Result<Self, CoreError> {
        let cartridge = Cartridge::new(rom_bytes)?;
        let bus = Bus::new(cartridge)?;
        info!("session constructed");
        Ok(Self { bus })
    }

    /// Run one frame: step the pipeline until the display interface reports
    /// frame-finished, draining command rows to `on_commands` whenever the
    /// ready flag appears, then pace and acknowledge the frame boundary.
    pub fn step_frame<C, P>(
        &mut self,
        cpu: &mut C,
        pacer: &mut P,
        mut on_commands: impl FnMut(CommandBatch),
    ) where
        C: Cpu,
        P: FramePacer,
    {
        while !self.bus.dpc.frame_finished() {
            let cycles = cpu.step(&mut self.bus);
            self.bus.tick(cycles);
            if self.bus.interrupt_pending() {
                cpu.take_interrupt(&mut self.bus);
            }
            if self.bus.dpc.commands_ready() {
                on_commands(self.bus.dpc.take_commands());
            }
        }

        pacer.wait_for_frame();
        self.bus.dpc.clear_frame_finished();
    }

    pub fn commands_ready(&self) -> bool {
        self.bus.dpc.commands_ready()
    }

    pub fn frame_finished(&self) -> bool {
        self.bus.dpc.frame_finished()
    }
}
