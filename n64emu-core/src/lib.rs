//! Nintendo 64 peripheral and bus emulation core.
//!
//! This crate implements the memory-mapped peripheral set of the N64: the
//! central address router ([`Bus`]), the interrupt-aggregation register
//! ([`mi::MipsInterface`]), the audio and serial DMA engines
//! ([`ai::AudioInterface`], [`si::SerialInterface`]), the display-processor
//! command interface ([`dpc::DisplayProcessor`]) and the RDRAM-interface
//! calibration block ([`ri::RdramInterface`]).
//!
//! The instruction pipeline itself is an external collaborator: it is driven
//! through the [`Cpu`] trait one step at a time, and the only channel through
//! which peripheral state reaches it is [`Bus::interrupt_pending`]. Display
//! output crosses the embedding boundary through the command-export protocol
//! on [`dpc::DisplayProcessor`]: flattened command words plus parallel row
//! lengths, gated by the commands-ready / frame-finished handshake.
//!
//! Everything runs on one logical thread. Hardware-parallel DMA is modeled as
//! time-sliced polling: [`Bus::tick`] lets every engine check its own
//! completion condition once per simulated time advance.

pub mod ai;
pub mod bus;
pub mod cartridge;
pub mod dpc;
pub mod error;
pub mod mi;
pub mod regs;
pub mod ri;
pub mod si;
pub mod system;

pub use bus::Bus;
pub use cartridge::{Cartridge, SaveType};
pub use dpc::CommandBatch;
pub use error::CoreError;
pub use mi::IntSource;
pub use si::ControllerState;
pub use system::{Cpu, FramePacer, NullPacer, RefreshPacer, System};
