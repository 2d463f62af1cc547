// CLI harness for the peripheral core
use anyhow::Context;
use clap::Parser;
use log::info;
use n64emu_core::{Bus, CommandBatch, Cpu, RefreshPacer, System};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "n64emu")]
#[command(about = "N64 peripheral emulation core harness")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Inspect a ROM image's header and save hardware
    Info {
        /// Path to the ROM image (.z64/.v64/.n64)
        rom: PathBuf,

        /// Emit the header as JSON
        #[arg(long)]
        json: bool,
    },
    /// Step a smoke-test frame loop against the peripheral set
    Run {
        /// Path to the ROM image
        rom: PathBuf,

        /// Number of frames to step
        #[arg(long, default_value_t = 60)]
        frames: u32,

        /// Target refresh rate
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { rom, json } => info_command(&rom, json),
        Commands::Run { rom, frames, fps } => run_command(&rom, frames, fps),
    }
}

fn info_command(path: &PathBuf, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let cartridge = n64emu_core::Cartridge::new(bytes)?;

    if json {
        let doc = serde_json::json!({
            "header": cartridge.header(),
            "size": cartridge.len(),
            "save_types": cartridge.save_types(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        let header = cartridge.header();
        println!("name:       {}", header.name);
        println!("cart id:    {}{}", header.cart_id, header.region);
        println!("revision:   {}", header.version);
        println!("size:       {} KiB", cartridge.len() / 1024);
        println!("save types: {:?}", cartridge.save_types());
    }
    Ok(())
}

fn run_command(path: &PathBuf, frames: u32, fps: f64) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut system = System::new(bytes)?;
    let mut cpu = SmokeDriver::default();
    let mut pacer = RefreshPacer::new(fps);

    let mut total_words = 0usize;
    let mut total_rows = 0usize;
    for _ in 0..frames {
        system.step_frame(&mut cpu, &mut pacer, |batch: CommandBatch| {
            total_words += batch.words.len();
            total_rows += batch.row_lengths.len();
        });
    }

    info!("stepped {frames} frames");
    println!(
        "{frames} frames, {total_rows} command rows, {total_words} words exported"
    );
    Ok(())
}

/// Bus exerciser standing in for the instruction pipeline: each frame it
/// deposits a short display list ending in Sync Full and triggers the DPC,
/// so the export/acknowledge handshake can be observed end to end.
#[derive(Default)]
struct SmokeDriver {
    step_in_frame: u32,
}

impl Cpu for SmokeDriver {
    fn step(&mut self, bus: &mut Bus) -> u64 {
        use n64emu_core::bus::DPC_BASE;
        use n64emu_core::dpc::{DPC_END, DPC_START};

        if self.step_in_frame == 0 {
            bus.write_u32(0x100, 0x3700_0000);
            bus.write_u32(0x104, 0x0000_0001);
            bus.write_u32(0x108, 0x2900_0000);
            bus.write_u32(0x10C, 0x0000_0000);
            bus.write_u32(DPC_BASE + DPC_START, 0x100);
            bus.write_u32(DPC_BASE + DPC_END, 0x110);
            self.step_in_frame = 1;
        } else {
            self.step_in_frame = 0;
        }
        1
    }
}
