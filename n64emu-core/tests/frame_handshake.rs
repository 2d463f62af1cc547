//! End-to-end exercises of the command-export and audio-DMA contracts
//! through the public session API.

use n64emu_core::ai::{AI_CONTROL, AI_DACRATE, AI_LENGTH, AI_STATUS, CPU_HZ, DAC_CLOCK_NTSC};
use n64emu_core::bus::{AI_BASE, DPC_BASE, MI_BASE};
use n64emu_core::dpc::{DPC_END, DPC_START};
use n64emu_core::mi::{IntSource, MI_INTERRUPT, MI_MASK};
use n64emu_core::System;

/// Minimal native-order (.z64) image with a valid header.
fn test_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x1000];
    rom[..4].copy_from_slice(&0x8037_1240u32.to_be_bytes());
    rom[0x20..0x2C].copy_from_slice(b"HANDSHAKE  T");
    rom[0x3B] = b'N';
    rom[0x3C..0x3E].copy_from_slice(b"XX");
    rom[0x3E] = b'E';
    rom
}

fn write_list(system: &mut System, addr: u32, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        system.bus.write_u32(addr + i as u32 * 4, *word);
    }
}

#[test]
fn commands_ready_scenario() {
    let mut system = System::new(test_rom()).unwrap();

    // Two display-list rows, the second ending in Sync Full.
    let row1 = [0x3700_0000u32, 0x0000_0001, 0x3600_0000, 0x0000_0002];
    let row2 = [0x2900_0000u32, 0x0000_0000];
    write_list(&mut system, 0x200, &row1);
    write_list(&mut system, 0x400, &row2);

    system.bus.write_u32(DPC_BASE + DPC_START, 0x200);
    system.bus.write_u32(DPC_BASE + DPC_END, 0x210);
    assert!(system.commands_ready());

    system.bus.write_u32(DPC_BASE + DPC_START, 0x400);
    system.bus.write_u32(DPC_BASE + DPC_END, 0x408);
    assert!(system.frame_finished());

    // Total exported word count equals the sum of the row lengths enqueued
    // since the last clear.
    let words = system.bus.dpc.command_words().to_vec();
    let lengths = system.bus.dpc.row_lengths().to_vec();
    assert_eq!(lengths, vec![4, 2]);
    assert_eq!(lengths.iter().sum::<u32>() as usize, words.len());
    let expected: Vec<u32> = row1.iter().chain(row2.iter()).copied().collect();
    assert_eq!(words, expected);

    // Consumer acknowledgment empties both flat sequences together.
    system.bus.dpc.clear_commands();
    assert_eq!(system.bus.dpc.word_count(), 0);
    assert_eq!(system.bus.dpc.row_count(), 0);
    assert!(!system.commands_ready());

    system.bus.dpc.clear_frame_finished();
    assert!(!system.frame_finished());
}

#[test]
fn audio_double_buffer_scenario() {
    let mut system = System::new(test_rom()).unwrap();
    let dac_rate = 0x3FF;
    system.bus.write_u32(AI_BASE + AI_CONTROL, 1);
    system.bus.write_u32(AI_BASE + AI_DACRATE, dac_rate);
    system.bus.write_u32(MI_BASE + MI_MASK, IntSource::Ai.mask());

    let frequency = u64::from(DAC_CLOCK_NTSC / (dac_rate + 1));
    let (l1, l2) = (0x100u32, 0x280u32);
    system.bus.write_u32(AI_BASE + AI_LENGTH, l1);
    system.bus.write_u32(AI_BASE + AI_LENGTH, l2);
    assert_eq!(system.bus.ai.fifo_len(), 2);

    let d1 = u64::from(l1 / 4) * (CPU_HZ / frequency);
    assert_eq!(system.bus.ai.head().unwrap().duration, d1);

    // A third push before either slot completes is rejected.
    system.bus.write_u32(AI_BASE + AI_LENGTH, 0x300);
    assert_eq!(system.bus.ai.fifo_len(), 2);

    // First slot completes exactly after d1 cycles and raises the aggregate.
    system.bus.tick(d1 - 1);
    assert!(!system.bus.interrupt_pending());
    system.bus.tick(1);
    assert!(system.bus.interrupt_pending());
    assert_eq!(system.bus.ai.fifo_len(), 1);

    // The second slot carries its own rate-derived duration.
    let d2 = u64::from(l2 / 4) * (CPU_HZ / frequency);
    assert_eq!(system.bus.ai.head().unwrap().duration, d2);

    // Acknowledge and drain the second slot.
    system.bus.write_u32(AI_BASE + AI_STATUS, 0);
    assert!(!system.bus.interrupt_pending());
    system.bus.tick(d2);
    assert_eq!(system.bus.ai.fifo_len(), 0);
    assert_ne!(system.bus.read_u32(MI_BASE + MI_INTERRUPT) & IntSource::Ai.mask(), 0);
}
