//! Cartridge ROM intake.
//!
//! ROM bytes are normalized to big-endian word order at load time, the
//! 64-byte header is parsed once, and the save-type list is resolved from
//! the game code. Everything here is immutable after load; the bus serves
//! reads straight out of the normalized image and absorbs writes.

use log::info;
use serde::Serialize;

use crate::error::CoreError;

/// Native big-endian dump magic (`.z64`).
const MAGIC_Z64: u32 = 0x8037_1240;
/// Byte-swapped dump magic (`.v64`).
const MAGIC_V64: u32 = 0x3780_4012;
/// Little-endian dump magic (`.n64`).
const MAGIC_N64: u32 = 0x4012_3780;

const HEADER_LEN: usize = 0x40;

/// Save hardware a cartridge may carry, as discovered from the game code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveType {
    Eeprom4k,
    Eeprom16k,
    Sram,
    Flash,
    Mempak,
}

/// Parsed cartridge header fields.
#[derive(Debug, Clone, Serialize)]
pub struct RomHeader {
    /// Internal name, bytes `0x20..0x34`, trimmed.
    pub name: String,
    /// Two-letter cartridge id, bytes `0x3C..0x3E`.
    pub cart_id: String,
    /// Region byte `0x3E` as its ASCII letter.
    pub region: char,
    /// Revision byte `0x3F`.
    pub version: u8,
}

/// An immutable, load-time-normalized cartridge image.
pub struct Cartridge {
    rom: Vec<u8>,
    header: RomHeader,
    save_types: Vec<SaveType>,
}

impl Cartridge {
    /// Normalize and parse a raw dump. Fails only for images too short to
    /// carry a header or with an unrecognizable magic word.
    pub fn new(mut bytes: Vec<u8>) -> Result<Self, CoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::RomTooShort { len: bytes.len() });
        }

        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        match magic {
            MAGIC_Z64 => {}
            MAGIC_V64 => {
                for pair in bytes.chunks_exact_mut(2) {
                    pair.swap(0, 1);
                }
            }
            MAGIC_N64 => {
                for quad in bytes.chunks_exact_mut(4) {
                    quad.reverse();
                }
            }
            _ => return Err(CoreError::UnknownRomFormat { magic }),
        }

        let name = String::from_utf8_lossy(&bytes[0x20..0x34])
            .trim_end_matches(['\0', ' '])
            .to_string();
        let cart_id = String::from_utf8_lossy(&bytes[0x3C..0x3E]).to_string();
        let region = bytes[0x3E] as char;
        let version = bytes[0x3F];
        let header = RomHeader {
            name,
            cart_id,
            region,
            version,
        };
        let save_types = save_types_for(&header.cart_id);

        info!(
            "cartridge: \"{}\" [{}{}] rev {}, {} KiB, saves {:?}",
            header.name,
            header.cart_id,
            header.region,
            header.version,
            bytes.len() / 1024,
            save_types
        );

        Ok(Self {
            rom: bytes,
            header,
            save_types,
        })
    }

    /// Big-endian word read at a cartridge-relative offset. Reads past the
    /// image return zero (simplified open bus).
    pub fn read_u32(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        match self.rom.get(offset..offset + 4) {
            Some(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rom.is_empty()
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    /// The fixed save-type list discovered at load.
    pub fn save_types(&self) -> &[SaveType] {
        &self.save_types
    }
}

/// Map a cartridge id to its save hardware.
///
/// Representative subset of the community cartridge database; titles not in
/// the table get the most common configuration, a 4 kbit EEPROM. A
/// controller pak is always listed since every retail console shipped with
/// pak-capable controllers.
fn save_types_for(cart_id: &str) -> Vec<SaveType> {
    let primary = match cart_id {
        // SRAM carts (Ocarina of Time, Mario Kart 64, F-Zero X, 1080...)
        "ZL" | "KT" | "FZ" | "TE" | "WR" => SaveType::Sram,
        // Flash carts (Majora's Mask, Pokemon Stadium 2, Paper Mario...)
        "ZS" | "P3" | "MQ" | "CK" | "JF" => SaveType::Flash,
        // 16 kbit EEPROM carts (Banjo-Tooie, Yoshi's Story, Perfect Dark...)
        "B7" | "YS" | "PD" | "EP" | "CW" => SaveType::Eeprom16k,
        _ => SaveType::Eeprom4k,
    };
    vec![primary, SaveType::Mempak]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal big-endian test image with a valid header.
    pub(crate) fn test_rom(cart_id: &[u8; 2]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x1000];
        rom[..4].copy_from_slice(&MAGIC_Z64.to_be_bytes());
        rom[0x20..0x28].copy_from_slice(b"TEST ROM");
        rom[0x3B] = b'N';
        rom[0x3C..0x3E].copy_from_slice(cart_id);
        rom[0x3E] = b'E';
        rom[0x3F] = 1;
        rom
    }

    #[test]
    fn test_header_parse() {
        let cart = Cartridge::new(test_rom(b"ZL")).unwrap();
        assert_eq!(cart.header().name, "TEST ROM");
        assert_eq!(cart.header().cart_id, "ZL");
        assert_eq!(cart.header().region, 'E');
        assert_eq!(cart.header().version, 1);
    }

    #[test]
    fn test_byte_order_normalization() {
        let native = test_rom(b"ZL");

        let mut swapped = native.clone();
        for pair in swapped.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
        let cart = Cartridge::new(swapped).unwrap();
        assert_eq!(cart.read_u32(0), MAGIC_Z64);
        assert_eq!(cart.header().name, "TEST ROM");

        let mut little = native.clone();
        for quad in little.chunks_exact_mut(4) {
            quad.reverse();
        }
        let cart = Cartridge::new(little).unwrap();
        assert_eq!(cart.read_u32(0), MAGIC_Z64);
    }

    #[test]
    fn test_save_type_table() {
        let sram = Cartridge::new(test_rom(b"ZL")).unwrap();
        assert_eq!(sram.save_types(), &[SaveType::Sram, SaveType::Mempak]);

        let flash = Cartridge::new(test_rom(b"ZS")).unwrap();
        assert_eq!(flash.save_types()[0], SaveType::Flash);

        let default = Cartridge::new(test_rom(b"XX")).unwrap();
        assert_eq!(default.save_types()[0], SaveType::Eeprom4k);
    }

    #[test]
    fn test_rejects_short_and_unknown_images() {
        assert!(matches!(
            Cartridge::new(vec![0; 16]),
            Err(CoreError::RomTooShort { len: 16 })
        ));
        assert!(matches!(
            Cartridge::new(vec![0xAB; 0x100]),
            Err(CoreError::UnknownRomFormat { .. })
        ));
    }

    #[test]
    fn test_out_of_range_read_is_zero() {
        let cart = Cartridge::new(test_rom(b"ZL")).unwrap();
        assert_eq!(cart.read_u32(0x10_0000), 0);
    }
}
