// src/cards.rs
use crate::apdu;
use log::warn;
use pcsc::Card;

// Default and well-known transport keys tried on MIFARE Classic sectors
pub const COMMON_KEYS: [[u8; 6]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5],
    [0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD],
    [0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A],
    [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
];

/// Sectors 1..16, three data blocks each.
pub const MIFARE_1K_DATA_BYTES: usize = 15 * 3 * 16;

const NTAG_CC_PAGE: u8 = 3;
const NTAG_FIRST_DATA_PAGE: u8 = 4;
const CC_MAGIC: u8 = 0xE1;

/// Type 2 tag capability container (page 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContainer {
    pub version: u8,
    pub data_area_size: usize,
    pub writable: bool,
}

impl CapabilityContainer {
    /// `None` when the tag is not NDEF formatted.
    pub fn parse(cc: &[u8]) -> Option<Self> {
        match cc {
            [CC_MAGIC, version, size, access, ..] => Some(Self {
                version: *version,
                data_area_size: *size as usize * 8,
                writable: *access == 0x00,
            }),
            _ => None,
        }
    }
}

pub fn read_capability_container(card: &Card) -> Result<Option<CapabilityContainer>, String> {
    let page = apdu::read_binary(card, NTAG_CC_PAGE, 4)?;
    Ok(CapabilityContainer::parse(&page))
}

pub fn get_mifare_data_blocks() -> Vec<u8> {
    let mut blocks = Vec::new();
    // Sector 0 is manufacturer data, so we start at Sector 1
    for sector in 1..16 {
        for block_in_sector in 0..3 {
            // 0, 1, 2 are data. 3 is the Trailer.
            blocks.push((sector * 4) + block_in_sector);
        }
    }
    blocks
}

fn authenticate_sector(card: &Card, block: u8, key_types: &[u8]) -> bool {
    COMMON_KEYS.iter().any(|key| {
        apdu::load_key(card, key).is_ok()
            && key_types
                .iter()
                .any(|&key_type| apdu::authenticate(card, block, key_type).is_ok())
    })
}

/// Bytes needed to hold the TLV that starts `data`, once its header is visible.
fn tlv_end(data: &[u8]) -> Option<usize> {
    let pos = data.iter().position(|&b| b == 0x03)?;
    match data.get(pos + 1)? {
        0xFF => {
            let hi = *data.get(pos + 2)? as usize;
            let lo = *data.get(pos + 3)? as usize;
            Some(pos + 4 + ((hi << 8) | lo) + 1)
        }
        &len => Some(pos + 2 + len as usize + 1),
    }
}

pub fn read_mifare(card: &Card) -> Result<Vec<u8>, String> {
    let mut full_data = Vec::new();

    for block in get_mifare_data_blocks() {
        // Authenticate at the start of every sector (blocks 4, 8, 12, ...)
        if block % 4 == 0 && !authenticate_sector(card, block, &[apdu::KEY_TYPE_A, apdu::KEY_TYPE_B]) {
            warn!("Could not authenticate sector at block {}. Stopping.", block);
            break;
        }

        match apdu::read_binary(card, block, 16) {
            Ok(data) => full_data.extend_from_slice(&data),
            Err(_) => break,
        }

        if tlv_end(&full_data).is_some_and(|end| full_data.len() >= end) {
            break;
        }
    }

    if full_data.is_empty() {
        return Err("No data could be read from the card.".into());
    }
    Ok(full_data)
}

pub fn write_mifare(card: &Card, data: &[u8]) -> Result<(), String> {
    let mut offset = 0;
    let mut current_block: u8 = 4;

    while offset < data.len() {
        if current_block >= 64 {
            return Err("Data exceeds MIFARE Classic 1K capacity".into());
        }

        // Skip trailers
        if (current_block + 1) % 4 == 0 {
            current_block += 1;
            continue;
        }

        if current_block % 4 == 0 && !authenticate_sector(card, current_block, &[apdu::KEY_TYPE_A]) {
            return Err("Write Auth Failed".to_string());
        }

        // 16-byte blocks, zero padded
        let copy_len = std::cmp::min(16, data.len() - offset);
        let mut chunk = [0u8; 16];
        chunk[..copy_len].copy_from_slice(&data[offset..offset + copy_len]);

        apdu::update_binary(card, current_block, &chunk)?;

        offset += 16;
        current_block += 1;
    }
    Ok(())
}

pub fn read_ntag(card: &Card, data_area_size: usize) -> Result<Vec<u8>, String> {
    // READ returns 16 bytes (4 pages) per command
    let mut full_data = Vec::new();
    let last_page = NTAG_FIRST_DATA_PAGE as usize + data_area_size.div_ceil(4);

    let mut page = NTAG_FIRST_DATA_PAGE as usize;
    while page < last_page {
        let data = apdu::read_binary(card, page as u8, 16)
            .map_err(|e| format!("Failed to read page {}: {}", page, e))?;
        full_data.extend_from_slice(&data);
        page += 4;

        if tlv_end(&full_data).is_some_and(|end| full_data.len() >= end) {
            break;
        }
    }

    full_data.truncate(data_area_size);
    Ok(full_data)
}

pub fn write_ntag(card: &Card, data: &[u8]) -> Result<(), String> {
    // NTAG writes 4 bytes (1 page) at a time
    let mut padded_data = data.to_vec();
    while padded_data.len() % 4 != 0 {
        padded_data.push(0x00);
    }

    for (i, chunk) in padded_data.chunks(4).enumerate() {
        let page = NTAG_FIRST_DATA_PAGE as usize + i;
        let page = u8::try_from(page).map_err(|_| "Data exceeds NTAG page range".to_string())?;
        apdu::update_binary(card, page, chunk)?;
    }
    Ok(())
}
