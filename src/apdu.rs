// src/apdu.rs
use pcsc::Card;

// Pseudo-APDUs understood by ACR122U-style PC/SC readers.
const CLA_READER: u8 = 0xFF;
const INS_LOAD_KEY: u8 = 0x82;
const INS_AUTHENTICATE: u8 = 0x86;
const INS_READ_BINARY: u8 = 0xB0;
const INS_UPDATE_BINARY: u8 = 0xD6;
const INS_GET_DATA: u8 = 0xCA;

pub const KEY_TYPE_A: u8 = 0x60;
pub const KEY_TYPE_B: u8 = 0x61;

/// Splits off the trailing status word, succeeding only on 90 00.
fn check_status(resp: &[u8]) -> Result<&[u8], [u8; 2]> {
    match resp {
        [data @ .., 0x90, 0x00] => Ok(data),
        [.., sw1, sw2] => Err([*sw1, *sw2]),
        _ => Err([0x00, 0x00]),
    }
}

fn transmit(card: &Card, apdu: &[u8], what: &str) -> Result<Vec<u8>, String> {
    let mut recv_buffer = [0u8; 258];
    let resp = card
        .transmit(apdu, &mut recv_buffer)
        .map_err(|e| format!("Transmit Error: {}", e))?;
    check_status(resp)
        .map(|data| data.to_vec())
        .map_err(|sw| format!("{} Failed: {:02X?}", what, sw))
}

// Load Authentication Keys into Reader Memory (Location 0x00)
// ACR122U standard: FF 82 00 key_num 06 [KEY]
pub fn load_key(card: &Card, key: &[u8; 6]) -> Result<(), String> {
    let mut apdu = vec![CLA_READER, INS_LOAD_KEY, 0x00, 0x00, 0x06];
    apdu.extend_from_slice(key);
    transmit(card, &apdu, "Load Key").map(|_| ())
}

// Authenticate Block
// CMD: FF 86 00 00 05 01 00 Block KeyType KeyNumber
pub fn authenticate(card: &Card, block: u8, key_type: u8) -> Result<(), String> {
    let apdu = [
        CLA_READER,
        INS_AUTHENTICATE,
        0x00,
        0x00,
        0x05,
        0x01,
        0x00,
        block,
        key_type,
        0x00,
    ];
    transmit(card, &apdu, "Auth").map(|_| ())
}

// Read: FF B0 00 Block Len
pub fn read_binary(card: &Card, block: u8, length: u8) -> Result<Vec<u8>, String> {
    let apdu = [CLA_READER, INS_READ_BINARY, 0x00, block, length];
    transmit(card, &apdu, "Read")
}

// Write: FF D6 00 Block Len [Data]
pub fn update_binary(card: &Card, block: u8, data: &[u8]) -> Result<(), String> {
    let mut apdu = vec![CLA_READER, INS_UPDATE_BINARY, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);
    transmit(card, &apdu, "Write").map(|_| ())
}

// Card UID: FF CA 00 00 00
pub fn get_uid(card: &Card) -> Result<Vec<u8>, String> {
    let apdu = [CLA_READER, INS_GET_DATA, 0x00, 0x00, 0x00];
    transmit(card, &apdu, "Get UID")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_word_is_stripped_on_success() {
        assert_eq!(check_status(&[0x01, 0x02, 0x90, 0x00]), Ok(&[0x01, 0x02][..]));
        assert_eq!(check_status(&[0x90, 0x00]), Ok(&[][..]));
    }

    #[test]
    fn error_status_words_are_returned() {
        assert_eq!(check_status(&[0x63, 0x00]), Err([0x63, 0x00]));
        assert_eq!(check_status(&[0xAA, 0x6A, 0x82]), Err([0x6A, 0x82]));
        assert_eq!(check_status(&[0x90]), Err([0x00, 0x00]));
    }
}
