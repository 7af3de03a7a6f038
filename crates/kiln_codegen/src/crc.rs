//! CRC-32 for the binary payload checksum.
//!
//! IEEE 802.3 polynomial, MSB-first, zero initial value, no final XOR.

const CRC32_POLY: u32 = 0x04C1_1DB7;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ CRC32_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Computes the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &byte| {
        (crc << 8) ^ CRC32_TABLE[((crc >> 24) ^ u32::from(byte)) as usize]
    })
}
