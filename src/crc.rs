//! Modbus CRC16 (CRC-16/MODBUS) used to seal every RTU frame.
//!
//! Polynomial `0xA001` (reflected `0x8005`), initial value `0xFFFF`. The result is
//! appended to a frame low byte first.

const POLYNOMIAL: u16 = 0xA001;
const INITIAL: u16 = 0xFFFF;

/// Compute the Modbus CRC16 over `bytes`.
///
/// Defined for any input, including an empty slice (which yields `0xFFFF`).
pub fn compute(bytes: &[u8]) -> u16 {
    let mut crc = INITIAL;
    for &byte in bytes {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Check `claimed` against the CRC of `frame_without_crc`.
pub fn verify(frame_without_crc: &[u8], claimed: u16) -> bool {
    compute(frame_without_crc) == claimed
}

/// CRC bytes in wire order (low byte first).
pub(crate) fn to_wire(crc: u16) -> [u8; 2] {
    crc.to_le_bytes()
}
