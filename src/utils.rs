//! Little-endian slice readers shared by the binary decoders.
//!
//! All multi-byte fields in CFB and BIFF8 are little-endian. Every helper
//! panics on a short slice; callers bounds-check record payloads before
//! slicing into them.

pub fn read_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes([s[0], s[1]])
}

pub fn read_i16(s: &[u8]) -> i16 {
    read_u16(s) as i16
}

pub fn read_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes([s[0], s[1], s[2], s[3]])
}

pub fn read_i32(s: &[u8]) -> i32 {
    read_u32(s) as i32
}

pub fn read_u64(s: &[u8]) -> u64 {
    u64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
}

pub fn read_f64(s: &[u8]) -> f64 {
    f64::from_bits(read_u64(s))
}

pub fn read_usize(s: &[u8]) -> usize {
    read_u32(s) as usize
}

/// Reads consecutive little-endian u32 entries (FAT/DIFAT sector tables).
pub fn read_u32_table(s: &[u8]) -> Vec<u32> {
    s.chunks_exact(4).map(read_u32).collect()
}
