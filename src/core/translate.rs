//! Conversions between 512-byte sectors and volume blocks

/// Bytes per sector in the external (Linux block layer) addressing scheme
pub const SECTOR_SIZE: u64 = 512;

/// Convert a 512-byte sector number to a volume block number
///
/// Truncates toward zero. A zero block size yields block 0.
pub fn sector_to_block(sector: u64, block_size: u32) -> u64 {
    if block_size == 0 {
        return 0;
    }
    sector.wrapping_mul(SECTOR_SIZE) / block_size as u64
}

/// Convert a volume block number to a 512-byte sector number
pub fn block_to_sector(block: u64, block_size: u32) -> u64 {
    block.wrapping_mul(block_size as u64) / SECTOR_SIZE
}

/// Convert a byte size or offset to whole blocks
pub fn bytes_to_blocks(bytes: u64, block_size: u32) -> u64 {
    if block_size == 0 {
        return 0;
    }
    bytes / block_size as u64
}
