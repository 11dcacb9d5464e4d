/// Memory-mapped access capability.
///
/// `paddr` is the full physical address of the access; devices mask it down to their own window.
/// `size` is the access width in bytes and is one of 1, 2, 4 or 8 when it comes from the root bus.
/// Values travel in the low `size` bytes of a `u64`, little-endian, matching how the register
/// backing stores are laid out.
///
/// Devices must never fault the host on any address or size: out-of-window reads return an
/// open-bus value and out-of-window writes are dropped.
pub trait BusDevice: Send {
    fn name(&self) -> &str;
    fn read(&mut self, paddr: u64, size: usize) -> u64;
    fn write(&mut self, paddr: u64, size: usize, value: u64);
}

pub fn is_valid_access_size(size: usize) -> bool {
    matches!(size, 1 | 2 | 4 | 8)
}

/// Loads up to `size` bytes from the start of `bytes` as a little-endian value.
///
/// Bytes past the end of `bytes` read as zero.
pub fn load_le(bytes: &[u8], size: usize) -> u64 {
    let n = size.min(8).min(bytes.len());
    let mut buf = [0u8; 8];
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// Stores the low `size` bytes of `value` little-endian at the start of `bytes`.
///
/// Bytes that would land past the end of `bytes` are dropped.
pub fn store_le(bytes: &mut [u8], size: usize, value: u64) {
    let n = size.min(8).min(bytes.len());
    bytes[..n].copy_from_slice(&value.to_le_bytes()[..n]);
}

pub fn all_ones(size: usize) -> u64 {
    match size {
        0 => 0,
        1..=7 => (1u64 << (size * 8)) - 1,
        _ => u64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_store_are_clamped_to_the_slice() {
        let mut bytes = [0u8; 3];
        store_le(&mut bytes, 4, 0xAABB_CCDD);
        assert_eq!(bytes, [0xDD, 0xCC, 0xBB]);
        assert_eq!(load_le(&bytes, 8), 0x00BB_CCDD);
        assert_eq!(load_le(&bytes, 1), 0xDD);
    }

    #[test]
    fn all_ones_matches_access_width() {
        assert_eq!(all_ones(1), 0xFF);
        assert_eq!(all_ones(2), 0xFFFF);
        assert_eq!(all_ones(4), 0xFFFF_FFFF);
        assert_eq!(all_ones(8), u64::MAX);
        assert_eq!(all_ones(0), 0);
    }
}
