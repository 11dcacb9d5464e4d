//! Address transform between linear and tiled framebuffer layouts.
//!
//! The tiled layout stores the image in 32x32-pixel blocks laid out row-major, each block
//! holding 1024 pixels whose order interleaves row and column bits:
//!
//! ```text
//! block pixel index bits:  9 8 7 6 | 5 4 3 | 2 | 1 0
//!                          row 4:1 | col 4:2 | row 0 | col 1:0
//! ```
//!
//! with bit 5 additionally flipped by row bit 3. All offsets here are byte offsets at
//! 4 bytes per pixel.

/// Byte offset of pixel `(x, y)` in a row-major buffer `width` pixels wide.
#[inline]
pub const fn std_offset(width: usize, x: usize, y: usize) -> usize {
    (y * width + x) * 4
}

/// Maps a linear byte offset to the byte offset of the same pixel in the tiled layout.
///
/// The sub-pixel byte of `linear` is dropped; the result is always 4-byte aligned.
#[inline]
pub const fn tile_offset(width: usize, linear: usize) -> usize {
    let row = linear / (width * 4);
    let col = (linear % (width * 4)) / 4;

    let block_base = (row & !31) * width + (col & !31) * 32;
    let interleave = (col & 3) + ((row & 1) << 2) + ((col & 28) << 1) + ((row & 30) << 5);
    (block_base + (interleave ^ ((row & 8) << 2))) * 4
}

/// Inverse of [`tile_offset`]: the linear byte offset of the pixel stored at `tiled`.
///
/// Returns `None` when `width` is zero or not a multiple of 32 (blocks would straddle rows) or
/// when `tiled` is not pixel-aligned.
pub fn untile_offset(width: usize, tiled: usize) -> Option<usize> {
    if width == 0 || width % 32 != 0 || tiled % 4 != 0 {
        return None;
    }
    let pixel = tiled / 4;
    let block = pixel / 1024;
    let index = pixel % 1024;

    let blocks_per_row = width / 32;
    let block_row = block / blocks_per_row;
    let block_col = block % blocks_per_row;

    let index = index ^ (((index >> 8) & 1) << 5);
    let row = ((index >> 2) & 1) | (((index >> 6) & 15) << 1);
    let col = (index & 3) | (((index >> 3) & 7) << 2);

    Some(std_offset(width, block_col * 32 + col, block_row * 32 + row))
}
