use crate::tiling::{std_offset, tile_offset};
use crate::{ConversionPath, FramebufferLayout, XenosConfig};

/// Kernel workgroup edge, in pixels.
const WORKGROUP_SIZE: usize = 16;

/// Converts a snapshot of the guest framebuffer into a top-down linear frame.
///
/// The guest image is bottom-up, so display row `y` comes from source row `height - 1 - y`.
/// Source pixels whose offset falls past the end of the snapshot are skipped and leave the
/// destination pixel unchanged. Both paths produce identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConverter {
    width: usize,
    height: usize,
    layout: FramebufferLayout,
    path: ConversionPath,
    workers: usize,
}

impl FrameConverter {
    pub fn new(
        width: usize,
        height: usize,
        layout: FramebufferLayout,
        path: ConversionPath,
        workers: usize,
    ) -> Self {
        Self {
            width,
            height,
            layout,
            path,
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &XenosConfig) -> Self {
        Self::new(
            config.resolution.width as usize,
            config.resolution.height as usize,
            config.layout,
            config.conversion,
            config.effective_workers(),
        )
    }

    pub fn path(&self) -> ConversionPath {
        self.path
    }

    /// Fills `dst` (row-major, `width * height` pixels). Destination slots past the end of a
    /// shorter `dst` are dropped on both paths.
    pub fn convert(&self, src: &[u8], dst: &mut [u32]) {
        match self.path {
            ConversionPath::Cpu => self.convert_cpu(src, dst),
            ConversionPath::Kernel => self.convert_kernel(src, dst),
        }
    }

    #[inline]
    fn source_offset(&self, x: usize, y: usize) -> usize {
        let linear = std_offset(self.width, x, y);
        match self.layout {
            FramebufferLayout::Tiled => tile_offset(self.width, linear),
            FramebufferLayout::Linear => linear,
        }
    }

    #[inline]
    fn load_pixel(src: &[u8], offset: usize) -> Option<u32> {
        let bytes = src.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Walks source pixels and scatters each one to its flipped destination row.
    pub fn convert_cpu(&self, src: &[u8], dst: &mut [u32]) {
        for x in 0..self.width {
            for y in 0..self.height {
                let Some(pixel) = Self::load_pixel(src, self.source_offset(x, y)) else {
                    continue;
                };
                let flipped = self.height - y - 1;
                if let Some(slot) = dst.get_mut(std_offset(self.width, x, flipped) / 4) {
                    *slot = pixel;
                }
            }
        }
    }

    /// Runs one invocation per destination pixel in 16x16 workgroups, with each band of
    /// workgroup rows owned by a single worker thread.
    pub fn convert_kernel(&self, src: &[u8], dst: &mut [u32]) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let band_len = self.width * WORKGROUP_SIZE;
        let bands = self.height.div_ceil(WORKGROUP_SIZE);
        let bands_per_worker = bands.div_ceil(self.workers);

        if self.workers == 1 || bands == 1 {
            for (group_y, band) in dst.chunks_mut(band_len).enumerate() {
                self.dispatch_band(src, group_y, band);
            }
            return;
        }

        std::thread::scope(|scope| {
            for (worker, chunk) in dst.chunks_mut(band_len * bands_per_worker).enumerate() {
                scope.spawn(move || {
                    for (i, band) in chunk.chunks_mut(band_len).enumerate() {
                        self.dispatch_band(src, worker * bands_per_worker + i, band);
                    }
                });
            }
        });
    }

    fn dispatch_band(&self, src: &[u8], group_y: usize, band: &mut [u32]) {
        let groups_x = self.width.div_ceil(WORKGROUP_SIZE);
        for group_x in 0..groups_x {
            for local_y in 0..WORKGROUP_SIZE {
                for local_x in 0..WORKGROUP_SIZE {
                    let x = group_x * WORKGROUP_SIZE + local_x;
                    let y = group_y * WORKGROUP_SIZE + local_y;
                    self.invocation(src, x, y, local_y, band);
                }
            }
        }
    }

    /// One kernel invocation: gathers the source pixel for display pixel `(x, y)`.
    #[inline]
    fn invocation(&self, src: &[u8], x: usize, y: usize, band_row: usize, band: &mut [u32]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let source_y = self.height - y - 1;
        let Some(pixel) = Self::load_pixel(src, self.source_offset(x, source_y)) else {
            return;
        };
        if let Some(slot) = band.get_mut(band_row * self.width + x) {
            *slot = pixel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bgra(x: usize, y: usize) -> [u8; 4] {
        [x as u8, y as u8, (x ^ y) as u8, 0xFF]
    }

    /// Writes a recognisable pattern with each pixel at its tiled offset.
    fn tiled_source(width: usize, height: usize) -> Vec<u8> {
        let mut src = vec![0u8; width * height * 4];
        for y in 0..height {
            for x in 0..width {
                let offset = tile_offset(width, std_offset(width, x, y));
                if offset + 4 <= src.len() {
                    src[offset..offset + 4].copy_from_slice(&bgra(x, y));
                }
            }
        }
        src
    }

    #[test]
    fn cpu_path_untiles_and_flips() {
        let (w, h) = (64, 32);
        let src = tiled_source(w, h);
        let converter = FrameConverter::new(w, h, FramebufferLayout::Tiled, ConversionPath::Cpu, 1);
        let mut dst = vec![0u32; w * h];
        converter.convert(&src, &mut dst);

        // Display (5, 0) is source row 31.
        assert_eq!(dst[5], u32::from_le_bytes(bgra(5, 31)));
        assert_eq!(dst[31 * w + 40], u32::from_le_bytes(bgra(40, 0)));
    }

    #[test]
    fn linear_layout_only_flips() {
        let (w, h) = (3, 2);
        let src: Vec<u8> = (0u8..24).collect();
        let converter =
            FrameConverter::new(w, h, FramebufferLayout::Linear, ConversionPath::Cpu, 1);
        let mut dst = vec![0u32; w * h];
        converter.convert(&src, &mut dst);
        assert_eq!(
            dst,
            vec![
                u32::from_le_bytes([12, 13, 14, 15]),
                u32::from_le_bytes([16, 17, 18, 19]),
                u32::from_le_bytes([20, 21, 22, 23]),
                u32::from_le_bytes([0, 1, 2, 3]),
                u32::from_le_bytes([4, 5, 6, 7]),
                u32::from_le_bytes([8, 9, 10, 11]),
            ]
        );
    }

    #[test]
    fn kernel_matches_cpu_on_a_partial_tile_row() {
        // 48 rows leave the second block row half filled; part of it lies past the snapshot.
        let (w, h) = (128, 48);
        let src = tiled_source(w, h);
        let cpu = FrameConverter::new(w, h, FramebufferLayout::Tiled, ConversionPath::Cpu, 1);
        let kernel = FrameConverter::new(w, h, FramebufferLayout::Tiled, ConversionPath::Kernel, 3);

        let mut a = vec![0xDEAD_BEEF; w * h];
        let mut b = vec![0xDEAD_BEEF; w * h];
        cpu.convert(&src, &mut a);
        kernel.convert(&src, &mut b);
        assert_eq!(a, b);
        assert!(a.contains(&0xDEAD_BEEF), "some pixels should be skipped");
    }

    #[test]
    fn kernel_handles_sizes_off_the_workgroup_grid() {
        let (w, h) = (40, 21);
        let src: Vec<u8> = (0..w * h * 4).map(|i| (i * 7) as u8).collect();
        for workers in [1, 2, 5, 64] {
            let cpu =
                FrameConverter::new(w, h, FramebufferLayout::Linear, ConversionPath::Cpu, 1);
            let kernel = FrameConverter::new(
                w,
                h,
                FramebufferLayout::Linear,
                ConversionPath::Kernel,
                workers,
            );
            let mut a = vec![0; w * h];
            let mut b = vec![0; w * h];
            cpu.convert(&src, &mut a);
            kernel.convert(&src, &mut b);
            assert_eq!(a, b, "workers={workers}");
        }
    }

    #[test]
    fn short_destination_is_filled_as_far_as_it_goes() {
        let (w, h) = (64, 32);
        let src = tiled_source(w, h);
        let mut full = vec![0u32; w * h];
        FrameConverter::new(w, h, FramebufferLayout::Tiled, ConversionPath::Cpu, 1)
            .convert(&src, &mut full);

        for (path, workers) in [
            (ConversionPath::Cpu, 1),
            (ConversionPath::Kernel, 1),
            (ConversionPath::Kernel, 4),
        ] {
            let converter = FrameConverter::new(w, h, FramebufferLayout::Tiled, path, workers);
            let mut short = vec![0u32; 10];
            converter.convert(&src, &mut short);
            assert_eq!(short[..], full[..10], "{path:?} workers={workers}");
        }
    }

    #[test]
    fn short_snapshot_skips_missing_pixels() {
        let converter =
            FrameConverter::new(2, 2, FramebufferLayout::Linear, ConversionPath::Kernel, 2);
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = vec![0; 4];
        converter.convert(&src, &mut dst);
        assert_eq!(dst, vec![0, 0, u32::from_le_bytes([1, 2, 3, 4]), 0]);
    }
}
