use xe_devices::BusDevice;

/// The POST code port.
///
/// Boot firmware writes progress codes here. The code is the most significant byte of the
/// written value; each one is logged and the latest reads back.
#[derive(Debug, Default)]
pub struct PostBus {
    last: Option<u8>,
    count: u64,
}

impl PostBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_code(&self) -> Option<u8> {
        self.last
    }

    pub fn codes_written(&self) -> u64 {
        self.count
    }
}

impl BusDevice for PostBus {
    fn name(&self) -> &str {
        "post"
    }

    fn read(&mut self, _paddr: u64, size: usize) -> u64 {
        let code = u64::from(self.last.unwrap_or(0));
        match size {
            0 => 0,
            1..=8 => code << ((size - 1) * 8),
            _ => code << 56,
        }
    }

    fn write(&mut self, _paddr: u64, size: usize, value: u64) {
        let shift = size.clamp(1, 8).saturating_sub(1) * 8;
        let code = (value >> shift) as u8;
        self.last = Some(code);
        self.count += 1;
        tracing::info!(code = format_args!("0x{code:02x}"), "POST");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_the_top_byte_of_the_write() {
        let mut post = PostBus::new();
        assert_eq!(post.last_code(), None);

        post.write(0, 8, 0x1A00_0000_0000_0000);
        assert_eq!(post.last_code(), Some(0x1A));
        assert_eq!(post.read(0, 8), 0x1A00_0000_0000_0000);

        post.write(0, 4, 0x2B00_0000);
        assert_eq!(post.last_code(), Some(0x2B));
        assert_eq!(post.read(0, 1), 0x2B);
        assert_eq!(post.codes_written(), 2);
    }
}
