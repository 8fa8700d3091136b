use core::fmt;

/// Formats bytes as hex, eliding everything past the first `LIMIT` bytes.
pub struct HexBytes<'a>(pub &'a [u8]);

impl HexBytes<'_> {
    const LIMIT: usize = 16;
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.0.iter().take(Self::LIMIT).enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        if self.0.len() > Self::LIMIT {
            write!(f, " .. +{} bytes", self.0.len() - Self::LIMIT)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_slices_print_every_byte() {
        let s = format!("{:?}", HexBytes(&[0xaa, 0x01, 0xff]));
        assert_eq!(s, "[aa 01 ff]");
    }

    #[test]
    fn long_slices_are_elided() {
        let s = format!("{:?}", HexBytes(&[0; 20]));
        assert_eq!(s, "[00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 .. +4 bytes]");
    }
}
