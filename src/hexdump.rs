//! Hex dump formatting for frame trace logs.

use core::fmt;

const BYTES_PER_LINE: usize = 16;

/// Formats bytes as offset, hex and ASCII columns, 16 bytes per line.
///
/// Formatting is lazy, so wrapping a frame in `Hexdump` costs nothing unless the
/// log record is actually emitted.
#[derive(Clone, Copy)]
pub struct Hexdump<'a>(pub &'a [u8]);

impl fmt::Display for Hexdump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.0.chunks(BYTES_PER_LINE).enumerate() {
            if line > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04X} -", line * BYTES_PER_LINE)?;
            for byte in chunk {
                write!(f, " {:02X}", byte)?;
            }
            for _ in chunk.len()..BYTES_PER_LINE {
                f.write_str("   ")?;
            }
            f.write_str("  ")?;
            for &byte in chunk {
                let c = if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' };
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Hexdump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
