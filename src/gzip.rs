use std::io::Write;

use flate2::{Compression, GzBuilder};

use crate::error::PackResult;

/// Wrap `data` in gzip framing.
///
/// The header mtime is fixed to 0 and no file name is stored, so identical input
/// produces identical output.
pub fn compress(data: &[u8]) -> PackResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(&mut out, Compression::best());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn output_is_gzip_and_decodes() {
        let data = b"Package: demo\nVersion: 1.0\n".repeat(20);
        let gz = compress(&data).unwrap();
        assert_eq!(&gz[..2], &[0x1f, 0x8b]);
        let mut decoded = Vec::new();
        GzDecoder::new(&gz[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(compress(b"same").unwrap(), compress(b"same").unwrap());
    }
}
