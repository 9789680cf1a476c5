//! POSIX ustar writer.
//!
//! Only regular files are emitted. Names longer than the 100 byte name field are rejected;
//! neither the ustar prefix field nor GNU/pax long name records are written.

use crate::{
    entry::ArchiveEntry,
    error::{PackError, PackResult},
};

pub const BLOCK_SIZE: usize = 512;
pub const NAME_SIZE: usize = 100;

/// Largest value representable by the 11 octal digits of the size and mtime fields.
pub const MAX_NUMERIC: u64 = 0o777_7777_7777;

const MODE_RANGE: std::ops::Range<usize> = 100..108;
const UID_RANGE: std::ops::Range<usize> = 108..116;
const GID_RANGE: std::ops::Range<usize> = 116..124;
const SIZE_RANGE: std::ops::Range<usize> = 124..136;
const MTIME_RANGE: std::ops::Range<usize> = 136..148;
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC_RANGE: std::ops::Range<usize> = 257..263;
const VERSION_RANGE: std::ops::Range<usize> = 263..265;
const UNAME_RANGE: std::ops::Range<usize> = 265..297;
const GNAME_RANGE: std::ops::Range<usize> = 297..329;

const REGULAR_FILE: u8 = b'0';
const OWNER: &[u8] = b"root";

/// Bytes of zero padding needed after `len` bytes of data.
pub fn padding(len: usize) -> usize { (BLOCK_SIZE - len % BLOCK_SIZE) % BLOCK_SIZE }

/// Total size of the archive `build` produces for `entries`.
pub fn archive_size(entries: &[ArchiveEntry]) -> usize {
    entries
        .iter()
        .map(|entry| BLOCK_SIZE + entry.data.len() + padding(entry.data.len()))
        .sum::<usize>()
        + 2 * BLOCK_SIZE
}

/// Serialize `entries` in order, followed by the two zero blocks marking the end of the
/// archive.
pub fn build(entries: &[ArchiveEntry]) -> PackResult<Vec<u8>> {
    for entry in entries {
        validate(entry)?;
    }

    let mut out = vec![0u8; archive_size(entries)];
    let mut cursor = 0;
    for entry in entries {
        write_header(&mut out[cursor..cursor + BLOCK_SIZE], entry);
        cursor += BLOCK_SIZE;
        out[cursor..cursor + entry.data.len()].copy_from_slice(&entry.data);
        // the buffer is zeroed, padding only moves the cursor
        cursor += entry.data.len() + padding(entry.data.len());
    }
    debug_assert_eq!(cursor + 2 * BLOCK_SIZE, out.len());
    Ok(out)
}

fn validate(entry: &ArchiveEntry) -> PackResult<()> {
    if entry.path.len() > NAME_SIZE {
        return Err(PackError::NameTooLong {
            name:  entry.path.clone(),
            limit: NAME_SIZE,
        });
    }
    if entry.path.as_bytes().contains(&0) {
        return Err(PackError::InvalidName(entry.path.clone()));
    }
    if entry.len() > MAX_NUMERIC {
        return Err(PackError::SizeTooLarge {
            what: "tar entry size",
            size: entry.len(),
        });
    }
    if entry.mtime > MAX_NUMERIC {
        return Err(PackError::SizeTooLarge {
            what: "tar entry mtime",
            size: entry.mtime,
        });
    }
    Ok(())
}

fn write_header(block: &mut [u8], entry: &ArchiveEntry) {
    block[..entry.path.len()].copy_from_slice(entry.path.as_bytes());
    write_octal(&mut block[MODE_RANGE], entry.mode as u64, 0);
    write_octal(&mut block[UID_RANGE], 0, 0);
    write_octal(&mut block[GID_RANGE], 0, 0);
    write_octal(&mut block[SIZE_RANGE], entry.len(), b' ');
    write_octal(&mut block[MTIME_RANGE], entry.mtime, b' ');
    block[TYPEFLAG] = REGULAR_FILE;
    block[MAGIC_RANGE].copy_from_slice(b"ustar\0");
    block[VERSION_RANGE].copy_from_slice(b"00");
    block[UNAME_RANGE][..OWNER.len()].copy_from_slice(OWNER);
    block[GNAME_RANGE][..OWNER.len()].copy_from_slice(OWNER);

    block[CHECKSUM_RANGE].fill(b' ');
    let checksum = header_checksum(block);
    let checksum = format!("{:06o}\0 ", checksum);
    block[CHECKSUM_RANGE].copy_from_slice(checksum.as_bytes());
}

/// Write `value` as zero-padded octal digits filling all but the last byte of `field`,
/// which is set to `terminator`.
fn write_octal(field: &mut [u8], value: u64, terminator: u8) {
    let digits = field.len() - 1;
    let text = format!("{:0width$o}", value, width = digits);
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = terminator;
}

/// Unsigned sum of the 512 header bytes with the checksum field counted as spaces.
pub fn header_checksum(block: &[u8]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            if CHECKSUM_RANGE.contains(&i) {
                b' ' as u32
            } else {
                byte as u32
            }
        })
        .sum()
}

/// Parse the checksum stored in a header block.
pub fn stored_checksum(block: &[u8]) -> Option<u32> {
    let field = &block[CHECKSUM_RANGE];
    let digits = field
        .iter()
        .take_while(|&&byte| byte != 0 && byte != b' ')
        .map(|&byte| byte as char)
        .collect::<String>();
    u32::from_str_radix(&digits, 8).ok()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn entry(path: &str, mode: u32, data: &[u8]) -> ArchiveEntry {
        ArchiveEntry::new(path, mode, 1_700_000_000, data.to_vec()).unwrap()
    }

    #[test]
    fn layout_is_block_aligned() {
        let entries = [
            entry("./a.txt", 0o644, b"hello"),
            entry("./b.bin", 0o755, &[7u8; 512]),
        ];
        let tar = build(&entries).unwrap();
        // header + 1 data block, header + 1 data block, 2 end blocks
        assert_eq!(tar.len(), 6 * BLOCK_SIZE);
        assert_eq!(&tar[BLOCK_SIZE..BLOCK_SIZE + 5], b"hello");
        assert!(tar[BLOCK_SIZE + 5..2 * BLOCK_SIZE].iter().all(|&b| b == 0));
        assert!(tar[4 * BLOCK_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn every_header_checksum_verifies() {
        let entries = [
            entry("./control", 0o644, b"Package: demo\n"),
            entry("./usr/local/bin/demo", 0o755, &[0xAB; 1000]),
            entry("./empty", 0o600, b""),
        ];
        let tar = build(&entries).unwrap();
        let mut cursor = 0;
        for entry in &entries {
            let block = &tar[cursor..cursor + BLOCK_SIZE];
            assert_eq!(stored_checksum(block), Some(header_checksum(block)));
            assert_eq!(&block[148 + 6..156], b"\0 ");
            cursor += BLOCK_SIZE + entry.data.len() + padding(entry.data.len());
        }
    }

    #[test]
    fn zero_length_entry_has_no_data_blocks() {
        let tar = build(&[entry("./empty", 0o644, b"")]).unwrap();
        assert_eq!(tar.len(), 3 * BLOCK_SIZE);
        assert_eq!(&tar[124..136], b"00000000000 ");
    }

    #[test]
    fn numeric_fields_are_octal() {
        let tar = build(&[entry("./x", 0o755, &[1u8; 9])]).unwrap();
        assert_eq!(&tar[100..108], b"0000755\0");
        assert_eq!(&tar[124..136], b"00000000011 ");
        assert_eq!(tar[156], b'0');
        assert_eq!(&tar[257..263], b"ustar\0");
    }

    #[test]
    fn long_names_are_rejected_not_truncated() {
        let name = format!("./{}", "n".repeat(NAME_SIZE));
        let result = build(&[entry(&name, 0o644, b"x")]);
        assert!(matches!(
            result,
            Err(PackError::NameTooLong { limit: NAME_SIZE, .. })
        ));
        let exact = "m".repeat(NAME_SIZE);
        assert!(build(&[entry(&exact, 0o644, b"x")]).is_ok());
    }

    #[test]
    fn empty_archive_is_two_zero_blocks() {
        let tar = build(&[]).unwrap();
        assert_eq!(tar, vec![0u8; 2 * BLOCK_SIZE]);
    }

    #[test]
    fn standard_reader_accepts_output() {
        let entries = [
            entry("./usr/share/applications/demo.desktop", 0o644, b"[Desktop Entry]\n"),
            entry("./usr/local/bin/demo", 0o755, &[0x7f, b'E', b'L', b'F', 2, 1]),
        ];
        let tar = build(&entries).unwrap();
        let mut archive = ::tar::Archive::new(&tar[..]);
        let mut seen = Vec::new();
        for file in archive.entries().unwrap() {
            let mut file = file.unwrap();
            let path = file.path().unwrap().to_string_lossy().into_owned();
            let mode = file.header().mode().unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            seen.push((path, mode, data));
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "./usr/share/applications/demo.desktop");
        assert_eq!(seen[1].1, 0o755);
        assert_eq!(seen[1].2, entries[1].data);
    }
}
