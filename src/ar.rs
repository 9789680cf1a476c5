//! Unix `ar` archives, the outer envelope of a `.deb`.
//!
//! Layout: the global magic `!<arch>\n`, then per member a 60 byte text header followed by the
//! member data, padded with a single `\n` when its length is odd.

use crate::{
    entry::unix_now,
    error::{PackError, PackResult},
};

pub const MAGIC: &[u8; 8] = b"!<arch>\n";
pub const HEADER_SIZE: usize = 60;
pub const NAME_SIZE: usize = 16;
pub const DEFAULT_MODE: u32 = 0o100644;

const PAD: u8 = b'\n';
const TERMINATOR: &[u8; 2] = b"`\n";

const NAME_RANGE: std::ops::Range<usize> = 0..16;
const MTIME_RANGE: std::ops::Range<usize> = 16..28;
const UID_RANGE: std::ops::Range<usize> = 28..34;
const GID_RANGE: std::ops::Range<usize> = 34..40;
const MODE_RANGE: std::ops::Range<usize> = 40..48;
const SIZE_RANGE: std::ops::Range<usize> = 48..58;
const TERMINATOR_RANGE: std::ops::Range<usize> = 58..60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArMember {
    pub name:  String,
    pub mtime: u64,
    pub uid:   u32,
    pub gid:   u32,
    pub mode:  u32,
    pub data:  Vec<u8>,
}

impl ArMember {
    /// A root-owned `0100644` member stamped with the current time.
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        ArMember {
            name: name.to_string(),
            mtime: unix_now(),
            uid: 0,
            gid: 0,
            mode: DEFAULT_MODE,
            data,
        }
    }

    fn padded_len(&self) -> usize { self.data.len() + self.data.len() % 2 }
}

/// Serialize `members` in the order given.
pub fn build(members: &[ArMember]) -> PackResult<Vec<u8>> {
    for member in members {
        validate(member)?;
    }

    let total = MAGIC.len()
        + members
            .iter()
            .map(|member| HEADER_SIZE + member.padded_len())
            .sum::<usize>();
    let mut out = vec![0u8; total];
    out[..MAGIC.len()].copy_from_slice(MAGIC);

    let mut cursor = MAGIC.len();
    for member in members {
        let header = &mut out[cursor..cursor + HEADER_SIZE];
        header.fill(b' ');
        write_field(&mut header[NAME_RANGE], &member.name);
        write_field(&mut header[MTIME_RANGE], &member.mtime.to_string());
        write_field(&mut header[UID_RANGE], &member.uid.to_string());
        write_field(&mut header[GID_RANGE], &member.gid.to_string());
        write_field(&mut header[MODE_RANGE], &format!("{:o}", member.mode));
        write_field(&mut header[SIZE_RANGE], &member.data.len().to_string());
        header[TERMINATOR_RANGE].copy_from_slice(TERMINATOR);
        cursor += HEADER_SIZE;

        out[cursor..cursor + member.data.len()].copy_from_slice(&member.data);
        cursor += member.data.len();
        if member.data.len() % 2 == 1 {
            out[cursor] = PAD;
            cursor += 1;
        }
    }
    debug_assert_eq!(cursor, out.len());
    Ok(out)
}

fn validate(member: &ArMember) -> PackResult<()> {
    if member.name.is_empty() || member.name.contains(|c: char| c.is_whitespace()) {
        return Err(PackError::InvalidName(member.name.clone()));
    }
    if member.name.len() > NAME_SIZE {
        return Err(PackError::NameTooLong {
            name:  member.name.clone(),
            limit: NAME_SIZE,
        });
    }
    check_width("ar member mtime", member.mtime, MTIME_RANGE.len(), 10)?;
    check_width("ar member uid", member.uid as u64, UID_RANGE.len(), 10)?;
    check_width("ar member gid", member.gid as u64, GID_RANGE.len(), 10)?;
    check_width("ar member mode", member.mode as u64, MODE_RANGE.len(), 8)?;
    check_width("ar member size", member.data.len() as u64, SIZE_RANGE.len(), 10)
}

fn check_width(what: &'static str, value: u64, width: usize, radix: u64) -> PackResult<()> {
    let limit = radix.checked_pow(width as u32).unwrap_or(u64::MAX);
    if value >= limit {
        return Err(PackError::SizeTooLarge { what, size: value });
    }
    Ok(())
}

/// Left-aligned text, the remainder of the field stays space filled.
fn write_field(field: &mut [u8], value: &str) { field[..value.len()].copy_from_slice(value.as_bytes()); }

/// Parse an archive produced by `build` or any other common `ar` writer using short names.
pub fn parse(data: &[u8]) -> PackResult<Vec<ArMember>> {
    if data.len() < MAGIC.len() {
        return Err(PackError::Truncated("ar archive"));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(PackError::InvalidMagic("ar archive"));
    }

    let mut members = Vec::new();
    let mut cursor = MAGIC.len();
    while cursor < data.len() {
        if cursor + HEADER_SIZE > data.len() {
            return Err(PackError::Truncated("ar member header"));
        }
        let header = &data[cursor..cursor + HEADER_SIZE];
        if &header[TERMINATOR_RANGE] != TERMINATOR {
            return Err(PackError::corrupted(
                "ar member header",
                format!("missing terminator at offset {}", cursor),
            ));
        }
        let name = text_field(&header[NAME_RANGE])?;
        let mtime = number_field(&header[MTIME_RANGE], 10)?;
        let uid = number_field(&header[UID_RANGE], 10)? as u32;
        let gid = number_field(&header[GID_RANGE], 10)? as u32;
        let mode = number_field(&header[MODE_RANGE], 8)? as u32;
        let size = number_field(&header[SIZE_RANGE], 10)? as usize;
        cursor += HEADER_SIZE;

        if cursor + size > data.len() {
            return Err(PackError::Truncated("ar member data"));
        }
        members.push(ArMember {
            name: name.trim_end_matches('/').to_string(),
            mtime,
            uid,
            gid,
            mode,
            data: data[cursor..cursor + size].to_vec(),
        });
        cursor += size + size % 2;
    }
    Ok(members)
}

fn text_field(field: &[u8]) -> PackResult<&str> {
    std::str::from_utf8(field)
        .map(str::trim_end)
        .map_err(|_| PackError::corrupted("ar member header", "field is not ascii"))
}

fn number_field(field: &[u8], radix: u32) -> PackResult<u64> {
    let text = text_field(field)?;
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, radix)
        .map_err(|_| PackError::corrupted("ar member header", format!("bad number {:?}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_matches_ar_format() {
        let members = [
            ArMember::new("debian-binary", b"2.0\n".to_vec()),
            ArMember::new("odd", b"abc".to_vec()),
            ArMember::new("even", b"abcd".to_vec()),
        ];
        let ar = build(&members).unwrap();
        assert_eq!(&ar[..8], MAGIC);

        let mut cursor = 8;
        for member in &members {
            let header = &ar[cursor..cursor + HEADER_SIZE];
            assert_eq!(&header[58..60], b"`\n");
            assert_eq!(&header[40..48], b"100644  ");
            cursor += HEADER_SIZE + member.data.len();
            if member.data.len() % 2 == 1 {
                assert_eq!(ar[cursor], 0x0a);
                cursor += 1;
            }
        }
        assert_eq!(cursor, ar.len());
    }

    #[test]
    fn header_fields_are_left_aligned_decimal() {
        let mut member = ArMember::new("data.tar.gz", vec![0; 1234]);
        member.mtime = 1_700_000_000;
        let ar = build(&[member]).unwrap();
        let header = &ar[8..8 + HEADER_SIZE];
        assert_eq!(&header[0..16], b"data.tar.gz     ");
        assert_eq!(&header[16..28], b"1700000000  ");
        assert_eq!(&header[28..34], b"0     ");
        assert_eq!(&header[48..58], b"1234      ");
    }

    #[test]
    fn order_is_preserved_through_parse() {
        let members = [
            ArMember::new("debian-binary", b"2.0\n".to_vec()),
            ArMember::new("control.tar.gz", vec![1; 33]),
            ArMember::new("data.tar.gz", vec![2; 64]),
        ];
        let parsed = parse(&build(&members).unwrap()).unwrap();
        let names = parsed.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["debian-binary", "control.tar.gz", "data.tar.gz"]);
        assert_eq!(parsed[1].data, vec![1; 33]);
        assert_eq!(parsed[2].mode, DEFAULT_MODE);
    }

    #[test]
    fn long_member_names_are_rejected() {
        let result = build(&[ArMember::new("a-very-long-member-name", Vec::new())]);
        assert!(matches!(result, Err(PackError::NameTooLong { limit: 16, .. })));
    }

    #[test]
    fn parse_rejects_truncated_member() {
        let mut ar = build(&[ArMember::new("x", vec![9; 10])]).unwrap();
        ar.truncate(ar.len() - 3);
        assert!(matches!(parse(&ar), Err(PackError::Truncated(_))));
        assert!(matches!(parse(b"!<arch>"), Err(PackError::Truncated(_))));
        assert!(matches!(parse(b"<arch>!\nxx"), Err(PackError::InvalidMagic(_))));
    }
}
