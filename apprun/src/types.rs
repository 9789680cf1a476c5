use zerocopy::{byteorder::little_endian::U64, FromBytes, Immutable, KnownLayout};

use crate::error::RunError;

pub const ALIGNMENT: u64 = 8;
pub const MAGIC_SIZE: usize = 16;
pub const STANDARD_MAGIC: [u8; MAGIC_SIZE] = *b"APP_EMBEDDED\0\0\0\0";
pub const UNIVERSAL_MAGIC: [u8; MAGIC_SIZE] = *b"APP_UNIVERSAL\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Primary,
    Assets,
    Secondary,
    Library,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Section::Primary => "primary",
            Section::Assets => "assets",
            Section::Secondary => "secondary",
            Section::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Universal,
}

impl Variant {
    pub fn magic(self) -> [u8; MAGIC_SIZE] {
        match self {
            Variant::Standard => STANDARD_MAGIC,
            Variant::Universal => UNIVERSAL_MAGIC,
        }
    }

    pub fn slots(self) -> &'static [Section] {
        match self {
            Variant::Standard => &[Section::Primary, Section::Assets, Section::Library],
            Variant::Universal => &[Section::Primary, Section::Assets, Section::Secondary, Section::Library],
        }
    }

    pub fn trailer_size(self) -> usize { MAGIC_SIZE + self.slots().len() * size_of::<SectionPair>() }
}

#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable)]
pub struct SectionPair {
    pub offset: U64,
    pub size:   U64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub section: Section,
    pub offset:  usize,
    pub size:    usize,
}

/// Validated section table of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub variant:  Variant,
    pub sections: Vec<Placement>,
}

impl Layout {
    /// Read the trailer at the end of `file`. Nothing is trusted until every pair is checked
    /// against alignment, ordering and the trailer position.
    pub fn read(file: &[u8]) -> Result<Self, RunError> {
        if file.len() < Variant::Standard.trailer_size() {
            return Err(RunError::Truncated);
        }
        let variant = [Variant::Standard, Variant::Universal]
            .into_iter()
            .find(|variant| {
                file.len()
                    .checked_sub(variant.trailer_size())
                    .is_some_and(|start| file[start..start + MAGIC_SIZE] == variant.magic())
            })
            .ok_or(RunError::InvalidMagic)?;

        let trailer_start = file.len() - variant.trailer_size();
        let table = &file[trailer_start + MAGIC_SIZE..];
        let mut sections = Vec::new();
        let mut floor = 1u64;
        for (&section, pair) in variant.slots().iter().zip(table.chunks_exact(size_of::<SectionPair>())) {
            let pair = SectionPair::read_from_bytes(pair).map_err(|_| RunError::Truncated)?;
            let (offset, size) = (pair.offset.get(), pair.size.get());
            if offset == 0 && size == 0 {
                continue;
            }
            if size == 0 {
                return Err(RunError::EmptySection(section.name()));
            }
            if offset % ALIGNMENT != 0 {
                return Err(RunError::Corrupted(format!(
                    "{} section offset {} is not aligned",
                    section.name(),
                    offset
                )));
            }
            let end = match offset.checked_add(size) {
                Some(end) if offset >= floor && end <= trailer_start as u64 => end,
                _ => {
                    return Err(RunError::Corrupted(format!(
                        "{} section {}+{} is out of bounds",
                        section.name(),
                        offset,
                        size
                    )))
                }
            };
            sections.push(Placement {
                section,
                offset: offset as usize,
                size: size as usize,
            });
            floor = end;
        }
        Ok(Layout { variant, sections })
    }

    pub fn get(&self, section: Section) -> Option<Placement> {
        self.sections.iter().copied().find(|p| p.section == section)
    }

    pub fn slice<'a>(&self, file: &'a [u8], section: Section) -> Option<&'a [u8]> {
        self.get(section)
            .and_then(|p| file.get(p.offset..p.offset.checked_add(p.size)?))
    }

    /// Payload section for a CPU architecture as named by `std::env::consts::ARCH`.
    pub fn payload_for(&self, arch: &str) -> Result<Section, RunError> {
        let section = match (self.variant, arch) {
            (Variant::Universal, "aarch64") => Section::Secondary,
            _ => Section::Primary,
        };
        self.get(section)
            .map(|p| p.section)
            .ok_or(RunError::MissingSection(section.name()))
    }
}
