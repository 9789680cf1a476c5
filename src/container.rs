//! Single-executable containers.
//!
//! A container is the launcher executable followed by its sections and a fixed trailer:
//!
//! ```text
//! [launcher][pad][section][pad][section]...[magic 16][(offset u64, size u64) per slot]
//! ```
//!
//! Every section starts on an 8 byte boundary. Sections appear in slot order. A slot holding
//! `(0, 0)` is absent. The trailer magic identifies the variant and with it the slot count.

use std::{io::Write, path::Path};

use zerocopy::{byteorder::little_endian::U64, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    error::{PackError, PackResult},
    output::PartialOutput,
};

pub const ALIGNMENT: u64 = 8;
pub const MAGIC_SIZE: usize = 16;
pub const STANDARD_MAGIC: [u8; MAGIC_SIZE] = *b"APP_EMBEDDED\0\0\0\0";
pub const UNIVERSAL_MAGIC: [u8; MAGIC_SIZE] = *b"APP_UNIVERSAL\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    /// Payload for the packing architecture, or x86_64 in the universal variant.
    Primary,
    Assets,
    /// aarch64 payload of the universal variant.
    Secondary,
    Library,
}

impl SectionId {
    pub fn name(self) -> &'static str {
        match self {
            SectionId::Primary => "primary",
            SectionId::Assets => "assets",
            SectionId::Secondary => "secondary",
            SectionId::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Universal,
}

impl Variant {
    pub fn name(self) -> &'static str {
        match self {
            Variant::Standard => "standard",
            Variant::Universal => "universal",
        }
    }

    pub fn magic(self) -> [u8; MAGIC_SIZE] {
        match self {
            Variant::Standard => STANDARD_MAGIC,
            Variant::Universal => UNIVERSAL_MAGIC,
        }
    }

    /// Slots in file and trailer order.
    pub fn slots(self) -> &'static [SectionId] {
        match self {
            Variant::Standard => &[SectionId::Primary, SectionId::Assets, SectionId::Library],
            Variant::Universal => &[
                SectionId::Primary,
                SectionId::Assets,
                SectionId::Secondary,
                SectionId::Library,
            ],
        }
    }

    /// Size of the offset/size table, without the magic.
    pub fn table_size(self) -> usize { self.slots().len() * size_of::<SectionPair>() }

    pub fn trailer_size(self) -> usize { MAGIC_SIZE + self.table_size() }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SectionPair {
    pub offset: U64,
    pub size:   U64,
}

impl SectionPair {
    fn new(offset: u64, size: u64) -> Self {
        SectionPair {
            offset: U64::new(offset),
            size:   U64::new(size),
        }
    }

    fn is_absent(&self) -> bool { self.offset.get() == 0 && self.size.get() == 0 }
}

/// Sections to pack, keyed by slot. Every slot of the variant starts out absent.
#[derive(Debug, Clone)]
pub struct SectionTable<'a> {
    variant:  Variant,
    sections: Vec<(SectionId, Option<&'a [u8]>)>,
}

impl<'a> SectionTable<'a> {
    pub fn new(variant: Variant) -> Self {
        SectionTable {
            variant,
            sections: variant.slots().iter().map(|&id| (id, None)).collect(),
        }
    }

    pub fn variant(&self) -> Variant { self.variant }

    pub fn set(&mut self, id: SectionId, data: &'a [u8]) -> PackResult<&mut Self> {
        let slot = self
            .sections
            .iter_mut()
            .find(|(slot, _)| *slot == id)
            .ok_or(PackError::UnsupportedSection {
                section: id.name(),
                variant: self.variant.name(),
            })?;
        slot.1 = Some(data);
        Ok(self)
    }

    pub fn get(&self, id: SectionId) -> Option<&'a [u8]> {
        self.sections
            .iter()
            .find(|(slot, _)| *slot == id)
            .and_then(|(_, data)| *data)
    }

    fn validate(&self) -> PackResult<()> {
        if self.get(SectionId::Primary).is_none() {
            return Err(PackError::MissingSection(SectionId::Primary.name()));
        }
        for (id, data) in &self.sections {
            if data.is_some_and(<[u8]>::is_empty) {
                return Err(PackError::EmptySection(id.name()));
            }
        }
        Ok(())
    }
}

/// A present section inside a container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id:     SectionId,
    pub offset: u64,
    pub size:   u64,
}

impl Placement {
    pub fn end(&self) -> u64 { self.offset + self.size }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    pub variant:        Variant,
    /// Present sections in slot order.
    pub sections:       Vec<Placement>,
    pub trailer_offset: u64,
    pub file_size:      u64,
}

impl ContainerLayout {
    pub fn get(&self, id: SectionId) -> Option<&Placement> { self.sections.iter().find(|p| p.id == id) }

    /// Borrow the bytes of section `id` from the container they were read from.
    ///
    /// Returns `None` when `container` is too short to hold the section.
    pub fn slice<'b>(&self, container: &'b [u8], id: SectionId) -> Option<&'b [u8]> {
        self.get(id)
            .and_then(|p| container.get(p.offset as usize..p.end() as usize))
    }

    /// Locate and validate the trailer at the end of `container`.
    ///
    /// Any section that is misaligned, overlaps another section or the trailer, or reaches
    /// past the end of the file is reported as corruption.
    pub fn read(container: &[u8]) -> PackResult<Self> {
        let variant = [Variant::Standard, Variant::Universal]
            .into_iter()
            .find(|variant| {
                container
                    .len()
                    .checked_sub(variant.trailer_size())
                    .is_some_and(|start| container[start..start + MAGIC_SIZE] == variant.magic())
            })
            .ok_or(if container.len() < Variant::Standard.trailer_size() {
                PackError::Truncated("container trailer")
            } else {
                PackError::InvalidMagic("container trailer")
            })?;

        let trailer_offset = (container.len() - variant.trailer_size()) as u64;
        let table = &container[trailer_offset as usize + MAGIC_SIZE..];
        let mut sections = Vec::new();
        // the launcher occupies everything before the first section
        let mut floor = 1;
        for (&id, pair) in variant.slots().iter().zip(table.chunks_exact(size_of::<SectionPair>())) {
            let pair = SectionPair::read_from_bytes(pair)
                .map_err(|_| PackError::Truncated("container trailer"))?;
            if pair.is_absent() {
                continue;
            }
            let (offset, size) = (pair.offset.get(), pair.size.get());
            if size == 0 {
                return Err(PackError::EmptySection(id.name()));
            }
            if offset % ALIGNMENT != 0 {
                return Err(PackError::corrupted(
                    "container trailer",
                    format!("{} section offset {} is not aligned", id.name(), offset),
                ));
            }
            let end = offset.checked_add(size).filter(|&end| end <= trailer_offset);
            let Some(end) = end.filter(|_| offset >= floor) else {
                return Err(PackError::corrupted(
                    "container trailer",
                    format!("{} section {}+{} is out of bounds", id.name(), offset, size),
                ));
            };
            sections.push(Placement { id, offset, size });
            floor = end;
        }
        if !sections.iter().any(|p| p.id == SectionId::Primary) {
            return Err(PackError::MissingSection(SectionId::Primary.name()));
        }

        Ok(ContainerLayout {
            variant,
            sections,
            trailer_offset,
            file_size: container.len() as u64,
        })
    }
}

fn padding(offset: u64) -> u64 { (ALIGNMENT - offset % ALIGNMENT) % ALIGNMENT }

/// Compute where every present section of `table` lands after a launcher of `launcher_len`
/// bytes.
pub fn layout(launcher_len: u64, table: &SectionTable) -> PackResult<ContainerLayout> {
    if launcher_len == 0 {
        return Err(PackError::EmptySection("launcher"));
    }
    table.validate()?;
    let mut cursor = launcher_len;
    let mut sections = Vec::new();
    for (id, data) in &table.sections {
        let Some(data) = data else { continue };
        cursor += padding(cursor);
        sections.push(Placement {
            id:     *id,
            offset: cursor,
            size:   data.len() as u64,
        });
        cursor += data.len() as u64;
    }
    Ok(ContainerLayout {
        variant: table.variant,
        sections,
        trailer_offset: cursor,
        file_size: cursor + table.variant.trailer_size() as u64,
    })
}

/// Serialize the trailer for `layout`, absent slots as zero pairs.
pub fn trailer(layout: &ContainerLayout) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.variant.trailer_size());
    out.extend_from_slice(&layout.variant.magic());
    for &id in layout.variant.slots() {
        let pair = layout
            .get(id)
            .map(|p| SectionPair::new(p.offset, p.size))
            .unwrap_or_default();
        out.extend_from_slice(pair.as_bytes());
    }
    out
}

/// Write `launcher`, the sections of `table` and the trailer to `writer`.
///
/// The table is validated before the first byte is written.
pub fn pack<W: Write>(launcher: &[u8], table: &SectionTable, writer: &mut W) -> PackResult<ContainerLayout> {
    let layout = layout(launcher.len() as u64, table)?;
    const ZEROS: [u8; ALIGNMENT as usize] = [0; ALIGNMENT as usize];

    writer.write_all(launcher)?;
    let mut cursor = launcher.len() as u64;
    for placement in &layout.sections {
        writer.write_all(&ZEROS[..(placement.offset - cursor) as usize])?;
        if let Some(data) = table.get(placement.id) {
            writer.write_all(data)?;
        }
        cursor = placement.end();
    }
    writer.write_all(&trailer(&layout))?;
    Ok(layout)
}

/// The payloads of one application, in the order they are packed.
#[derive(Debug, Clone, Default)]
pub struct Payloads {
    pub primary:   Vec<u8>,
    pub assets:    Option<Vec<u8>>,
    /// aarch64 payload; its presence selects the universal variant.
    pub secondary: Option<Vec<u8>>,
    pub library:   Option<Vec<u8>>,
}

impl Payloads {
    pub fn new(primary: Vec<u8>) -> Self {
        Payloads {
            primary,
            ..Default::default()
        }
    }

    pub fn variant(&self) -> Variant {
        if self.secondary.is_some() {
            Variant::Universal
        } else {
            Variant::Standard
        }
    }

    pub fn table(&self) -> PackResult<SectionTable<'_>> {
        let mut table = SectionTable::new(self.variant());
        table.set(SectionId::Primary, &self.primary)?;
        if let Some(assets) = &self.assets {
            table.set(SectionId::Assets, assets)?;
        }
        if let Some(secondary) = &self.secondary {
            table.set(SectionId::Secondary, secondary)?;
        }
        if let Some(library) = &self.library {
            table.set(SectionId::Library, library)?;
        }
        Ok(table)
    }
}

/// Pack `payloads` behind `launcher` into an executable file at `target`.
///
/// Nothing is left at `target` when validation or writing fails.
pub fn write_executable(launcher: &[u8], payloads: &Payloads, target: &Path) -> PackResult<ContainerLayout> {
    let table = payloads.table()?;
    let mut output = PartialOutput::create(target)?.executable();
    let layout = pack(launcher, &table, &mut output)?;
    output.commit()?;
    Ok(layout)
}
