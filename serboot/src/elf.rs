//! Section header extraction for little-endian ELF images
//!
//! Only what the upload needs is decoded: the entry point, the section header
//! table, the section names and each section's type, address, file offset and
//! size. Both widths go through one reader built on [`object::read::elf`].

use object::elf::{
    FileHeader32, FileHeader64, SHT_NOBITS, SHT_NULL, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB,
};
use object::read::elf::{FileHeader, SectionHeader, SectionTable};
use object::{LittleEndian, ReadRef};
use thiserror::Error;

use crate::image::{Image, ImageKind};

pub type Elf32 = FileHeader32<LittleEndian>;
pub type Elf64 = FileHeader64<LittleEndian>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Malformed image: {0}")]
    Malformed(String),
}

impl From<object::read::Error> for ImageError {
    fn from(err: object::read::Error) -> Self {
        ImageError::Malformed(err.to_string())
    }
}

pub(crate) fn malformed(msg: impl Into<String>) -> ImageError {
    ImageError::Malformed(msg.into())
}

fn to_usize(value: u64, what: &str) -> Result<usize, ImageError> {
    usize::try_from(value)
        .map_err(|_| malformed(format!("{} 0x{:X} is out of range", what, value)))
}

/// Location of the section header table within the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeaderTable {
    pub offset: usize,
    pub entry_size: usize,
    pub entry_count: usize,
    /// Index of the entry describing the section name string table
    pub names_index: usize,
}

impl SectionHeaderTable {
    /// Read the table location from the file header and check that the whole
    /// table lies inside `data`.
    pub fn read<Elf: FileHeader<Endian = LittleEndian>>(
        header: &Elf,
        data: &[u8],
    ) -> Result<Self, ImageError> {
        let endian = LittleEndian;
        let entries = header.section_headers(endian, data)?;
        let offset = to_usize(header.e_shoff(endian).into(), "section header table offset")?;
        let entry_size = usize::from(header.e_shentsize(endian));
        let entry_count = entries.len();

        let end = entry_size
            .checked_mul(entry_count)
            .and_then(|len| len.checked_add(offset));
        match end {
            Some(end) if end <= data.len() => {}
            _ => {
                return Err(malformed(format!(
                    "section header table at 0x{:X} ({} x {} bytes) exceeds image length {}",
                    offset,
                    entry_count,
                    entry_size,
                    data.len()
                )));
            }
        }

        let names_index = header.shstrndx(endian, data)? as usize;
        if names_index >= entry_count {
            return Err(malformed(format!(
                "section name table index {} is not below section count {}",
                names_index, entry_count
            )));
        }

        Ok(Self {
            offset,
            entry_size,
            entry_count,
            names_index,
        })
    }
}

/// Section type, as far as the upload is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Null,
    ProgBits,
    SymTab,
    StrTab,
    NoBits,
    Other(u32),
}

impl From<u32> for SectionType {
    fn from(raw: u32) -> Self {
        match raw {
            SHT_NULL => SectionType::Null,
            SHT_PROGBITS => SectionType::ProgBits,
            SHT_SYMTAB => SectionType::SymTab,
            SHT_STRTAB => SectionType::StrTab,
            SHT_NOBITS => SectionType::NoBits,
            other => SectionType::Other(other),
        }
    }
}

impl From<SectionType> for u32 {
    fn from(kind: SectionType) -> Self {
        match kind {
            SectionType::Null => SHT_NULL,
            SectionType::ProgBits => SHT_PROGBITS,
            SectionType::SymTab => SHT_SYMTAB,
            SectionType::StrTab => SHT_STRTAB,
            SectionType::NoBits => SHT_NOBITS,
            SectionType::Other(raw) => raw,
        }
    }
}

/// One decoded section header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// Position in the header table
    pub index: usize,
    pub name: &'a str,
    pub kind: SectionType,
    /// Load address in target memory
    pub address: u64,
    /// File offset of the contents, meaningless for `NoBits`
    pub offset: u64,
    pub size: u64,
}

impl<'a> Section<'a> {
    fn decode<Elf: FileHeader<Endian = LittleEndian>>(
        index: usize,
        header: &Elf::SectionHeader,
        table: &SectionTable<'a, Elf>,
    ) -> Result<Self, ImageError> {
        let endian = LittleEndian;
        let name = table
            .section_name(endian, header)
            .map_err(|err| malformed(format!("section {}: {}", index, err)))?;
        let name = std::str::from_utf8(name)
            .map_err(|_| malformed(format!("name of section {} is not valid text", index)))?;
        Ok(Self {
            index,
            name,
            kind: SectionType::from(header.sh_type(endian)),
            address: header.sh_addr(endian).into(),
            offset: header.sh_offset(endian).into(),
            size: header.sh_size(endian).into(),
        })
    }

    /// File contents of the section. `NoBits` and empty sections have none.
    pub fn data<'d>(&self, image: &'d [u8]) -> Result<&'d [u8], ImageError> {
        if self.kind == SectionType::NoBits || self.size == 0 {
            return Ok(&[]);
        }
        image.read_bytes_at(self.offset, self.size).map_err(|()| {
            malformed(format!(
                "section {} contents at 0x{:X} (+{}) exceed image length {}",
                self.name,
                self.offset,
                self.size,
                image.len()
            ))
        })
    }
}

/// Entry point and section list of an ELF image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage<'a> {
    pub entry: u64,
    pub table: SectionHeaderTable,
    /// Sections in header table order
    pub sections: Vec<Section<'a>>,
}

/// Decode the section headers of an image laid out as `Elf`
pub fn parse<Elf: FileHeader<Endian = LittleEndian>>(
    data: &[u8],
) -> Result<ElfImage<'_>, ImageError> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let table = SectionHeaderTable::read(header, data)?;
    let headers = header.sections(endian, data)?;

    let sections = headers
        .iter()
        .enumerate()
        .map(|(index, section)| Section::decode::<Elf>(index, section, &headers))
        .collect::<Result<Vec<_>, _>>()?;
    let entry: u64 = header.e_entry(endian).into();

    log::debug!(
        "{}: entry 0x{:08X}, {} sections at 0x{:X}",
        if header.is_type_64() { "ELF64" } else { "ELF32" },
        entry,
        sections.len(),
        table.offset
    );

    Ok(ElfImage {
        entry,
        table,
        sections,
    })
}

/// Decode the section headers if the image is ELF; `None` for raw images
pub fn parse_image(image: &Image) -> Result<Option<ElfImage<'_>>, ImageError> {
    match image.kind() {
        ImageKind::Elf32 => parse::<Elf32>(image.bytes()).map(Some),
        ImageKind::Elf64 => parse::<Elf64>(image.bytes()).map(Some),
        ImageKind::Raw => Ok(None),
    }
}
