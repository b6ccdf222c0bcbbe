//! Program images and format detection

use object::elf::{ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFMAG, EV_CURRENT};
use std::io;
use std::path::Path;

/// Number of identification bytes inspected by [`classify`]
pub const IDENT_LEN: usize = 16;

/// Format of an image as detected from its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// 32-bit little-endian ELF
    Elf32,
    /// 64-bit little-endian ELF
    Elf64,
    /// Anything else, uploaded verbatim
    Raw,
}

const fn ident(class: u8) -> [u8; IDENT_LEN] {
    let mut magic = [0u8; IDENT_LEN];
    magic[0] = ELFMAG[0];
    magic[1] = ELFMAG[1];
    magic[2] = ELFMAG[2];
    magic[3] = ELFMAG[3];
    magic[4] = class;
    magic[5] = ELFDATA2LSB;
    magic[6] = EV_CURRENT;
    magic
}

const ELF32_IDENT: [u8; IDENT_LEN] = ident(ELFCLASS32);
const ELF64_IDENT: [u8; IDENT_LEN] = ident(ELFCLASS64);

/// Detect the image format from the first 16 bytes.
///
/// Anything that is not an exact match for one of the two identification
/// patterns, including buffers shorter than 16 bytes, is [`ImageKind::Raw`].
pub fn classify(data: &[u8]) -> ImageKind {
    match data.get(..IDENT_LEN) {
        Some(head) if head == ELF32_IDENT => ImageKind::Elf32,
        Some(head) if head == ELF64_IDENT => ImageKind::Elf64,
        _ => ImageKind::Raw,
    }
}

/// An image file loaded into memory, read-only after construction
#[derive(Debug, Clone)]
pub struct Image {
    data: Vec<u8>,
    kind: ImageKind,
}

impl Image {
    pub fn new(data: Vec<u8>) -> Self {
        let kind = classify(&data);
        log::debug!("Classified {} byte image as {:?}", data.len(), kind);
        Self { data, kind }
    }

    /// Read an image from disk
    pub fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::new(data))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }
}
