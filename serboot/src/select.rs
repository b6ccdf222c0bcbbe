//! Turning sections into transfer units
//!
//! Every decision is made up front: [`plan`] validates the whole image and
//! returns the complete list of steps before anything touches the transport.

use std::borrow::Cow;
use std::fmt;

use crate::elf::{self, ElfImage, ImageError, Section, SectionType, malformed};
use crate::image::{Image, ImageKind};

/// Name substrings of PROGBITS sections that never go to target memory
const METADATA_SECTIONS: [&str; 2] = [".comment", ".debug"];

/// Write payloads are padded to this many bytes
pub const WORD_SIZE: usize = 4;

/// What to do with one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the file contents to the load address
    Copy,
    /// Clear the target range
    ZeroFill,
    /// Expected and uninteresting
    Ignore,
    /// Not handled, listed in the summary
    Skip,
}

pub fn classify_section(section: &Section<'_>) -> Action {
    match section.kind {
        SectionType::ProgBits
            if METADATA_SECTIONS
                .iter()
                .any(|marker| section.name.contains(marker)) =>
        {
            Action::Ignore
        }
        SectionType::ProgBits => Action::Copy,
        SectionType::NoBits => Action::ZeroFill,
        SectionType::Null | SectionType::SymTab | SectionType::StrTab => Action::Ignore,
        SectionType::Other(_) => Action::Skip,
    }
}

/// One instruction for the bootloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUnit<'a> {
    Write { address: u32, payload: Cow<'a, [u8]> },
    ZeroFill { address: u32, length: u32 },
    Start { entry: u32 },
}

impl TransferUnit<'_> {
    /// Target address range touched by this unit, end exclusive
    pub fn span(&self) -> (u64, u64) {
        match self {
            TransferUnit::Write { address, payload } => {
                (*address as u64, *address as u64 + payload.len() as u64)
            }
            TransferUnit::ZeroFill { address, length } => {
                (*address as u64, *address as u64 + *length as u64)
            }
            TransferUnit::Start { entry } => (*entry as u64, *entry as u64),
        }
    }
}

/// A transfer unit with the name of the section it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<'a> {
    pub name: &'a str,
    pub unit: TransferUnit<'a>,
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.unit.span();
        match self.unit {
            TransferUnit::Write { .. } => write!(
                f,
                "Writing segment: {} at addresses 0x{:02X}-0x{:02X}",
                self.name, start, end
            ),
            TransferUnit::ZeroFill { .. } => write!(
                f,
                "Zeroing segment: {} at addresses 0x{:02X}-0x{:02X}",
                self.name, start, end
            ),
            TransferUnit::Start { .. } => {
                write!(f, "Starting program at address: 0x{:02X}", start)
            }
        }
    }
}

/// A section left out of the upload because its type is not handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSection {
    pub name: String,
    pub kind: u32,
}

impl fmt::Display for SkippedSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:X})", self.name, self.kind)
    }
}

/// Everything that will be sent, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan<'a> {
    pub kind: ImageKind,
    pub entry: u32,
    pub steps: Vec<Step<'a>>,
    pub skipped: Vec<SkippedSection>,
}

impl<'a> UploadPlan<'a> {
    /// Raw image: the whole buffer at address 0, started at 0
    pub fn raw(data: &'a [u8]) -> Self {
        Self {
            kind: ImageKind::Raw,
            entry: 0,
            steps: vec![Step {
                name: "binary",
                unit: TransferUnit::Write {
                    address: 0,
                    payload: Cow::Borrowed(data),
                },
            }],
            skipped: Vec::new(),
        }
    }

    pub fn is_raw(&self) -> bool {
        self.kind == ImageKind::Raw
    }

    /// All units in transmission order, ending with exactly one `Start`
    pub fn units(&self) -> impl Iterator<Item = TransferUnit<'a>> + Clone {
        self.steps
            .iter()
            .map(|step| step.unit.clone())
            .chain(std::iter::once(TransferUnit::Start { entry: self.entry }))
    }

    /// The terminal step
    pub fn start(&self) -> Step<'a> {
        Step {
            name: "entry",
            unit: TransferUnit::Start { entry: self.entry },
        }
    }
}

fn target_u32(value: u64, what: &str, name: &str) -> Result<u32, ImageError> {
    u32::try_from(value).map_err(|_| {
        malformed(format!(
            "{} 0x{:X} of {} exceeds the 32-bit target address space",
            what, value, name
        ))
    })
}

/// Append zero bytes up to the next word boundary
pub fn pad_to_word(data: &[u8]) -> Cow<'_, [u8]> {
    let missing = data.len().next_multiple_of(WORD_SIZE) - data.len();
    if missing == 0 {
        return Cow::Borrowed(data);
    }
    let mut padded = Vec::with_capacity(data.len() + missing);
    padded.extend_from_slice(data);
    padded.resize(data.len() + missing, 0);
    Cow::Owned(padded)
}

/// Parse `image` and build the full upload plan
pub fn plan(image: &Image) -> Result<UploadPlan<'_>, ImageError> {
    match elf::parse_image(image)? {
        Some(elf) => plan_sections(image, &elf),
        None => Ok(UploadPlan::raw(image.bytes())),
    }
}

/// Build the upload plan from already decoded section headers
pub fn plan_sections<'a>(
    image: &'a Image,
    elf: &ElfImage<'a>,
) -> Result<UploadPlan<'a>, ImageError> {
    let data = image.bytes();
    let entry = target_u32(elf.entry, "entry point", "image")?;
    let mut steps = Vec::new();
    let mut skipped = Vec::new();

    for section in &elf.sections {
        let unit = match classify_section(section) {
            Action::Copy => {
                let contents = section.data(data)?;
                let unit = TransferUnit::Write {
                    address: target_u32(section.address, "address", section.name)?,
                    payload: pad_to_word(contents),
                };
                check_span(&unit, section)?;
                unit
            }
            Action::ZeroFill => {
                let unit = TransferUnit::ZeroFill {
                    address: target_u32(section.address, "address", section.name)?,
                    length: target_u32(section.size, "size", section.name)?,
                };
                check_span(&unit, section)?;
                unit
            }
            Action::Ignore => {
                log::trace!("Ignoring section {:?} ({:?})", section.name, section.kind);
                continue;
            }
            Action::Skip => {
                log::debug!("Skipping section {:?} ({:?})", section.name, section.kind);
                skipped.push(SkippedSection {
                    name: section.name.to_string(),
                    kind: section.kind.into(),
                });
                continue;
            }
        };
        steps.push(Step {
            name: section.name,
            unit,
        });
    }

    log::debug!(
        "Planned {} transfers, {} sections skipped, entry 0x{:08X}",
        steps.len(),
        skipped.len(),
        entry
    );

    Ok(UploadPlan {
        kind: image.kind(),
        entry,
        steps,
        skipped,
    })
}

fn check_span(unit: &TransferUnit<'_>, section: &Section<'_>) -> Result<(), ImageError> {
    let (_, end) = unit.span();
    if end > 1 << 32 {
        return Err(malformed(format!(
            "section {} ends at 0x{:X}, past the 32-bit target address space",
            section.name, end
        )));
    }
    Ok(())
}
