//! Serial upload library for a minimal word-stream bootloader
//!
//! This crate extracts the loadable sections of a 32-bit or 64-bit
//! little-endian ELF image (or takes a raw binary as-is), turns them into
//! write, zero-fill and start frames, and streams those over a serial port to
//! the bootloader running on the target.
//!
//! ```no_run
//! # async fn run() -> Result<(), serboot::BootError> {
//! let image = serboot::Image::read("firmware.elf")?;
//! let port = serboot::find_serial_port(serboot::DEFAULT_PORT_FILTER)?;
//! let mut link = serboot::BootLink::open(&port, serboot::DEFAULT_BAUD_RATE)?;
//! serboot::upload(&image, &mut link, None).await?;
//! link.close().await?;
//! # Ok(())
//! # }
//! ```

mod device;
mod driver;
pub mod elf;
mod image;
pub mod protocol;
pub mod select;

#[cfg(test)]
mod testutil;

pub use device::{DEFAULT_PORT_FILTER, PortCandidate, find_serial_port, select_port};
pub use driver::{ProgressCallback, UploadReport, upload};
pub use elf::ImageError;
pub use image::{Image, ImageKind, classify};
pub use protocol::{BootError, BootLink, DEFAULT_BAUD_RATE, Frame};
pub use select::{SkippedSection, Step, TransferUnit, UploadPlan, plan};
