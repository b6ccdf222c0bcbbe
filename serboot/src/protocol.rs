//! Word-stream bootloader protocol
//!
//! Every frame starts with a 4-byte little-endian opcode. Write frames carry
//! no length: the receiver keeps storing bytes until the next opcode arrives,
//! so a frame must reach the wire in one piece. There are no acknowledgements.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

use crate::elf::ImageError;
use crate::select::TransferUnit;

/// Address followed by raw payload bytes
pub const START_WRITE: u32 = 0x0001_7373;
/// Entry address, terminates the session
pub const START_EXEC: u32 = 0x0002_7373;
/// Address and length of a range to clear
pub const ZERO_FILL: u32 = 0x0003_7373;

pub const DEFAULT_BAUD_RATE: u32 = 115200;

const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum BootError {
    #[error("Unable to find serial port matching {0:?}")]
    DeviceNotFound(String),

    #[error("Found multiple serial ports:\n{}", .0.join("\n"))]
    DeviceAmbiguous(Vec<String>),

    #[error("Unable to open serial port {port}: {source}")]
    TransportOpenFailed {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error(transparent)]
    Malformed(#[from] ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

/// Bytes of one encoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TransferUnit<'_> {
    pub fn opcode(&self) -> u32 {
        match self {
            TransferUnit::Write { .. } => START_WRITE,
            TransferUnit::ZeroFill { .. } => ZERO_FILL,
            TransferUnit::Start { .. } => START_EXEC,
        }
    }

    /// Serialize into wire bytes
    pub fn encode(&self) -> Frame {
        let mut buf = self.opcode().to_le_bytes().to_vec();
        match self {
            TransferUnit::Write { address, payload } => {
                buf.reserve(4 + payload.len());
                buf.extend(address.to_le_bytes());
                buf.extend_from_slice(payload);
            }
            TransferUnit::ZeroFill { address, length } => {
                buf.extend(address.to_le_bytes());
                buf.extend(length.to_le_bytes());
            }
            TransferUnit::Start { entry } => {
                buf.extend(entry.to_le_bytes());
            }
        }
        Frame(buf)
    }
}

/// Exclusive handle on the link to the bootloader
pub struct BootLink<W> {
    sink: W,
    frames: usize,
    bytes: usize,
}

impl BootLink<tokio_serial::SerialStream> {
    /// Open the serial port at `baud_rate`
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, BootError> {
        log::debug!("Opening {} at {} baud", port_name, baud_rate);

        let port = tokio_serial::new(port_name, baud_rate)
            .timeout(WRITE_TIMEOUT)
            .open_native_async()
            .map_err(|source| BootError::TransportOpenFailed {
                port: port_name.to_string(),
                source,
            })?;

        Ok(Self::new(port))
    }
}

impl<W: AsyncWrite + Unpin> BootLink<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frames: 0,
            bytes: 0,
        }
    }

    /// Write one whole frame and flush it
    pub async fn send(&mut self, frame: &Frame) -> Result<(), BootError> {
        self.sink.write_all(frame.as_bytes()).await?;
        self.sink.flush().await?;

        self.frames += 1;
        self.bytes += frame.len();
        log::trace!("Sent frame {} ({} bytes)", self.frames, frame.len());
        Ok(())
    }

    /// Frames sent so far
    pub fn frames_sent(&self) -> usize {
        self.frames
    }

    /// Bytes sent so far
    pub fn bytes_sent(&self) -> usize {
        self.bytes
    }

    /// Shut the sink down and hand it back
    pub async fn close(mut self) -> Result<W, BootError> {
        self.sink.shutdown().await?;
        log::debug!("Link closed after {} frames, {} bytes", self.frames, self.bytes);
        Ok(self.sink)
    }
}
