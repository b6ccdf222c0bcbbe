//! Upload orchestration
//!
//! A single linear pass per image: classify, read headers, select sections,
//! transmit, finish. Parsing and selection are complete before the first
//! frame is written, so a malformed image never leaves the target half
//! written. Transport errors mid-stream are returned as-is; there is no retry.

use tokio::io::AsyncWrite;

use crate::elf;
use crate::image::{Image, ImageKind};
use crate::protocol::{BootError, BootLink};
use crate::select::{self, SkippedSection, Step, TransferUnit, UploadPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum UploadState {
    Idle,
    Classified,
    HeadersRead,
    Selecting,
    Transmitting,
    Finished,
    Failed,
}

/// Progress callback, called before each step is transmitted
pub type ProgressCallback = Box<dyn Fn(&Step<'_>) + Send>;

/// Outcome of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub kind: ImageKind,
    pub entry: u32,
    pub frames: usize,
    pub written_bytes: u64,
    pub zeroed_bytes: u64,
    pub skipped: Vec<SkippedSection>,
}

struct Session {
    state: UploadState,
}

impl Session {
    fn new() -> Self {
        Self {
            state: UploadState::Idle,
        }
    }

    fn advance(&mut self, next: UploadState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        log::debug!("Upload state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail<T>(&mut self, err: impl Into<BootError>) -> Result<T, BootError> {
        let err = err.into();
        log::debug!("Upload failed in state {:?}: {}", self.state, err);
        self.state = UploadState::Failed;
        Err(err)
    }
}

/// Send `image` over `link` and command the target to start it
pub async fn upload<W: AsyncWrite + Unpin>(
    image: &Image,
    link: &mut BootLink<W>,
    progress: Option<ProgressCallback>,
) -> Result<UploadReport, BootError> {
    let mut session = Session::new();

    session.advance(UploadState::Classified);
    log::info!("Image is {:?}, {} bytes", image.kind(), image.len());

    let headers = match elf::parse_image(image) {
        Ok(headers) => headers,
        Err(err) => return session.fail(err),
    };
    session.advance(UploadState::HeadersRead);

    session.advance(UploadState::Selecting);
    let plan = match &headers {
        Some(elf) => match select::plan_sections(image, elf) {
            Ok(plan) => plan,
            Err(err) => return session.fail(err),
        },
        None => {
            log::info!("No ELF header, sending the file as one block at 0x0");
            UploadPlan::raw(image.bytes())
        }
    };

    session.advance(UploadState::Transmitting);
    let mut report = UploadReport {
        kind: plan.kind,
        entry: plan.entry,
        frames: 0,
        written_bytes: 0,
        zeroed_bytes: 0,
        skipped: plan.skipped.clone(),
    };

    let start = plan.start();
    for step in plan.steps.iter().chain(std::iter::once(&start)) {
        if let Some(ref cb) = progress {
            cb(step);
        }

        if let Err(err) = link.send(&step.unit.encode()).await {
            return session.fail(err);
        }

        report.frames += 1;
        match &step.unit {
            TransferUnit::Write { payload, .. } => report.written_bytes += payload.len() as u64,
            TransferUnit::ZeroFill { length, .. } => report.zeroed_bytes += *length as u64,
            TransferUnit::Start { .. } => {}
        }
    }

    session.advance(UploadState::Finished);
    log::info!(
        "Upload complete: {} frames, {} bytes written, {} bytes zeroed",
        report.frames,
        report.written_bytes,
        report.zeroed_bytes
    );
    Ok(report)
}
