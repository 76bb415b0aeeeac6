//! Transcode orchestration.
//!
//! A [`Transcoder`] turns input bytes into MP4 bytes. Progress is reported
//! as a lazy sequence of events: zero or more `Progress` percentages, then
//! exactly one terminal `Finished` or `Failed`.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeEvent {
    /// Percentage complete, 0..=100.
    Progress(u8),
    Finished(Bytes),
    Failed(String),
}

/// Opaque codec: bytes in, MP4 bytes out.
pub trait Transcoder {
    type Job: Iterator<Item = TranscodeEvent>;

    fn start(&self, input: Bytes) -> Self::Job;
}

/// Run `job` to its terminal event, feeding percentages to `observer`.
///
/// Reported percentages never go backwards and finish at 100.
pub fn drive<J>(job: J, mut observer: impl FnMut(u8)) -> Result<Bytes, String>
where
    J: Iterator<Item = TranscodeEvent>,
{
    let mut last = 0u8;
    for event in job {
        match event {
            TranscodeEvent::Progress(pct) => {
                last = pct.min(100).max(last);
                observer(last);
            }
            TranscodeEvent::Finished(bytes) => {
                if last < 100 {
                    observer(100);
                }
                return Ok(bytes);
            }
            TranscodeEvent::Failed(reason) => return Err(reason),
        }
    }
    Err("transcoder stopped without a result".into())
}

/// Accepts ISO base media files (MP4, MOV, M4V) unchanged and relabels
/// them as MP4. Anything else fails; there is no codec behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

/// Number of progress steps a passthrough copy reports.
const PASSTHROUGH_STEPS: usize = 4;

impl Transcoder for Passthrough {
    type Job = PassthroughJob;

    fn start(&self, input: Bytes) -> PassthroughJob {
        PassthroughJob {
            chunk: (input.len() / PASSTHROUGH_STEPS).max(1),
            input,
            copied: 0,
            state: JobState::Start,
        }
    }
}

pub struct PassthroughJob {
    input: Bytes,
    copied: usize,
    chunk: usize,
    state: JobState,
}

enum JobState {
    Start,
    Copying,
    Done,
}

impl Iterator for PassthroughJob {
    type Item = TranscodeEvent;

    fn next(&mut self) -> Option<TranscodeEvent> {
        match self.state {
            JobState::Start => {
                if !is_iso_media(&self.input) {
                    self.state = JobState::Done;
                    return Some(TranscodeEvent::Failed(
                        "input is not an MP4/MOV container; no codec available to convert it".into(),
                    ));
                }
                self.state = JobState::Copying;
                Some(TranscodeEvent::Progress(0))
            }
            JobState::Copying if self.copied < self.input.len() => {
                self.copied = (self.copied + self.chunk).min(self.input.len());
                let pct = self.copied * 100 / self.input.len();
                Some(TranscodeEvent::Progress(pct as u8))
            }
            JobState::Copying => {
                self.state = JobState::Done;
                Some(TranscodeEvent::Finished(self.input.clone()))
            }
            JobState::Done => None,
        }
    }
}

/// ISO base media files open with a box whose type is `ftyp`.
fn is_iso_media(data: &[u8]) -> bool {
    data.len() >= 8 && &data[4..8] == b"ftyp"
}
