use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::structs::subpicture::Region;
use crate::utils::errors::OcrError;

/// Sentinel returned when recognition yields nothing usable.
pub const NO_TEXT: &str = "no text detected";

/// Number of foreground-mapping hypotheses tried per subpicture.
const HYPOTHESES: usize = 5;

/// Margin factors applied around the subtitle content; extra border
/// improves recognition of short or edge-touching glyphs.
const PAD_WIDTH_FACTOR: usize = 2;
const PAD_HEIGHT_FACTOR: usize = 3;

/// An external text-recognition capability.
pub trait Recognizer: Send {
    fn recognize(&mut self, bitmap: &GrayBitmap) -> Result<String, OcrError>;
}

/// 8-bit grayscale bitmap handed to the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayBitmap {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// Bridges subpicture regions to an external recognizer.
///
/// The recognizer runs on an adapter-owned worker thread so a stalled
/// engine cannot stall the decode path; each call is bounded by a
/// timeout and falls back to the [`NO_TEXT`] sentinel.
///
/// Up to five foreground mappings are tried per region: the natural
/// one (bright visible classes are text) and each color class alone.
/// The first mapping that yields text is remembered and tried first on
/// the next call.
pub struct TextExtractor {
    worker: Option<Worker>,
    timeout: Duration,
    preferred: usize,
}

struct Worker {
    requests: Sender<GrayBitmap>,
    responses: Receiver<Result<String, OcrError>>,
    // Detached on drop; joining could block on a stuck engine.
    _handle: thread::JoinHandle<()>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            worker: None,
            timeout: Duration::from_secs(2),
            preferred: 0,
        }
    }
}

impl TextExtractor {
    pub fn with_recognizer(mut recognizer: Box<dyn Recognizer>) -> Self {
        let (requests, request_rx) = channel::<GrayBitmap>();
        let (response_tx, responses) = channel();

        let handle = thread::spawn(move || {
            while let Ok(bitmap) = request_rx.recv() {
                if response_tx.send(recognizer.recognize(&bitmap)).is_err() {
                    break;
                }
            }
        });

        Self {
            worker: Some(Worker {
                requests,
                responses,
                _handle: handle,
            }),
            ..Default::default()
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Recognizes the text in a rendered region.
    ///
    /// Never blocks longer than the per-attempt timeout times the
    /// hypothesis count, and never fails: anything unusable becomes
    /// the [`NO_TEXT`] sentinel.
    pub fn extract(&mut self, region: &Region) -> String {
        if region.width == 0 || region.height == 0 || self.worker.is_none() {
            return NO_TEXT.to_string();
        }

        // A timed-out attempt leaves its response in flight; drop any
        // stale ones so requests and responses stay paired.
        if let Some(worker) = &self.worker {
            while worker.responses.try_recv().is_ok() {}
        }

        for attempt in 0..HYPOTHESES {
            let hypothesis = (self.preferred + attempt) % HYPOTHESES;
            let bitmap = rasterize(region, hypothesis);

            match self.recognize_once(bitmap) {
                Ok(text) => {
                    let text = text.trim().to_lowercase();
                    if !text.is_empty() && text != NO_TEXT {
                        self.preferred = hypothesis;
                        return text;
                    }
                }
                Err(OcrError::Timeout(ms)) => {
                    warn!("recognition timed out after {ms} ms");
                    // The worker is still busy; give up on this region
                    // rather than queueing more work behind it.
                    return NO_TEXT.to_string();
                }
                Err(e) => {
                    warn!("recognition failed: {e}");
                    self.worker = None;
                    return NO_TEXT.to_string();
                }
            }

            debug!("hypothesis {hypothesis} yielded no text");
        }

        NO_TEXT.to_string()
    }

    fn recognize_once(&mut self, bitmap: GrayBitmap) -> Result<String, OcrError> {
        let Some(worker) = &self.worker else {
            return Err(OcrError::EngineUnavailable("no recognizer".into()));
        };

        if worker.requests.send(bitmap).is_err() {
            return Err(OcrError::EngineUnavailable("worker exited".into()));
        }

        match worker.responses.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Renders the region as black-background/white-foreground grayscale
/// with the content centered in a padded canvas.
///
/// Hypothesis 0 treats visible bright classes as foreground;
/// hypotheses 1 through 4 each promote a single color class.
fn rasterize(region: &Region, hypothesis: usize) -> GrayBitmap {
    let width = region.width * PAD_WIDTH_FACTOR;
    let height = region.height * PAD_HEIGHT_FACTOR;
    let left = (width - region.width) / 2;
    let top = (height - region.height) / 2;

    let foreground: [bool; 4] = match hypothesis {
        0 => {
            let mut map = [false; 4];
            for (class, entry) in region.palette.iter().enumerate() {
                // Visible and bright means text in the common case.
                map[class] = entry[3] != 0 && entry[0] >= 0x80;
            }
            map
        }
        h => {
            let mut map = [false; 4];
            map[h - 1] = true;
            map
        }
    };

    let mut pixels = vec![0u8; width * height];
    for (y, row) in region.pixels.chunks_exact(region.width.max(1)).enumerate() {
        for (x, &class) in row.iter().enumerate() {
            if foreground[(class & 0x3) as usize] {
                pixels[(top + y) * width + left + x] = 0xFF;
            }
        }
    }

    GrayBitmap {
        width,
        height,
        pixels,
    }
}
