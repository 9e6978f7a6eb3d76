use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::filter::words::WordFilter;
use crate::structs::subpicture::Subpicture;
use crate::utils::errors::FilterLoadError;
use crate::utils::timing::{Mtime, parse_srt_time, srt_time};

/// Lead-out added after a skipped window so playback resumes past any
/// straggling frames of the filtered scene.
pub const SKIP_MARGIN: Mtime = 100_000;

/// What to do with playback inside a filter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Mute,
    Skip,
}

/// One half-open `[start, end)` window of media time with its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterWindow {
    pub action: FilterAction,
    pub start: Mtime,
    pub end: Mtime,
}

/// Pre-authored filter windows loaded from an edit list file.
#[derive(Debug, Default, Clone)]
pub struct FilterList {
    windows: Vec<FilterWindow>,
}

impl FilterList {
    /// Loads an edit list. The first line is a title and is ignored;
    /// every following non-empty line is
    /// `<mute|skip>; <hh:mm:ss,mmm> --> <hh:mm:ss,mmm>`.
    ///
    /// Any unreadable file or malformed record yields an empty list
    /// with a warning; filtering is enrichment, never a reason to stop
    /// playback.
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("filter list {} not loaded: {e}", path.display());
                return Self::default();
            }
        };

        let lines = BufReader::new(file).lines().map_while(Result::ok);
        match Self::from_lines(lines) {
            Ok(list) => {
                info!(
                    "loaded {} filter windows from {}",
                    list.len(),
                    path.display()
                );
                list
            }
            Err(e) => {
                warn!("filter list {} not loaded: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Result<Self, FilterLoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut windows = Vec::new();

        // First line is the list title.
        for line in lines.into_iter().skip(1) {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            windows.push(parse_record(line)?);
        }

        windows.sort_by_key(|window| window.start);
        Ok(Self { windows })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// First window in start order containing `now`.
    pub fn match_at(&self, now: Mtime) -> Option<FilterWindow> {
        self.windows
            .iter()
            .copied()
            .find(|window| window.start <= now && now < window.end)
    }
}

fn parse_record(line: &str) -> Result<FilterWindow, FilterLoadError> {
    let (action, times) = line
        .split_once(';')
        .ok_or_else(|| FilterLoadError::BadRecord(line.to_string()))?;

    let action = match action.trim() {
        "mute" => FilterAction::Mute,
        "skip" => FilterAction::Skip,
        other => return Err(FilterLoadError::BadAction(other.to_string())),
    };

    let (start, end) = times
        .split_once("-->")
        .ok_or_else(|| FilterLoadError::BadRecord(line.to_string()))?;

    Ok(FilterWindow {
        action,
        start: parse_srt_time(start.trim())?,
        end: parse_srt_time(end.trim())?,
    })
}

/// Playback position control, implemented by the hosting player.
pub trait Transport {
    /// Current playback position in media time.
    fn position(&self) -> Mtime;
    /// Total media length.
    fn length(&self) -> Mtime;
    /// Media time still queued downstream of the decoder.
    fn pending(&self) -> Mtime;
    /// Seeks to a fraction of the media length in `0.0..=1.0`.
    fn set_position(&self, fraction: f64);
}

/// Timestamped block of interleaved 16-bit audio samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pub pts: Mtime,
    pub samples: Vec<i16>,
}

/// Downstream consumer of audio buffers.
pub trait AudioSink {
    fn play(&mut self, buffer: AudioBuffer);
}

/// Sink decorator that runs every buffer through the scheduler's mute
/// handshake before handing it on.
pub struct MuteSink<S: AudioSink> {
    inner: S,
    scheduler: std::sync::Arc<FilterScheduler>,
}

impl<S: AudioSink> MuteSink<S> {
    pub fn new(inner: S, scheduler: std::sync::Arc<FilterScheduler>) -> Self {
        Self { inner, scheduler }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AudioSink> AudioSink for MuteSink<S> {
    fn play(&mut self, mut buffer: AudioBuffer) {
        self.scheduler.apply_mute(&mut buffer);
        self.inner.play(buffer);
    }
}

struct PendingMute {
    /// Armed window; buffers inside it are silenced.
    window: Option<(Mtime, Mtime)>,
    /// Bumped on every arm/clear so a slow reader can detect that the
    /// window it observed is gone.
    generation: u64,
}

/// Applies mute windows and skip jumps to live playback.
///
/// Subtitle decode and audio delivery run on different threads; the
/// pending mute window is the only shared state and sits behind a
/// mutex. A mute is a two-phase handshake: the decode side arms the
/// window, the audio side silences buffers inside it and clears it once
/// a buffer lands at or past the end.
pub struct FilterScheduler {
    list: FilterList,
    pending: Mutex<PendingMute>,
    cancelled: AtomicBool,
    /// Jump target of an executed skip. The player can keep reporting
    /// pre-jump positions for a few observations; those are ignored
    /// until the target is reached, then the latch clears. Ordinary
    /// seeks (including rewinds) are not latched, so replayed windows
    /// trigger again.
    skip_latch: Mutex<Option<Mtime>>,
}

impl FilterScheduler {
    pub fn new(list: FilterList) -> Self {
        Self {
            list,
            pending: Mutex::new(PendingMute {
                window: None,
                generation: 0,
            }),
            cancelled: AtomicBool::new(false),
            skip_latch: Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Arms a mute over `[start, end)`.
    ///
    /// Refused while an earlier window is still armed: overlapping
    /// mutes would race on the clear and the earlier window already
    /// covers the moment that triggered this one.
    pub fn schedule_mute(&self, start: Mtime, end: Mtime) -> bool {
        if self.cancelled() || end <= start {
            return false;
        }

        let mut pending = lock(&self.pending);
        if pending.window.is_some() {
            debug!("mute already pending, ignoring [{start}, {end})");
            return false;
        }

        info!("muting {} --> {}", srt_time(start), srt_time(end));
        pending.window = Some((start, end));
        pending.generation += 1;
        true
    }

    /// Silences the buffer if it falls inside the armed mute window and
    /// clears the window once playback reaches its end.
    pub fn apply_mute(&self, buffer: &mut AudioBuffer) {
        let mut pending = lock(&self.pending);
        let Some((start, end)) = pending.window else {
            return;
        };

        if buffer.pts >= end {
            debug!("mute window released at {}", srt_time(buffer.pts));
            pending.window = None;
            pending.generation += 1;
        } else if buffer.pts >= start {
            buffer.samples.fill(0);
        }
    }

    /// Reacts to the current playback position: triggers a skip when
    /// inside a skip window, arms a mute when inside a mute window.
    ///
    /// Windows are re-evaluated on every observation, so a seek back
    /// into one triggers it again. Only positions still trailing an
    /// executed skip jump are ignored.
    pub fn check_playback(&self, transport: &dyn Transport) {
        if self.cancelled() {
            return;
        }

        let now = transport.position();
        {
            let mut latch = lock(&self.skip_latch);
            if let Some(target) = *latch {
                if now < target {
                    return;
                }
                *latch = None;
            }
        }

        match self.list.match_at(now) {
            Some(FilterWindow {
                action: FilterAction::Skip,
                end,
                ..
            }) => self.execute_skip(transport, end),
            Some(FilterWindow {
                action: FilterAction::Mute,
                start,
                end,
            }) => {
                self.schedule_mute(start, end);
            }
            None => {}
        }
    }

    /// Jumps past a skip window once queued media has drained enough
    /// that the jump lands where the user hears it.
    fn execute_skip(&self, transport: &dyn Transport, end: Mtime) {
        for _ in 0..50 {
            if transport.pending() <= SKIP_MARGIN || self.cancelled() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let length = transport.length();
        if length <= 0 {
            return;
        }

        let target = (end + SKIP_MARGIN).min(length);
        info!("skipping to {}", srt_time(target));

        // Latch before seeking so a concurrent observation of the
        // pre-jump position cannot re-trigger the window.
        *lock(&self.skip_latch) = Some(target);
        transport.set_position(target as f64 / length as f64);
    }

    /// Ties recognized subtitle text to the deny list: a hit arms a
    /// mute spanning the subtitle's display window.
    pub fn on_subtitle(&self, subtitle: &Subpicture, text: &str, words: &WordFilter) -> bool {
        if !words.contains_banned(text) {
            return false;
        }

        info!(
            "matched deny list in {} --> {}: {text}",
            srt_time(subtitle.start_time),
            srt_time(subtitle.stop_time),
        );
        self.schedule_mute(subtitle.start_time, subtitle.stop_time)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    fn list() -> FilterList {
        FilterList::from_lines([
            "test list",
            "mute; 00:00:00,100 --> 00:00:00,200",
            "skip; 00:00:01,000 --> 00:00:02,000",
            "",
            "mute; 00:00:00,150 --> 00:00:00,300",
        ])
        .unwrap()
    }

    #[test]
    fn records_parse_and_sort() {
        let list = list();

        assert_eq!(list.len(), 3);
        assert_eq!(
            list.match_at(155_000),
            Some(FilterWindow {
                action: FilterAction::Mute,
                start: 100_000,
                end: 200_000,
            })
        );
        assert_eq!(list.match_at(500_000), None);
        assert_eq!(
            list.match_at(1_500_000).map(|w| w.action),
            Some(FilterAction::Skip)
        );
    }

    #[test]
    fn first_line_is_ignored() {
        let list = FilterList::from_lines(["not; a --> record"]).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(FilterList::from_lines(["t", "blur; 00:00:00,000 --> 00:00:01,000"]).is_err());
        assert!(FilterList::from_lines(["t", "mute 1 2"]).is_err());
        assert!(FilterList::from_lines(["t", "mute; 0:0:0,0 --> bad"]).is_err());
    }

    #[test]
    fn mute_handshake_silences_then_releases() {
        let scheduler = FilterScheduler::new(FilterList::default());
        assert!(scheduler.schedule_mute(50_000, 150_000));

        let mut inside = AudioBuffer {
            pts: 120_000,
            samples: vec![1, -2, 3],
        };
        scheduler.apply_mute(&mut inside);
        assert_eq!(inside.samples, vec![0, 0, 0]);

        let mut past = AudioBuffer {
            pts: 160_000,
            samples: vec![4, 5],
        };
        scheduler.apply_mute(&mut past);
        assert_eq!(past.samples, vec![4, 5]);

        // Window released, a new one can be armed.
        assert!(scheduler.schedule_mute(200_000, 300_000));
    }

    #[test]
    fn second_mute_is_refused_while_pending() {
        let scheduler = FilterScheduler::new(FilterList::default());
        assert!(scheduler.schedule_mute(0, 100_000));
        assert!(!scheduler.schedule_mute(50_000, 200_000));
    }

    #[test]
    fn buffers_before_the_window_pass_through() {
        let scheduler = FilterScheduler::new(FilterList::default());
        assert!(scheduler.schedule_mute(100_000, 200_000));

        let mut early = AudioBuffer {
            pts: 50_000,
            samples: vec![7],
        };
        scheduler.apply_mute(&mut early);
        assert_eq!(early.samples, vec![7]);
    }

    struct FakeTransport {
        position: AtomicI64,
        length: Mtime,
    }

    impl Transport for FakeTransport {
        fn position(&self) -> Mtime {
            self.position.load(Ordering::SeqCst)
        }

        fn length(&self) -> Mtime {
            self.length
        }

        fn pending(&self) -> Mtime {
            0
        }

        fn set_position(&self, fraction: f64) {
            self.position
                .store((fraction * self.length as f64) as Mtime, Ordering::SeqCst);
        }
    }

    #[test]
    fn skip_window_jumps_past_its_end() {
        let scheduler = FilterScheduler::new(list());
        let transport = FakeTransport {
            position: AtomicI64::new(1_500_000),
            length: 10_000_000,
        };

        scheduler.check_playback(&transport);
        let target = 2_000_000 + SKIP_MARGIN;
        assert_eq!(transport.position(), target);

        // The latch swallows observations still trailing the jump, in
        // case the player briefly reports a pre-jump position.
        transport.position.store(1_600_000, Ordering::SeqCst);
        scheduler.check_playback(&transport);
        assert_eq!(transport.position(), 1_600_000);

        // Reaching the target clears the latch; a later rewind back
        // into the window triggers the skip again.
        transport.position.store(target, Ordering::SeqCst);
        scheduler.check_playback(&transport);
        transport.position.store(1_200_000, Ordering::SeqCst);
        scheduler.check_playback(&transport);
        assert_eq!(transport.position(), target);
    }

    #[test]
    fn rewind_into_a_mute_window_rearms_it() {
        let scheduler = FilterScheduler::new(list());
        let transport = FakeTransport {
            position: AtomicI64::new(155_000),
            length: 10_000_000,
        };

        scheduler.check_playback(&transport);

        // Playback passes the window end, releasing the handshake.
        let mut past = AudioBuffer {
            pts: 250_000,
            samples: vec![1],
        };
        scheduler.apply_mute(&mut past);

        // The user seeks back before the window; re-entering it must
        // arm the mute again.
        transport.position.store(400_000, Ordering::SeqCst);
        scheduler.check_playback(&transport);
        transport.position.store(155_000, Ordering::SeqCst);
        scheduler.check_playback(&transport);

        let mut inside = AudioBuffer {
            pts: 180_000,
            samples: vec![7, 7],
        };
        scheduler.apply_mute(&mut inside);
        assert_eq!(inside.samples, vec![0, 0]);
    }

    #[test]
    fn mute_window_arms_from_playback_position() {
        let scheduler = FilterScheduler::new(list());
        let transport = FakeTransport {
            position: AtomicI64::new(155_000),
            length: 10_000_000,
        };

        scheduler.check_playback(&transport);

        let mut buffer = AudioBuffer {
            pts: 180_000,
            samples: vec![9, 9],
        };
        scheduler.apply_mute(&mut buffer);
        assert_eq!(buffer.samples, vec![0, 0]);
    }

    #[test]
    fn deny_list_hit_schedules_a_mute() {
        use crate::structs::subpicture::Region;

        let scheduler = FilterScheduler::new(FilterList::default());
        let words = WordFilter::from_lines(["badword"]);
        let subtitle = Subpicture {
            start_time: 1_000_000,
            stop_time: 2_000_000,
            ephemeral: false,
            forced: false,
            region: Region::default(),
        };

        assert!(scheduler.on_subtitle(&subtitle, "a badword here", &words));
        assert!(!scheduler.on_subtitle(&subtitle, "all clean", &words));

        let mut buffer = AudioBuffer {
            pts: 1_500_000,
            samples: vec![1],
        };
        scheduler.apply_mute(&mut buffer);
        assert_eq!(buffer.samples, vec![0]);
    }

    #[test]
    fn mute_sink_silences_in_flight_buffers() {
        use std::sync::Arc;

        struct Capture(Vec<AudioBuffer>);
        impl AudioSink for Capture {
            fn play(&mut self, buffer: AudioBuffer) {
                self.0.push(buffer);
            }
        }

        let scheduler = Arc::new(FilterScheduler::new(FilterList::default()));
        assert!(scheduler.schedule_mute(100, 200));

        let mut sink = MuteSink::new(Capture(Vec::new()), scheduler);
        sink.play(AudioBuffer {
            pts: 150,
            samples: vec![5, 5],
        });
        sink.play(AudioBuffer {
            pts: 250,
            samples: vec![6],
        });

        let captured = sink.into_inner().0;
        assert_eq!(captured[0].samples, vec![0, 0]);
        assert_eq!(captured[1].samples, vec![6]);
    }

    #[test]
    fn cancelled_scheduler_is_inert() {
        let scheduler = FilterScheduler::new(list());
        scheduler.cancel();

        assert!(!scheduler.schedule_mute(0, 100));
        let transport = FakeTransport {
            position: AtomicI64::new(1_500_000),
            length: 10_000_000,
        };
        scheduler.check_playback(&transport);
        assert_eq!(transport.position(), 1_500_000);
    }
}
