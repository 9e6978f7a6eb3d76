/// SubRip-format logging of recognized subtitles.
pub mod dump;

/// Text recognition over rendered regions.
///
/// Provides the [`TextExtractor`](ocr::TextExtractor) worker adapter and
/// the [`Recognizer`](ocr::Recognizer) engine trait.
pub mod ocr;

/// Mute and skip scheduling against live playback.
pub mod schedule;

/// Deny-list word matching.
pub mod words;
