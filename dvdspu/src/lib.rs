//! Decoder for DVD subpicture (SPU) streams with content filtering.
//!
//! ## Technical Overview
//!
//! Parser and renderer for the DVD-Video subpicture unit format:
//! run-length-coded four-color bitmaps with interleaved control
//! sequences for timing, palette, alpha and placement.
//!
//! ### Stream Organization
//!
//! **External Structure**: SPU packets delivered as arbitrary
//! fragments, each packet carrying its total size in its first word.
//! **Internal Structure**: a pixel-data region holding two interlaced
//! RLE fields, followed by a chain of dated control sequences.
//!
//! ### Content Filtering
//!
//! Decoded subpictures can be handed to an external text recognizer;
//! recognized text is matched against a deny list to mute the audio
//! for the subtitle's display window, and pre-authored edit lists can
//! mute or skip arbitrary spans of the presentation.
//!
//! ## Quick Start
//!
//! Steps for processing a subpicture stream:
//!
//! 1. Reassemble packets from fragments using
//!    [`process::assemble::Assembler`]
//! 2. Parse and render packets into subpictures using
//!    [`process::parse::SpuParser`]
//! 3. Optionally recognize and filter text using
//!    [`filter::ocr::TextExtractor`] and [`filter::words::WordFilter`]
//!
//! ```rust,no_run
//! use dvdspu::process::{assemble::Assembler, parse::SpuParser};
//!
//! let mut assembler = Assembler::default();
//! let mut parser = SpuParser::default();
//!
//! // Push fragments as the host delivers them
//! let fragment: &[u8] = &[];
//! assembler.push_fragment(fragment, Some(0));
//!
//! // Process packets with error recovery
//! for packet_result in assembler {
//!     match packet_result {
//!         Ok(packet) => {
//!             let subpicture = parser.parse(&packet)?;
//!             let region = &subpicture.region;
//!         }
//!         Err(assemble_error) => {
//!             // Stream resynchronizes automatically
//!             eprintln!("packet error: {assemble_error}");
//!         }
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Content filtering over decoded subpictures.
///
/// 1. **Recognition** ([`filter::ocr`]): Text extraction through an
///    external recognizer.
///
/// 2. **Word Matching** ([`filter::words`]): Deny-list matching of
///    recognized text.
///
/// 3. **Scheduling** ([`filter::schedule`]): Mute and skip execution
///    against live playback.
///
/// 4. **Logging** ([`filter::dump`]): SubRip dumps of recognized text.
pub mod filter;

/// Processing functionality for SPU streams.
///
/// 1. **Packet Assembly** ([`process::assemble`]): Reassembles packets
///    from host-delivered fragments using the declared packet size.
///
/// 2. **Parsing** ([`process::parse`]): Walks the control-sequence
///    chain into timing, palette and placement state.
///
/// 3. **RLE Expansion** ([`process::rle`]): Decodes the interlaced
///    pixel fields.
///
/// 4. **Rendering** ([`process::render`]): Produces the paletted image
///    region.
pub mod process;

/// Data structures representing SPU stream components.
///
/// - **Control Commands** ([`structs::command`]): Display-control opcodes
/// - **Subpictures** ([`structs::subpicture`]): Placement, pixel data and
///   rendered regions
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Nibble I/O** ([`utils::bits`]): Bounded 4-bit reads
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Media-time conversions
pub mod utils;
