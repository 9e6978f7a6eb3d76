use anyhow::{Result, anyhow, bail};
use log::warn;

use crate::log_or_err;
use crate::process::assemble::RawPacket;
use crate::process::{render, rle};
use crate::structs::command::{CMD_END, ControlCommand};
use crate::structs::subpicture::{SpuProperties, Subpicture, SubpictureData};
use crate::utils::errors::ParseError;
use crate::utils::timing::{DEFAULT_DISPLAY_TIME, Mtime, SPU_DATE_SCALE};

/// Subpictures taller than this are assumed to be letterboxed
/// full-frame bitmaps and get the auto-crop treatment.
const AUTO_CROP_HEIGHT: usize = 250;

/// Decodes reassembled SPU packets into displayable subpictures.
///
/// Holds the per-session configuration: the 16-entry stream palette
/// announced by the container (if any) and the transparency switch.
///
/// ```rust,no_run
/// use dvdspu::process::assemble::Assembler;
/// use dvdspu::process::parse::SpuParser;
///
/// let mut assembler = Assembler::default();
/// let mut parser = SpuParser::default();
///
/// # let data: &[u8] = &[];
/// assembler.push_fragment(data, Some(0));
/// for packet in &mut assembler {
///     match packet {
///         Ok(packet) => {
///             let subpicture = parser.parse(&packet)?;
///             println!("subtitle at {}", subpicture.start_time);
///         }
///         Err(e) => eprintln!("assembly error: {e}"),
///     }
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SpuParser {
    state: ParserState,
}

#[derive(Debug)]
pub struct ParserState {
    pub fail_level: log::Level,
    /// Stream palette, Y/U/V per entry. Without it color roles are
    /// inferred from run-length statistics during RLE decoding.
    pub palette: Option<[[u8; 3]; 16]>,
    /// Ignore alpha commands and keep every class opaque but class 0.
    pub disable_transparency: bool,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            palette: None,
            disable_transparency: false,
        }
    }
}

impl SpuParser {
    pub fn with_palette(palette: [[u8; 3]; 16]) -> Self {
        Self {
            state: ParserState {
                palette: Some(palette),
                ..Default::default()
            },
        }
    }

    pub fn set_disable_transparency(&mut self, disable: bool) {
        self.state.disable_transparency = disable;
    }

    /// Sets the failure level for validation anomalies.
    ///
    /// - `log::Level::Error`: only fail on hard errors (default)
    /// - `log::Level::Warn`: fail on warnings too (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    /// Parses one packet into a rendered subpicture.
    ///
    /// Errors are per-packet: the caller drops the offending subtitle
    /// and continues with the next packet.
    pub fn parse(&mut self, packet: &RawPacket) -> Result<Subpicture> {
        let buf = packet.as_ref();

        if buf.len() < 4 {
            bail!(ParseError::CommandSequenceOverflow(0));
        }

        let spu_size = word_at(buf, 0);
        // The declared size must at least cover the two header words
        // plus an end command; anything smaller cannot be sliced.
        if spu_size < 5 {
            bail!(ParseError::DeclaredSizeTooSmall(spu_size));
        }
        if spu_size > buf.len() {
            bail!(ParseError::ScanPastEnd {
                index: spu_size,
                size: buf.len(),
            });
        }

        let control = parse_control(&self.state, &buf[..spu_size], packet.pts)?;

        let mut data = control.data;
        rle::decode(
            &self.state,
            &buf[4..spu_size],
            &mut data,
            &control.properties,
        )?;

        let region = render::render(&data, &control.properties);

        Ok(Subpicture {
            start_time: control.start_time,
            stop_time: control.stop_time,
            ephemeral: control.ephemeral,
            forced: control.forced,
            region,
        })
    }
}

/// Everything the control region yields for one packet.
#[derive(Debug, Default)]
struct ControlInfo {
    start_time: Mtime,
    stop_time: Mtime,
    ephemeral: bool,
    forced: bool,
    properties: SpuProperties,
    data: SubpictureData,
}

/// Walks the date-stamped command sequences following the pixel data.
///
/// Palette and alpha are only taken from the sequence that also carried
/// the field offsets; that sequence is the one authoritative for the
/// RLE data (a quirk of the format, not an option).
fn parse_control(state: &ParserState, packet: &[u8], pts: Mtime) -> Result<ControlInfo> {
    let spu_size = packet.len();

    let mut info = ControlInfo::default();
    let mut start_time: Option<Mtime> = None;

    // Working state for the current command block. Palette and alpha
    // accumulate here and only land in `info.data` at the End of the
    // block that carried SetOffsets.
    let mut block_yuv = [[0u8; 3]; 4];
    let mut block_alpha = [0u8; 4];
    let mut block_has_palette = false;
    let mut block_has_alpha = false;
    let mut block_has_offsets = false;

    let mut raw_offsets: [i64; 2] = [-1, -1];

    let mut cur_seq = 0usize;
    let mut next_seq = 0usize;
    let mut command = ControlCommand::End;
    let mut date: Mtime = 0;

    // The control region starts where the size word says the pixel
    // data ends.
    let mut index = word_at(packet, 2);

    while index < spu_size {
        // A finished sequence is followed by the next sequence header;
        // otherwise keep consuming commands of the current one.
        if command == ControlCommand::End {
            if index + 4 > spu_size {
                bail!(ParseError::CommandSequenceOverflow(index));
            }

            block_has_alpha = false;
            block_has_offsets = false;

            date = word_at(packet, index) as Mtime * SPU_DATE_SCALE;

            cur_seq = index;
            next_seq = word_at(packet, index + 2);

            if next_seq > spu_size {
                bail!(ParseError::NextSequenceOverflow {
                    next: next_seq,
                    size: spu_size,
                });
            }

            index += 4;
        }

        let (cmd, next_index) = ControlCommand::read(packet, spu_size, index)?;
        command = cmd;
        index = next_index;

        match cmd {
            ControlCommand::ForceDisplay => {
                // Menu highlight over a still frame, not a subtitle.
                start_time = Some(pts + date);
                info.ephemeral = true;
                info.forced = true;
            }

            ControlCommand::StartDisplay => {
                start_time = Some(pts + date);
            }

            ControlCommand::StopDisplay => {
                info.stop_time = pts + date;
            }

            ControlCommand::SetPalette(indices) => {
                if let Some(palette) = &state.palette {
                    block_has_palette = true;
                    for (class, &idx) in indices.iter().enumerate() {
                        block_yuv[class] = palette[(idx & 0x0F) as usize];
                    }
                }
            }

            ControlCommand::SetAlpha(alpha) => {
                if !state.disable_transparency {
                    block_has_alpha = true;
                    block_alpha = alpha;
                }
            }

            ControlCommand::SetCoordinates(properties) => {
                info.properties = properties;
                if properties.height > AUTO_CROP_HEIGHT {
                    info.data.auto_crop = true;
                }
            }

            ControlCommand::SetOffsets(words) => {
                block_has_offsets = true;
                raw_offsets = [words[0] as i64 - 4, words[1] as i64 - 4];
            }

            ControlCommand::End => {
                if block_has_offsets {
                    info.data.has_palette = block_has_palette;
                    if block_has_palette {
                        info.data.yuv = block_yuv;
                    }
                    if block_has_alpha {
                        info.data.alpha = block_alpha;
                    }
                }
            }

            ControlCommand::Unknown(opcode) => {
                warn!("unknown SPU command {opcode:#04X}");

                if index + 1 < next_seq {
                    if packet[next_seq - 1] == CMD_END {
                        // The declared next sequence is terminated
                        // consistently; skip ahead to it.
                        index = next_seq;
                        command = ControlCommand::End;
                        continue;
                    }

                    bail!(ParseError::UnrecoverableCommand(opcode));
                }

                // This was the last sequence; stop parsing as if an
                // End command had been met.
                command = ControlCommand::End;
                index += 1;
            }
        }

        if command == ControlCommand::End && index != next_seq {
            break;
        }
    }

    // The last sequence header points at itself; anything else means
    // the walk and the declared chain disagree.
    if next_seq != cur_seq {
        bail!(ParseError::SequenceIndexMismatch {
            next: next_seq,
            current: cur_seq,
        });
    }

    if index > spu_size {
        bail!(ParseError::ScanPastEnd {
            index,
            size: spu_size,
        });
    }

    let rle_area = spu_size as i64 - 4;
    if raw_offsets.iter().any(|&off| off < 0 || off >= rle_area) {
        bail!(ParseError::InvalidRleOffsets(raw_offsets[0], raw_offsets[1]));
    }
    info.data.field_offsets = [raw_offsets[0] as usize, raw_offsets[1] as usize];

    let Some(start) = start_time else {
        bail!(ParseError::MissingStartDisplay);
    };
    info.start_time = start;

    if info.stop_time <= info.start_time && !info.ephemeral {
        // No stop scheduled; the subtitle lives until replaced or for
        // the default display time.
        info.stop_time = info.start_time + DEFAULT_DISPLAY_TIME;
        info.ephemeral = true;
    }

    if spu_size > index + 1 {
        log_or_err!(
            state,
            log::Level::Warn,
            anyhow!(ParseError::ExcessPadding(spu_size - index))
        );
    }

    Ok(info)
}

fn word_at(packet: &[u8], index: usize) -> usize {
    u16::from_be_bytes([packet[index], packet[index + 1]]) as usize
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::process::assemble::RawPacket;

    /// Builds a packet with a 4x2 bitmap (row 0 class 1, row 1 class 2)
    /// and two command sequences: coordinates/offsets/start at date 0,
    /// stop at date `stop_date`.
    pub(crate) fn small_packet(stop_date: u16) -> RawPacket {
        let mut buf = vec![
            0x00, 0x1E, // total size 30
            0x00, 0x06, // control region at 6
            0x11, // even field: run of 4 in class 1
            0x12, // odd field: run of 4 in class 2
        ];

        // First sequence at 6, next at 24.
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x18]);
        buf.extend_from_slice(&[0x05, 0x00, 0x00, 0x03, 0x00, 0x00, 0x01]); // 4x2 at (0,0)
        buf.extend_from_slice(&[0x06, 0x00, 0x04, 0x00, 0x05]); // fields at 0 and 1
        buf.extend_from_slice(&[0x01, 0xFF]);

        // Final sequence at 24 points at itself.
        buf.extend_from_slice(&[stop_date.to_be_bytes()[0], stop_date.to_be_bytes()[1]]);
        buf.extend_from_slice(&[0x00, 0x18]);
        buf.extend_from_slice(&[0x02, 0xFF]);

        assert_eq!(buf.len(), 30);

        RawPacket {
            pts: 1_000_000,
            data: buf.into(),
        }
    }

    #[test]
    fn control_round_trip() -> Result<()> {
        let packet = small_packet(50);
        let state = ParserState::default();

        let info = parse_control(&state, packet.as_ref(), packet.pts)?;

        assert_eq!(info.start_time, 1_000_000);
        assert_eq!(info.stop_time, 1_000_000 + 50 * SPU_DATE_SCALE);
        assert!(!info.ephemeral);
        assert_eq!(
            info.properties,
            SpuProperties {
                x: 0,
                y: 0,
                width: 4,
                height: 2,
            }
        );
        assert_eq!(info.data.field_offsets, [0, 1]);
        assert!(!info.data.has_palette);
        assert_eq!(info.data.alpha, [0x00, 0x0F, 0x0F, 0x0F]);

        Ok(())
    }

    #[test]
    fn missing_stop_defaults_to_five_seconds() -> Result<()> {
        let mut buf = small_packet(50).data.to_vec();
        // Replace the stop command with a no-op force-less end.
        buf[28] = 0xFF;
        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState::default();
        let info = parse_control(&state, packet.as_ref(), packet.pts)?;

        assert!(info.ephemeral);
        assert_eq!(info.stop_time, info.start_time + DEFAULT_DISPLAY_TIME);

        Ok(())
    }

    #[test]
    fn sequence_index_mismatch_is_fatal() {
        let mut buf = small_packet(50).data.to_vec();
        // Final sequence no longer points at itself.
        buf[26] = 0x00;
        buf[27] = 0x06;
        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState::default();
        let err = parse_control(&state, packet.as_ref(), packet.pts).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::SequenceIndexMismatch { .. })
        ));
    }

    #[test]
    fn missing_start_display_is_fatal() {
        let mut buf = small_packet(50).data.to_vec();
        // Start display becomes a stop display.
        buf[22] = 0x02;
        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState::default();
        let err = parse_control(&state, packet.as_ref(), packet.pts).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::MissingStartDisplay)
        ));
    }

    #[test]
    fn offsets_out_of_range_are_fatal() {
        let mut buf = small_packet(50).data.to_vec();
        // Even field offset points past the pixel data region.
        buf[18] = 0xFF;
        buf[19] = 0xFF;
        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState::default();
        let err = parse_control(&state, packet.as_ref(), packet.pts).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::InvalidRleOffsets(..))
        ));
    }

    #[test]
    fn unknown_command_resyncs_to_terminated_sequence() -> Result<()> {
        let mut buf = small_packet(50).data.to_vec();
        // Corrupt the start-display command; the next sequence ends
        // with a valid End marker, so parsing skips ahead to it.
        buf[22] = 0x99;
        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState::default();
        let err = parse_control(&state, packet.as_ref(), packet.pts).unwrap_err();

        // The skipped block carried StartDisplay, so the walk now ends
        // without one; resynchronization itself succeeded.
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::MissingStartDisplay)
        ));

        Ok(())
    }

    #[test]
    fn palette_applies_from_offset_block() -> Result<()> {
        let mut palette = [[0u8; 3]; 16];
        palette[1] = [0x10, 0x20, 0x30];
        palette[2] = [0x40, 0x50, 0x60];

        // Extend the first sequence with a palette command mapping
        // classes 3..0 to entries 1, 1, 2, 2.
        let mut buf = vec![
            0x00, 0x21, // total size 33
            0x00, 0x06, // control region at 6
            0x10, 0x20,
        ];
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x1B]);
        buf.extend_from_slice(&[0x05, 0x00, 0x00, 0x03, 0x00, 0x00, 0x01]);
        buf.extend_from_slice(&[0x06, 0x00, 0x04, 0x00, 0x05]);
        buf.extend_from_slice(&[0x03, 0x11, 0x22]);
        buf.extend_from_slice(&[0x01, 0xFF]);
        buf.extend_from_slice(&[0x00, 0x32, 0x00, 0x1B, 0x02, 0xFF]);
        assert_eq!(buf.len(), 33);

        let packet = RawPacket {
            pts: 0,
            data: buf.into(),
        };

        let state = ParserState {
            palette: Some(palette),
            ..Default::default()
        };
        let info = parse_control(&state, packet.as_ref(), packet.pts)?;

        assert!(info.data.has_palette);
        // Nibbles 1,1,2,2 land on classes 3,2,1,0.
        assert_eq!(info.data.yuv[3], [0x10, 0x20, 0x30]);
        assert_eq!(info.data.yuv[2], [0x10, 0x20, 0x30]);
        assert_eq!(info.data.yuv[1], [0x40, 0x50, 0x60]);
        assert_eq!(info.data.yuv[0], [0x40, 0x50, 0x60]);

        Ok(())
    }

    #[test]
    fn runt_declared_size_is_a_parse_error() {
        // Hosts may hand-build packets, so the parser cannot rely on
        // the assembler having screened the declared size.
        let packet = RawPacket {
            pts: 0,
            data: vec![0x00, 0x03, 0x00, 0x00].into(),
        };

        let mut parser = SpuParser::default();
        let err = parser.parse(&packet).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::DeclaredSizeTooSmall(3))
        ));
    }

    #[test]
    fn full_parse_produces_region() -> Result<()> {
        let packet = small_packet(50);
        let mut parser = SpuParser::default();

        let subpicture = parser.parse(&packet)?;
        let region = &subpicture.region;

        assert_eq!((region.width, region.height), (4, 2));
        assert_eq!(region.pixels, vec![1, 1, 1, 1, 2, 2, 2, 2]);
        // No palette: classes 1 and 2 tie on coverage, the later one
        // wins the border role and the other becomes the fill.
        assert_eq!(region.palette[2], [0x00, 0x80, 0x80, 0xFF]);
        assert_eq!(region.palette[1], [0xFF, 0x80, 0x80, 0xFF]);
        assert_eq!(region.palette[0][3], 0x00);

        Ok(())
    }
}
