use anyhow::{Result, anyhow, bail};

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::structs::subpicture::{SpuProperties, SubpictureData};
use crate::utils::bits::NibbleReader;
use crate::utils::errors::RleError;

/// Expands the interlaced run-length fields into a flat code buffer.
///
/// The two fields cover the even and odd scanlines and are decoded in
/// strict alternation, each with its own nibble cursor into `rle_data`
/// (the packet minus its 4-byte header). Codes pack `run << 2 | class`;
/// short codes stand for long runs, and a value under 0x0004 means the
/// rest of the line.
///
/// When `data.auto_crop` is set, leading and trailing scanlines that
/// consist of a single transparent full-width run are moved into the
/// top/bottom crop offsets instead of the displayed area.
pub fn decode(
    state: &ParserState,
    rle_data: &[u8],
    data: &mut SubpictureData,
    properties: &SpuProperties,
) -> Result<()> {
    let width = properties.width;
    let height = properties.height;

    let mut reader = NibbleReader::from_slice(rle_data);
    let limit = reader.limit();

    // Nibble cursors for the even and odd fields.
    let mut cursors = [
        (data.field_offsets[0] as u64) << 1,
        (data.field_offsets[1] as u64) << 1,
    ];

    data.codes = Vec::with_capacity(width.max(1) * height);

    // Cropping state.
    let mut empty_top = true;
    let mut skipped_top = 0usize;
    let mut skipped_bottom = 0usize;
    let mut transparent_code = 0u16;

    // Run totals per class for codes with nonzero alpha; feeds the
    // color-role inference when no palette was announced.
    let mut stats = [0usize; 4];

    for y in 0..height {
        let field = y & 1;

        if cursors[field] >= limit {
            log_or_err!(
                state,
                log::Level::Warn,
                anyhow!(RleError::RowShortfall { missing: height - y })
            );

            // Pad the missing rows with transparent full-width runs so
            // rendering still sees a structurally complete buffer.
            for _ in y..height {
                data.codes.push((width as u16) << 2);
            }
            break;
        }

        reader.seek(cursors[field])?;

        let mut x = 0usize;
        while x < width {
            let mut code: u32 = 0;
            let mut min = 0x1u32;
            while min <= 0x40 && code < min {
                let nibble = match reader.next_nibble() {
                    Ok(nibble) => nibble,
                    Err(_) => bail!(RleError::CursorOutOfBounds {
                        cursor: reader.position().unwrap_or(limit) as usize,
                        limit: limit as usize,
                    }),
                };
                code = code << 4 | nibble as u32;
                min <<= 2;
            }

            if code < 0x0004 {
                // Rest of the line in the given class.
                code |= ((width - x) as u32) << 2;
            }

            let run = (code >> 2) as usize;
            let class = (code & 0x3) as usize;

            if run + x + y * width > height * width {
                bail!(RleError::PixelOverflow {
                    run,
                    x,
                    y,
                    width,
                    height,
                });
            }

            if data.alpha[class] != 0 {
                stats[class] += run;
            }

            let code = code as u16;

            if data.auto_crop {
                if y == 0 {
                    // A fully transparent first line names the
                    // transparent sentinel; anything else cancels the
                    // crop for the whole image.
                    if run == width && data.alpha[class] == 0 {
                        transparent_code = code;
                    } else {
                        data.auto_crop = false;
                    }
                }

                if data.auto_crop && code == transparent_code {
                    if empty_top {
                        skipped_top += 1;
                    } else {
                        // Might still be followed by visible rows, so
                        // keep the code and decide at the end.
                        data.codes.push(code);
                        skipped_bottom += 1;
                    }
                } else {
                    data.codes.push(code);
                    empty_top = false;
                    skipped_bottom = 0;
                }
            } else {
                data.codes.push(code);
            }

            x += run;
        }

        if x > width {
            bail!(RleError::PixelOverflow {
                run: x - width,
                x,
                y,
                width,
                height,
            });
        }

        // Byte-align the field cursor before its next scanline.
        reader.align_to_byte()?;
        cursors[field] = reader.position()?;
    }

    if skipped_top != 0 || skipped_bottom != 0 {
        data.top_offset = skipped_top;
        data.bottom_offset = skipped_bottom;
    }

    if !data.has_palette {
        infer_color_roles(data, &mut stats);
    }

    Ok(())
}

/// Picks border, inner, and shade classes from the run statistics and
/// assigns them canonical YUV values. Best effort: the true colors are
/// not recoverable without a stream palette.
fn infer_color_roles(data: &mut SubpictureData, stats: &mut [usize; 4]) {
    let largest = |stats: &[usize; 4]| {
        let (class, &total) = stats
            .iter()
            .enumerate()
            .max_by_key(|&(_, &total)| total)
            .unwrap_or((0, &0));
        (total > 0).then_some(class)
    };

    // Outline first: the most-covered visible class.
    if let Some(border) = largest(stats) {
        data.yuv[border] = [0x00, 0x80, 0x80];
        stats[border] = 0;
    }

    if let Some(inner) = largest(stats) {
        data.yuv[inner] = [0xFF, 0x80, 0x80];
        stats[inner] = 0;
    }

    if let Some(shade) = largest(stats) {
        data.yuv[shade] = [0x80, 0x80, 0x80];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_fields(
        even: &[u8],
        odd: &[u8],
        width: usize,
        height: usize,
        auto_crop: bool,
    ) -> Result<SubpictureData> {
        let mut rle_data = even.to_vec();
        rle_data.extend_from_slice(odd);

        let mut data = SubpictureData {
            field_offsets: [0, even.len()],
            auto_crop,
            ..Default::default()
        };
        let properties = SpuProperties {
            x: 0,
            y: 0,
            width,
            height,
        };

        let state = ParserState::default();
        decode(&state, &rle_data, &mut data, &properties)?;

        Ok(data)
    }

    fn runs(data: &SubpictureData) -> Vec<(usize, usize)> {
        data.codes
            .iter()
            .map(|&code| ((code >> 2) as usize, (code & 3) as usize))
            .collect()
    }

    #[test]
    fn exact_runs_fill_the_bitmap() -> Result<()> {
        // 8x2: even row = 4 px class 1 + 4 px class 2, odd row = 8 px
        // class 3. Codes 0x11, 0x12, 0x23, two nibbles each.
        let data = decode_fields(&[0x11, 0x12], &[0x23], 8, 2, false)?;

        assert_eq!(runs(&data), vec![(4, 1), (4, 2), (8, 3)]);
        assert_eq!(data.top_offset, 0);
        assert_eq!(data.bottom_offset, 0);

        Ok(())
    }

    #[test]
    fn adaptive_code_widths() -> Result<()> {
        // One-, three-, and one-nibble codes on the same row: run 1
        // class 1 (0x5), run 24 class 1 (0x061), run 1 class 1 (0x5).
        let row = [0x50, 0x61, 0x50];
        let data = decode_fields(&row, &row, 26, 2, false)?;

        assert_eq!(
            runs(&data),
            vec![(1, 1), (24, 1), (1, 1), (1, 1), (24, 1), (1, 1)]
        );

        Ok(())
    }

    #[test]
    fn rest_of_line_code() -> Result<()> {
        // Four nibbles worth less than 0x0004 expand to the full row.
        let row = [0x00, 0x01];
        let data = decode_fields(&row, &row, 600, 2, false)?;

        assert_eq!(runs(&data), vec![(600, 1), (600, 1)]);

        Ok(())
    }

    #[test]
    fn pixel_overflow_is_fatal() {
        // 2x2 bitmap but a run of 4 on the first row.
        let err = decode_fields(&[0x12, 0x00], &[0x12, 0x00], 2, 2, false).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RleError>(),
            Some(RleError::PixelOverflow { .. })
        ));
    }

    #[test]
    fn cursor_overrun_is_fatal() {
        // Even field starts a 4-nibble code (three zero nibbles force
        // extension) that runs off the buffer.
        let err = decode_fields(&[0x00], &[], 8, 2, false).unwrap_err();

        // The diagnostic names the nibble where the data ran out.
        assert!(matches!(
            err.downcast_ref::<RleError>(),
            Some(RleError::CursorOutOfBounds {
                cursor: 2,
                limit: 2,
            })
        ));
    }

    #[test]
    fn row_shortfall_pads_remaining_rows() -> Result<()> {
        // Only the even field has data; the odd field offset points at
        // the end of the buffer.
        let mut data = SubpictureData {
            field_offsets: [0, 1],
            ..Default::default()
        };
        let properties = SpuProperties {
            x: 0,
            y: 0,
            width: 4,
            height: 2,
        };

        let state = ParserState::default();
        decode(&state, &[0x11], &mut data, &properties)?;

        assert_eq!(runs(&data), vec![(4, 1), (4, 0)]);

        Ok(())
    }

    #[test]
    fn auto_crop_trims_blank_edges() -> Result<()> {
        // 4x6, one rest-of-line code per row. Rows 0-1 and 4-5 are
        // transparent class 0, rows 2-3 are class 1.
        let even = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let odd = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00];

        let data = decode_fields(&even, &odd, 4, 6, true)?;

        assert_eq!(data.top_offset, 2);
        assert_eq!(data.bottom_offset, 2);
        // Rows 2..6 are stored; rows 0..2 were dropped outright.
        assert_eq!(runs(&data), vec![(4, 1), (4, 1), (4, 0), (4, 0)]);

        Ok(())
    }

    #[test]
    fn visible_first_row_cancels_auto_crop() -> Result<()> {
        let even = [0x11, 0x11];
        let odd = [0x11, 0x11];

        let data = decode_fields(&even, &odd, 4, 4, true)?;

        assert!(!data.auto_crop);
        assert_eq!(data.top_offset, 0);
        assert_eq!(data.bottom_offset, 0);
        assert_eq!(data.codes.len(), 4);

        Ok(())
    }

    #[test]
    fn color_roles_from_run_statistics() -> Result<()> {
        // 8x2: row 0 = 6 px class 1 + 2 px class 2, row 1 = 5 px class
        // 2 + 3 px class 3. Class 2 covers most, then class 1, then 3.
        let even = [0x19, 0xA0];
        let odd = [0x16, 0xF0];

        let data = decode_fields(&even, &odd, 8, 2, false)?;

        assert_eq!(data.yuv[2], [0x00, 0x80, 0x80]); // border
        assert_eq!(data.yuv[1], [0xFF, 0x80, 0x80]); // inner
        assert_eq!(data.yuv[3], [0x80, 0x80, 0x80]); // shade

        Ok(())
    }
}
