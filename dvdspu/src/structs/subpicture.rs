use crate::utils::timing::Mtime;

/// Placement and size of the decoded bitmap on the video plane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpuProperties {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Working state for one packet: control results plus the expanded
/// RLE codes.
///
/// `codes` holds `run << 2 | class` entries covering the bitmap rows
/// that survive auto-cropping at the top; rows provisionally skipped at
/// the bottom keep their codes, the crop offsets decide how much of the
/// buffer is displayed.
#[derive(Debug, Clone)]
pub struct SubpictureData {
    /// Even/odd field start offsets into the pixel data region.
    pub field_offsets: [usize; 2],
    pub codes: Vec<u16>,

    pub has_palette: bool,
    pub yuv: [[u8; 3]; 4],
    pub alpha: [u8; 4],

    pub auto_crop: bool,
    pub top_offset: usize,
    pub bottom_offset: usize,
}

impl Default for SubpictureData {
    fn default() -> Self {
        Self {
            field_offsets: [0; 2],
            codes: Vec::new(),
            has_palette: false,
            yuv: [[0; 3]; 4],
            // Class 0 is the background and starts out transparent.
            alpha: [0x00, 0x0F, 0x0F, 0x0F],
            auto_crop: false,
            top_offset: 0,
            bottom_offset: 0,
        }
    }
}

/// A rendered paletted image region.
///
/// `pixels` holds one color class per pixel in row-major order;
/// `palette` maps each class to Y, U, V and an 8-bit alpha.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub palette: [[u8; 4]; 4],
    pub pixels: Vec<u8>,
}

/// A fully decoded subpicture ready for display or recognition.
#[derive(Debug, Clone)]
pub struct Subpicture {
    pub start_time: Mtime,
    pub stop_time: Mtime,
    /// Set when the packet never scheduled its own stop; the subpicture
    /// lives until replaced (or for the default display time).
    pub ephemeral: bool,
    /// Forced display (menu highlight), not an ordinary subtitle.
    pub forced: bool,
    pub region: Region,
}
