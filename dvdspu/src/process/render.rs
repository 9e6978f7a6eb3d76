use crate::structs::subpicture::{Region, SpuProperties, SubpictureData};

/// Maps the decoded code buffer to a paletted image region.
///
/// Pure transform: the alpha nibbles are widened to bytes by
/// replication and the crop offsets move the region down and shrink
/// it; nothing here touches a display sink.
pub fn render(data: &SubpictureData, properties: &SpuProperties) -> Region {
    let width = properties.width;
    let height = properties
        .height
        .saturating_sub(data.top_offset + data.bottom_offset);

    let mut palette = [[0u8; 4]; 4];
    for (class, entry) in palette.iter_mut().enumerate() {
        let [y, u, v] = data.yuv[class];
        *entry = [y, u, v, data.alpha[class] * 0x11];
    }

    let mut pixels = vec![0u8; width * height];
    let mut codes = data.codes.iter();

    'rows: for row in pixels.chunks_exact_mut(width.max(1)) {
        let mut x = 0;
        while x < width {
            let Some(&code) = codes.next() else {
                break 'rows;
            };

            let run = ((code >> 2) as usize).min(width - x);
            let class = (code & 0x3) as u8;

            row[x..x + run].fill(class);
            x += run.max(1);
        }
    }

    Region {
        x: properties.x,
        y: properties.y + data.top_offset,
        width,
        height,
        palette,
        pixels,
    }
}
