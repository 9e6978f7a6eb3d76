use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::structs::subpicture::Subpicture;
use crate::utils::timing::srt_time;

/// Writes recognized subtitles as numbered SubRip entries.
pub struct SubtitleLog<W: Write> {
    writer: W,
    index: usize,
}

impl SubtitleLog<std::fs::File> {
    /// Opens `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> SubtitleLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, index: 0 }
    }

    pub fn append(&mut self, subtitle: &Subpicture, text: &str) -> Result<()> {
        self.index += 1;
        writeln!(
            self.writer,
            "{}\n{} --> {}\n{}\n",
            self.index,
            srt_time(subtitle.start_time),
            srt_time(subtitle.stop_time),
            text.trim(),
        )?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::subpicture::Region;

    #[test]
    fn entries_are_numbered_srt_records() {
        let mut log = SubtitleLog::new(Vec::new());
        let subtitle = Subpicture {
            start_time: 1_000_000,
            stop_time: 2_500_000,
            ephemeral: false,
            forced: false,
            region: Region::default(),
        };

        log.append(&subtitle, "first line").unwrap();
        log.append(&subtitle, "  second line \n").unwrap();

        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(
            text,
            "1\n00:00:01,000 --> 00:00:02,500\nfirst line\n\n\
             2\n00:00:01,000 --> 00:00:02,500\nsecond line\n\n"
        );
    }
}
