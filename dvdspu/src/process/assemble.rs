use std::collections::VecDeque;
use std::sync::Arc;

use log::warn;

use crate::utils::errors::AssembleError;
use crate::utils::timing::Mtime;

/// Largest SPU packet the wire format can declare.
pub const MAX_SPU_SIZE: usize = 65536;

/// Reassembles SPU packets from host-delivered fragments.
///
/// A packet declares its total size in its first word; fragments are
/// accumulated until that many bytes are buffered. The presentation
/// timestamp of the fragment that opens a packet becomes the packet's
/// timestamp.
///
/// # Example
///
/// ```rust,no_run
/// use dvdspu::process::assemble::Assembler;
///
/// let mut assembler = Assembler::default();
/// assembler.push_fragment(&[0x00, 0x08, 0x00, 0x08, 0x01, 0x00, 0x02, 0xFF], Some(0));
///
/// for packet in &mut assembler {
///     let packet = packet.unwrap();
///     println!("packet of {} bytes at pts {}", packet.as_ref().len(), packet.pts);
/// }
/// ```
#[derive(Debug)]
pub struct Assembler {
    buffer: VecDeque<u8>,
    pts: Mtime,
    io_counter: usize,
    packets_processed: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_SPU_SIZE),
            pts: 0,
            io_counter: 0,
            packets_processed: 0,
        }
    }
}

impl Assembler {
    /// Adds one host fragment to the internal buffer.
    ///
    /// The timestamp is only honored on the fragment that starts a new
    /// packet; continuation fragments inherit the opener's timestamp.
    pub fn push_fragment(&mut self, data: &[u8], pts: Option<Mtime>) {
        if self.buffer.is_empty() {
            if let Some(pts) = pts {
                self.pts = pts;
            }
        }

        self.buffer.extend(data);
        self.io_counter += 1;
    }

    /// Drops any partially assembled packet, e.g. after a seek.
    pub fn flush(&mut self) {
        self.buffer.clear();
        self.io_counter = 0;
    }

    pub fn packets_processed(&self) -> usize {
        self.packets_processed
    }

    fn declared_size(&self) -> Option<usize> {
        Some(u16::from_be_bytes([*self.buffer.front()?, *self.buffer.get(1)?]) as usize)
    }

    fn iter_insufficient(&mut self) -> Option<Result<RawPacket, AssembleError>> {
        self.io_counter = 0;
        Some(Err(AssembleError::InsufficientData))
    }
}

impl Iterator for Assembler {
    type Item = Result<RawPacket, AssembleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.io_counter == 0 {
            return None;
        }

        if self.buffer.len() < 4 {
            return self.iter_insufficient();
        }

        let Some(spu_size) = self.declared_size() else {
            return self.iter_insufficient();
        };

        if spu_size < 5 {
            // The declared size cannot even hold the two header words
            // plus an end command. Drop the buffer and wait for the
            // next packet boundary.
            warn!("dropping {} buffered bytes on runt SPU packet", self.buffer.len());
            self.buffer.clear();
            return Some(Err(AssembleError::RuntPacket(spu_size)));
        }

        if self.buffer.len() < spu_size {
            return self.iter_insufficient();
        }

        let data: Arc<[u8]> = self.buffer.drain(..spu_size).collect::<Vec<_>>().into();

        self.packets_processed += 1;
        Some(Ok(RawPacket {
            pts: self.pts,
            data,
        }))
    }
}

/// A single reassembled SPU packet.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub pts: Mtime,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[test]
fn fragments_reassemble() -> anyhow::Result<()> {
    let mut assembler = Assembler::default();

    // 16-byte packet split across three fragments.
    let mut packet = vec![0x00, 0x10, 0x00, 0x08];
    packet.resize(16, 0x00);

    assembler.push_fragment(&packet[..6], Some(90_000));
    assert!(matches!(
        assembler.next(),
        Some(Err(AssembleError::InsufficientData))
    ));
    assert!(assembler.next().is_none());

    assembler.push_fragment(&packet[6..10], Some(123));
    assembler.push_fragment(&packet[10..], None);

    let out = assembler.next().unwrap()?;
    assert_eq!(out.as_ref(), &packet[..]);
    assert_eq!(out.pts, 90_000);

    assert!(matches!(
        assembler.next(),
        Some(Err(AssembleError::InsufficientData))
    ));

    Ok(())
}

#[test]
fn back_to_back_packets() -> anyhow::Result<()> {
    let mut assembler = Assembler::default();

    let mut stream = vec![0x00, 0x06, 0x00, 0x06, 0xFF, 0xFF];
    stream.extend_from_slice(&[0x00, 0x05, 0x00, 0x05, 0xFF]);
    assembler.push_fragment(&stream, Some(1_000_000));

    let first = assembler.next().unwrap()?;
    assert_eq!(first.as_ref().len(), 6);

    let second = assembler.next().unwrap()?;
    assert_eq!(second.as_ref().len(), 5);
    assert_eq!(second.pts, 1_000_000);

    Ok(())
}

#[test]
fn runt_packet_resyncs() {
    let mut assembler = Assembler::default();

    assembler.push_fragment(&[0x00, 0x02, 0xAA, 0xBB, 0xCC], Some(0));

    assert!(matches!(
        assembler.next(),
        Some(Err(AssembleError::RuntPacket(2)))
    ));

    // Buffer was dropped; a fresh packet assembles cleanly.
    assembler.push_fragment(&[0x00, 0x05, 0x00, 0x05, 0xFF], Some(42));
    let packet = assembler.next().unwrap().unwrap();
    assert_eq!(packet.pts, 42);
}
