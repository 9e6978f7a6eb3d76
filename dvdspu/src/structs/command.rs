use crate::structs::subpicture::SpuProperties;
use crate::utils::errors::ParseError;

pub const CMD_FORCE_DISPLAY: u8 = 0x00;
pub const CMD_START_DISPLAY: u8 = 0x01;
pub const CMD_STOP_DISPLAY: u8 = 0x02;
pub const CMD_SET_PALETTE: u8 = 0x03;
pub const CMD_SET_ALPHA: u8 = 0x04;
pub const CMD_SET_COORDINATES: u8 = 0x05;
pub const CMD_SET_OFFSETS: u8 = 0x06;
pub const CMD_END: u8 = 0xFF;

/// One command from an SPU control sequence.
///
/// The display delay is not carried here; it comes from the enclosing
/// sequence header and applies to every command in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ForceDisplay,
    StartDisplay,
    StopDisplay,
    /// Palette indices per color class, class 0 first.
    SetPalette([u8; 4]),
    /// Alpha nibbles per color class, class 0 first.
    SetAlpha([u8; 4]),
    SetCoordinates(SpuProperties),
    /// Raw even/odd field offsets as carried on the wire (relative to
    /// the packet start, not yet rebased onto the pixel data region).
    SetOffsets([usize; 2]),
    End,
    /// Opcode outside the known set; the index is left on the opcode so
    /// the caller can decide whether resynchronization is possible.
    Unknown(u8),
}

impl ControlCommand {
    /// Decodes the command at `index`, returning it together with the
    /// index of the first byte past its operands.
    pub fn read(packet: &[u8], spu_size: usize, index: usize) -> Result<(Self, usize), ParseError> {
        if index >= spu_size {
            return Err(ParseError::ScanPastEnd {
                index,
                size: spu_size,
            });
        }

        let opcode = packet[index];

        let operand_len = match opcode {
            CMD_SET_PALETTE | CMD_SET_ALPHA => 2,
            CMD_SET_COORDINATES => 6,
            CMD_SET_OFFSETS => 4,
            _ => 0,
        };

        if index + operand_len + 1 > spu_size {
            return Err(ParseError::CommandOverflow {
                cmd: opcode,
                offset: index,
            });
        }

        let operands = &packet[index + 1..index + 1 + operand_len];
        let next = index + 1 + operand_len;

        let command = match opcode {
            CMD_FORCE_DISPLAY => Self::ForceDisplay,
            CMD_START_DISPLAY => Self::StartDisplay,
            CMD_STOP_DISPLAY => Self::StopDisplay,
            CMD_SET_PALETTE => Self::SetPalette(class_nibbles(operands)),
            CMD_SET_ALPHA => Self::SetAlpha(class_nibbles(operands)),
            CMD_SET_COORDINATES => Self::SetCoordinates(read_coordinates(operands)),
            CMD_SET_OFFSETS => Self::SetOffsets([
                u16::from_be_bytes([operands[0], operands[1]]) as usize,
                u16::from_be_bytes([operands[2], operands[3]]) as usize,
            ]),
            CMD_END => Self::End,
            _ => return Ok((Self::Unknown(opcode), index)),
        };

        Ok((command, next))
    }
}

/// Unpacks two operand bytes into per-class values, class 0 in the low
/// nibble of the second byte.
fn class_nibbles(operands: &[u8]) -> [u8; 4] {
    [
        operands[1] & 0x0F,
        operands[1] >> 4,
        operands[0] & 0x0F,
        operands[0] >> 4,
    ]
}

/// Coordinates are packed as `xxxXXXyyyYYY`, three nibbles per value,
/// inclusive start/end columns and rows.
fn read_coordinates(operands: &[u8]) -> SpuProperties {
    let x = (operands[0] as usize) << 4 | (operands[1] >> 4) as usize;
    let x_end = ((operands[1] & 0x0F) as usize) << 8 | operands[2] as usize;
    let y = (operands[3] as usize) << 4 | (operands[4] >> 4) as usize;
    let y_end = ((operands[4] & 0x0F) as usize) << 8 | operands[5] as usize;

    SpuProperties {
        x,
        y,
        width: (x_end + 1).saturating_sub(x),
        height: (y_end + 1).saturating_sub(y),
    }
}
