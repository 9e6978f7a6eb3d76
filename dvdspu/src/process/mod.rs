/// Packet reassembly from host-delivered fragments.
///
/// Provides the [`Assembler`](assemble::Assembler) for accumulating
/// fragments into complete [`RawPacket`](assemble::RawPacket) objects.
pub mod assemble;

/// Control-sequence parsing and the decode facade.
///
/// Provides the [`SpuParser`](parse::SpuParser) for turning raw packets
/// into [`Subpicture`](crate::structs::subpicture::Subpicture) objects.
pub mod parse;

/// Run-length expansion of the interlaced pixel fields.
pub mod rle;

/// Mapping of decoded codes to a paletted image region.
pub mod render;
