//! Supporting infrastructure: nibble-level reading, error types,
//! and presentation-time helpers.

pub mod bits;
pub mod errors;
pub mod timing;
