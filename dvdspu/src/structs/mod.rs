//! Data structures representing SPU stream components.
//!
//! Contains structured representations of control commands, bitmap
//! placement, decoded pixel data, and the rendered subpicture handed to
//! display and recognition consumers.

pub mod command;
pub mod subpicture;
