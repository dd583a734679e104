//! Data structures representing LPCM stream components.
//!
//! Contains the stream variant and header code enumerations, the per-variant
//! constant tables and the private data area parser shared by the collator
//! and the frame parser.

pub mod header;
pub mod tables;
pub mod variant;
