//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, error types and presentation timing helpers
//! shared by the parsing and collation stages.

pub mod bitstream_io;
pub mod errors;
pub mod timing;
