//! Frame header parsing and access unit collation for Linear PCM audio
//! carried in MPEG PES packets.
//!
//! ## Technical Overview
//!
//! Five incompatible LPCM wire variants share the PES private_stream_1
//! envelope; each packet payload starts with a variant specific private data
//! area followed by raw sample bytes.
//!
//! | Variant   | Private data area | Sample rates            | Word sizes   |
//! |-----------|-------------------|-------------------------|--------------|
//! | DVD-Video | 7 bytes           | 48, 96 kHz              | 16, 20, 24   |
//! | DVD-Audio | 12+ bytes         | 44.1 to 192 kHz         | 16, 20, 24   |
//! | HD DVD    | 9 bytes           | 48 to 192 kHz           | 16, 20, 24   |
//! | BD HDMV   | 4 bytes           | 48, 96, 192 kHz         | 16, 20, 24   |
//! | S/PDIF in | 8 bytes           | 32 to 192 kHz           | 32           |
//!
//! Packet boundaries do not follow access unit boundaries. The collator
//! reassembles units split across packets and globs several small units into
//! one frame, each frame starting with a private data area rewritten to
//! describe exactly its own contents.
//!
//! ## Quick Start
//!
//! 1. Extract PES packets using [`process::extract::PesExtractor`]
//! 2. Collate access units into frames using [`process::collate::Collator`]
//! 3. Validate frames and derive timing using [`process::parse::FrameParser`]
//!
//! ```rust,no_run
//! use lpcm::process::{collate::Collator, collate::CollatorConfig, extract::PesExtractor, parse::FrameParser};
//! use lpcm::structs::{header::HeaderOptions, variant::StreamVariant};
//!
//! let variant = StreamVariant::DvdVideo;
//! let mut extractor = PesExtractor::default();
//! let mut collator = Collator::new(variant, CollatorConfig::default());
//! let mut parser = FrameParser::new(variant, HeaderOptions::default());
//!
//! extractor.push_bytes(&std::fs::read("VTS_01_1.VOB")?);
//!
//! for packet in extractor.by_ref().filter_map(Result::ok) {
//!     collator.push_packet(&packet)?;
//!
//!     for frame in collator.by_ref() {
//!         let parsed = parser.parse(&frame)?;
//!         println!("{} samples at {} us", parsed.sample_count, parsed.playback_time);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```

/// Processing stages for LPCM PES streams.
///
/// 1. **Extraction** ([`process::extract`]): PES packets from program streams.
///
/// 2. **Collation** ([`process::collate`]): Access units into decodable frames.
///
/// 3. **Parsing** ([`process::parse`]): Frame validation and timing.
pub mod process;

/// Data structures representing LPCM stream components.
///
/// - **Variants** ([`structs::variant`]): Stream variants and header codes
/// - **Tables** ([`structs::tables`]): Per-variant constants
/// - **Headers** ([`structs::header`]): Private data area parsing
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Clock conversions
pub mod utils;
