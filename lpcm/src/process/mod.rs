/// PES envelope extraction.
///
/// Provides the [`PesExtractor`](extract::PesExtractor) for reading
/// [`PesPacket`](extract::PesPacket)s out of program stream or bare PES bytes.
pub mod extract;

/// Access unit collation.
///
/// Provides the [`Collator`](collate::Collator) state machine that turns PES
/// packets into [`CollatedFrame`](collate::CollatedFrame)s of globbed access
/// units.
pub mod collate;

/// Collated frame validation and timing.
///
/// Provides the [`FrameParser`](parse::FrameParser) producing
/// [`ParsedFrame`](parse::ParsedFrame)s with stream parameters and
/// presentation times.
pub mod parse;
