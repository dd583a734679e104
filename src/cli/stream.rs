use anyhow::Result;
use log::Level;
use lpcm::process::collate::{CollatedFrame, Collator};
use lpcm::process::extract::PesExtractor;
use lpcm::process::parse::{FrameParser, ParsedFrame};
use lpcm::structs::variant::StreamVariant;
use lpcm::utils::errors::ExtractError;

use super::command::{Cli, StreamArgs};

/// Extractor, collator and frame parser wired together for the commands.
pub struct StreamPipeline {
    variant: StreamVariant,
    extractor: PesExtractor,
    collator: Collator,
    parser: FrameParser,
    strict: bool,
    dropped_frames: usize,
}

impl StreamPipeline {
    pub fn new(args: &StreamArgs, cli: &Cli) -> Self {
        let variant = StreamVariant::from(args.variant);

        let mut extractor = PesExtractor::default();
        extractor.set_stream_id(Some(args.stream_id));
        extractor.set_sub_stream(args.sub_stream_filter());

        let mut collator = Collator::new(variant, args.collator_config());
        let mut parser = FrameParser::new(variant, args.header_options());
        parser.set_decode_latency(args.decode_latency);

        // Configure fail level based on strict mode
        let fail_level = if cli.strict {
            Level::Warn
        } else {
            Level::Error
        };
        collator.set_fail_level(fail_level);
        parser.set_fail_level(fail_level);

        Self {
            variant,
            extractor,
            collator,
            parser,
            strict: cli.strict,
            dropped_frames: 0,
        }
    }

    pub fn variant(&self) -> StreamVariant {
        self.variant
    }

    /// Feeds input bytes, handing every complete frame to `on_frame`.
    pub fn push_bytes<F>(&mut self, chunk: &[u8], mut on_frame: F) -> Result<()>
    where
        F: FnMut(&CollatedFrame, &ParsedFrame) -> Result<()>,
    {
        self.extractor.push_bytes(chunk);

        while let Some(packet_result) = self.extractor.next() {
            let packet = match packet_result {
                Ok(packet) => packet,
                Err(ExtractError::InsufficientData) => continue,
                Err(e) if self.strict => return Err(e.into()),
                Err(e) => {
                    log::warn!("Skipping PES packet: {e}");
                    continue;
                }
            };

            self.collator.push_packet(&packet)?;
            self.drain(&mut on_frame)?;
        }

        Ok(())
    }

    /// Emits the access units still held by the collator at end of input.
    pub fn finish<F>(&mut self, mut on_frame: F) -> Result<()>
    where
        F: FnMut(&CollatedFrame, &ParsedFrame) -> Result<()>,
    {
        self.collator.flush();
        self.drain(&mut on_frame)
    }

    fn drain<F>(&mut self, on_frame: &mut F) -> Result<()>
    where
        F: FnMut(&CollatedFrame, &ParsedFrame) -> Result<()>,
    {
        while let Some(frame) = self.collator.next() {
            match self.parser.parse(&frame) {
                Ok(parsed) => on_frame(&frame, &parsed)?,
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    log::warn!("Dropping collated frame: {e}");
                    self.dropped_frames += 1;
                }
            }
        }

        Ok(())
    }

    pub fn packets(&self) -> usize {
        self.extractor.packets_extracted()
    }

    pub fn bytes_skipped(&self) -> usize {
        self.extractor.bytes_skipped()
    }

    pub fn invalid_private_data(&self) -> usize {
        self.collator.invalid_private_data()
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }
}
