use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, info};

use crate::log_or_err;
use crate::process::collate::CollatedFrame;
use crate::structs::header::{self, HeaderOptions, ParsedFrameHeader};
use crate::structs::tables;
use crate::structs::variant::StreamVariant;
use crate::utils::errors::FrameError;
use crate::utils::timing::{DEFAULT_SAMPLING_RATE, PlaybackClock, pts_to_us, samples_to_us};

/// Validated collated frame with decoder-facing parameters and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub header: ParsedFrameHeader,
    /// Set when the decoder has to be reconfigured before this frame.
    pub stream_parameters_changed: bool,
    pub sample_rate: u32,
    /// Samples per channel.
    pub sample_count: u32,
    pub drc_code: u8,
    /// Offset of the first access unit in the frame data.
    pub data_offset: usize,
    pub display_frame_index: u64,
    /// Presentation time in microseconds.
    pub playback_time: u64,
    /// Decode time in microseconds, when a decode latency is configured.
    pub decode_time: Option<u64>,
}

/// Re-validates collated frames and derives their presentation timing.
///
/// Frames carry a PES timestamp only when one of their units started a
/// packet with a PTS; other frames are stamped from the previous frame's time
/// and duration.
#[derive(Debug)]
pub struct FrameParser {
    variant: StreamVariant,
    options: HeaderOptions,
    decode_latency: Option<u32>,
    fail_level: log::Level,

    current: Option<ParsedFrameHeader>,
    clock: PlaybackClock,
    display_frame_index: u64,
}

impl FrameParser {
    pub fn new(variant: StreamVariant, options: HeaderOptions) -> Self {
        Self {
            variant,
            options,
            decode_latency: None,
            fail_level: log::Level::Error,
            current: None,
            clock: PlaybackClock::default(),
            display_frame_index: 0,
        }
    }

    /// Decoder latency in samples, used to derive decode times.
    pub fn set_decode_latency(&mut self, samples: Option<u32>) {
        self.decode_latency = samples;
    }

    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Forgets the stream parameters and the running clock.
    pub fn reset(&mut self) {
        self.current = None;
        self.clock.reset();
        self.display_frame_index = 0;
    }

    pub fn parse(&mut self, frame: &CollatedFrame) -> Result<ParsedFrame> {
        let data = frame.as_ref();
        let header = header::parse(self.variant, data, data.len() as u32, &self.options)
            .map_err(FrameError::from)?;

        let expected = header.frame_length_bytes as usize
            + tables::private_header_length(self.variant) as usize;
        if expected != data.len() {
            bail!(FrameError::LengthMismatch {
                buffer: data.len(),
                header: expected,
            });
        }

        let stream_parameters_changed = match &self.current {
            None => true,
            Some(current) => {
                !current.has_same_stream_parameters(&header)
                    || (self.variant == StreamVariant::SpdifIn
                        && current.number_of_samples != header.number_of_samples)
            }
        };

        if stream_parameters_changed {
            debug!(
                "New stream parameters: {} {} {} channels",
                header.sampling_freq_1, header.word_size_1, header.channel_count
            );
            self.current = Some(header);
        }

        let sample_rate = match header.sampling_freq_hz() {
            0 => {
                info!("Unknown sampling frequency, assuming {DEFAULT_SAMPLING_RATE} Hz");
                DEFAULT_SAMPLING_RATE
            }
            rate => rate,
        };
        let sample_count = header.number_of_samples;
        let duration = samples_to_us(sample_count as u64, sample_rate);

        let pts = frame.pts.map(pts_to_us);
        if let (Some(found), Some(expected)) = (pts, self.clock.expected()) {
            if found.abs_diff(expected) > duration {
                log_or_err!(
                    self,
                    Warn,
                    anyhow!(FrameError::TimestampJump { expected, found })
                );
            }
        }

        // the collator clock anchors streams that start without timestamps
        let anchor = match (pts, self.clock.expected()) {
            (None, None) => Some(pts_to_us(frame.playback_time)),
            _ => pts,
        };
        let playback_time = self.clock.stamp(anchor, duration).unwrap_or_default();

        let decode_time = self.decode_latency.map(|latency| {
            playback_time.saturating_sub(samples_to_us(
                latency as u64 + sample_count as u64,
                sample_rate,
            ))
        });

        let display_frame_index = self.display_frame_index;
        self.display_frame_index += 1;

        Ok(ParsedFrame {
            header,
            stream_parameters_changed,
            sample_rate,
            sample_count,
            drc_code: header.drc_code,
            data_offset: header.private_header_length as usize,
            display_frame_index,
            playback_time,
            decode_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::collate::{Collator, CollatorConfig};
    use crate::process::extract::PesPacket;
    use crate::structs::header::tests::{BD, SPDIFIN};

    fn collate(variant: StreamVariant, packets: &[PesPacket]) -> Result<Vec<CollatedFrame>> {
        let mut collator = Collator::new(variant, CollatorConfig::default());
        for packet in packets {
            collator.push_packet(packet)?;
        }
        collator.flush();

        Ok(collator.collect())
    }

    fn packet(pda: &[u8], elementary: usize, pts: Option<u64>) -> PesPacket {
        let mut payload = pda.to_vec();
        payload.resize(pda.len() + elementary, 0);

        PesPacket {
            stream_id: 0xBD,
            pts,
            dts: None,
            payload,
        }
    }

    #[test]
    fn parses_collated_frames() -> Result<()> {
        let packets = (0..6)
            .map(|i| packet(&BD, 192, (i == 0).then_some(9_000)))
            .collect::<Vec<_>>();
        let frames = collate(StreamVariant::BdHdmv, &packets)?;

        let mut parser = FrameParser::new(StreamVariant::BdHdmv, HeaderOptions::default());
        parser.set_decode_latency(Some(16));

        let first = parser.parse(&frames[0])?;
        assert!(first.stream_parameters_changed);
        assert_eq!(first.sample_rate, 48_000);
        assert_eq!(first.sample_count, 128);
        assert_eq!(first.data_offset, 4);
        assert_eq!(first.playback_time, 100_000);
        assert_eq!(first.decode_time, Some(100_000 - 3_000));
        assert_eq!(first.display_frame_index, 0);

        let second = parser.parse(&frames[1])?;
        assert!(!second.stream_parameters_changed);
        assert_eq!(second.sample_count, 64);
        assert_eq!(second.playback_time, 100_000 + 128 * 1_000 / 48);
        assert_eq!(second.display_frame_index, 1);

        Ok(())
    }

    #[test]
    fn rejects_inconsistent_length() -> Result<()> {
        let frames = collate(StreamVariant::BdHdmv, &[packet(&BD, 192, None)])?;
        let mut frame = frames[0].clone();
        frame.data.truncate(100);

        let mut parser = FrameParser::new(StreamVariant::BdHdmv, HeaderOptions::default());
        let err = parser.parse(&frame).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::LengthMismatch {
                buffer: 100,
                header: 196
            })
        ));

        Ok(())
    }

    #[test]
    fn spdifin_sample_count_change_is_new_parameters() -> Result<()> {
        let mut parser = FrameParser::new(StreamVariant::SpdifIn, HeaderOptions::default());

        let frames = collate(StreamVariant::SpdifIn, &[packet(&SPDIFIN, 384, None)])?;
        assert!(parser.parse(&frames[0])?.stream_parameters_changed);
        assert!(!parser.parse(&frames[0])?.stream_parameters_changed);

        // 96 samples per unit
        let mut longer = SPDIFIN;
        longer[0..2].copy_from_slice(&768u16.to_be_bytes());
        let frames = collate(StreamVariant::SpdifIn, &[packet(&longer, 768, None)])?;
        let parsed = parser.parse(&frames[0])?;
        assert!(parsed.stream_parameters_changed);
        assert_eq!(parsed.sample_count, 96);

        Ok(())
    }

    #[test]
    fn timestamps_fall_back_to_collator_clock() -> Result<()> {
        let packets = (0..5).map(|_| packet(&BD, 192, None)).collect::<Vec<_>>();
        let frames = collate(StreamVariant::BdHdmv, &packets)?;

        let mut parser = FrameParser::new(StreamVariant::BdHdmv, HeaderOptions::default());
        assert_eq!(parser.parse(&frames[0])?.playback_time, 0);
        assert_eq!(parser.parse(&frames[1])?.playback_time, 4 * 32 * 1_000_000 / 48_000);

        Ok(())
    }

    #[test]
    fn strict_mode_rejects_timestamp_jumps() -> Result<()> {
        let packets = (0..5)
            .map(|i| packet(&BD, 192, Some(if i == 4 { 900_000 } else { i * 450 })))
            .collect::<Vec<_>>();
        let frames = collate(StreamVariant::BdHdmv, &packets)?;

        let mut parser = FrameParser::new(StreamVariant::BdHdmv, HeaderOptions::default());
        parser.set_fail_level(log::Level::Warn);

        parser.parse(&frames[0])?;
        assert!(parser.parse(&frames[1]).is_err());

        parser.reset();
        parser.set_fail_level(log::Level::Error);
        parser.parse(&frames[0])?;
        assert_eq!(parser.parse(&frames[1])?.playback_time, 10_000_000);

        Ok(())
    }
}
