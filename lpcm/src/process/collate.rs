//! Access unit collation for LPCM PES streams.
//!
//! PES packets do not align with access units: a packet may start in the
//! middle of a unit, carry several units and end inside another one. The
//! [`Collator`] walks the elementary bytes of each packet, skips stuffing,
//! stitches split units back together and globs consecutive units of
//! identical format into a single [`CollatedFrame`] that starts with a
//! private data area describing exactly the units that follow it.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use log::Level::Warn;
use log::debug;

use crate::log_or_err;
use crate::process::extract::PesPacket;
use crate::structs::header::{self, HeaderOptions, ParsedFrameHeader};
use crate::structs::tables::{self, MAX_PRIVATE_HEADER_LENGTH, PES_PRIVATE_STREAM_1};
use crate::structs::variant::StreamVariant;
use crate::utils::errors::CollateError;
use crate::utils::timing::samples_to_ticks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollatorConfig {
    /// Expected PES stream id.
    pub stream_id: u8,
    /// Units per collated frame, overriding the per-variant threshold.
    pub glob_threshold: Option<u32>,
    pub header_options: HeaderOptions,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            stream_id: PES_PRIVATE_STREAM_1,
            glob_threshold: None,
            header_options: HeaderOptions::default(),
        }
    }
}

/// What to do with the next bytes of the current packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicePhase {
    SkipSubFrame,
    ReadSubFrame,
    GotCompleteFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceDecision {
    pub phase: SlicePhase,
    pub len: u32,
}

impl SliceDecision {
    fn skip(len: u32) -> Self {
        Self {
            phase: SlicePhase::SkipSubFrame,
            len,
        }
    }

    fn read(len: u32) -> Self {
        Self {
            phase: SlicePhase::ReadSubFrame,
            len,
        }
    }

    fn complete() -> Self {
        Self {
            phase: SlicePhase::GotCompleteFrame,
            len: 0,
        }
    }
}

/// Outcome of decoding a private data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateDataStatus {
    Unchanged,
    /// The decoder has to be reconfigured before the next frame.
    NewParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// No usable private data area seen since construction or the last
    /// discontinuity; the next one is used to skip to its first unit.
    #[default]
    AwaitingFirstPacket,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollatorState {
    pub stream_phase: StreamPhase,
    /// Decision returned by the last [`Collator::decide_next_slice`] call.
    pub phase: Option<SlicePhase>,

    pub current_header: ParsedFrameHeader,
    pub pending_header: ParsedFrameHeader,

    pub bytes_to_skip: u32,
    pub remaining_split_frame_bytes: u32,
    pub accumulated_frame_count: u32,
    pub globbed_frame_count_this_packet: u32,
    pub guessed_next_first_access_unit_pointer: u32,
    /// Presentation time of collated units in 90 kHz ticks.
    pub playback_time_accumulator: u64,

    pub is_private_data_valid: bool,
    pub is_private_data_new: bool,
    pub must_accumulate_private_data: bool,
}

impl CollatorState {
    fn new(variant: StreamVariant) -> Self {
        Self {
            stream_phase: StreamPhase::AwaitingFirstPacket,
            phase: None,
            current_header: ParsedFrameHeader::empty(variant),
            pending_header: ParsedFrameHeader::empty(variant),
            bytes_to_skip: 0,
            remaining_split_frame_bytes: 0,
            accumulated_frame_count: 0,
            globbed_frame_count_this_packet: 0,
            guessed_next_first_access_unit_pointer: 0,
            playback_time_accumulator: 0,
            is_private_data_valid: false,
            is_private_data_new: false,
            must_accumulate_private_data: false,
        }
    }
}

/// Globbed access units with the private data area describing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollatedFrame {
    pub data: Vec<u8>,
    /// Header in effect when the frame was started.
    pub header: ParsedFrameHeader,
    pub access_units: u32,
    pub number_of_samples: u32,
    /// Collator clock at the start of the frame, 90 kHz ticks.
    pub playback_time: u64,
    /// PES timestamp extrapolated back to the first unit of the frame.
    pub pts: Option<u64>,
    pub new_stream_parameters: bool,
}

impl AsRef<[u8]> for CollatedFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Default)]
struct FrameInProgress {
    data: Vec<u8>,
    header: Option<ParsedFrameHeader>,
    access_units: u32,
    number_of_samples: u32,
    playback_time: u64,
    pts: Option<u64>,
    new_stream_parameters: bool,
}

/// Bookkeeping of the last unit of a read, which may wait for its
/// continuation in the next packet. Earlier units of the same read are
/// complete and stay in the frame.
#[derive(Debug, Clone, Copy)]
struct SplitUnit {
    start: usize,
    number_of_samples: u32,
    only_unit_of_read: bool,
}

/// Per-stream collation state machine.
///
/// Packets are fed with [`push_packet`](Self::push_packet) and finished
/// frames are drained through the [`Iterator`] implementation. The lower
/// level [`handle_private_data_area`](Self::handle_private_data_area) and
/// [`decide_next_slice`](Self::decide_next_slice) operations are exposed for
/// callers that own the byte buffers themselves.
///
/// ```rust,no_run
/// use lpcm::process::collate::{Collator, CollatorConfig};
/// use lpcm::process::extract::PesExtractor;
/// use lpcm::structs::variant::StreamVariant;
///
/// let mut extractor = PesExtractor::default();
/// let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());
///
/// extractor.push_bytes(&std::fs::read("audio.pes")?);
/// for packet in extractor.by_ref().filter_map(Result::ok) {
///     collator.push_packet(&packet)?;
/// }
/// collator.flush();
///
/// for frame in collator {
///     println!("{} units, {} samples", frame.access_units, frame.number_of_samples);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Collator {
    variant: StreamVariant,
    config: CollatorConfig,
    fail_level: log::Level,
    state: CollatorState,

    private_data: [u8; MAX_PRIVATE_HEADER_LENGTH],
    frame: FrameInProgress,
    new_parameters_for_next_frame: bool,
    split_unit: Option<SplitUnit>,
    packet_pts: Option<u64>,
    frames: VecDeque<CollatedFrame>,

    invalid_private_data: usize,
}

impl Collator {
    pub fn new(variant: StreamVariant, config: CollatorConfig) -> Self {
        let mut collator = Self {
            variant,
            config,
            fail_level: log::Level::Error,
            state: CollatorState::new(variant),
            private_data: [0; MAX_PRIVATE_HEADER_LENGTH],
            frame: FrameInProgress::default(),
            new_parameters_for_next_frame: false,
            split_unit: None,
            packet_pts: None,
            frames: VecDeque::new(),
            invalid_private_data: 0,
        };
        collator.reset();

        collator
    }

    /// Returns the collator to its initial state, dropping partial and
    /// undrained frames.
    pub fn reset(&mut self) {
        self.state = CollatorState::new(self.variant);
        self.private_data = [0; MAX_PRIVATE_HEADER_LENGTH];
        self.frame = FrameInProgress::default();
        self.new_parameters_for_next_frame = false;
        self.split_unit = None;
        self.packet_pts = None;
        self.frames.clear();
    }

    /// Sets the failure level for absorbed private data errors.
    ///
    /// - `log::Level::Error`: invalid packets are logged and skipped (default)
    /// - `log::Level::Warn`: invalid packets fail [`push_packet`](Self::push_packet)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn variant(&self) -> StreamVariant {
        self.variant
    }

    pub fn state(&self) -> &CollatorState {
        &self.state
    }

    /// Number of private data areas rejected so far.
    pub fn invalid_private_data(&self) -> usize {
        self.invalid_private_data
    }

    /// Decodes the private data area of a new PES packet.
    ///
    /// `payload_len` is the number of elementary bytes following the fixed
    /// private data area. On error the rest of the packet is skipped and the
    /// stream resynchronises on the next valid area.
    pub fn handle_private_data_area(
        &mut self,
        bytes: &[u8],
        stream_id: u8,
        payload_len: u32,
    ) -> Result<PrivateDataStatus, CollateError> {
        if stream_id != self.config.stream_id {
            self.invalidate();
            return Err(CollateError::StreamIdMismatch {
                found: stream_id,
                expected: self.config.stream_id,
            });
        }

        let min_length = tables::private_header_length(self.variant);
        let parsed = match header::parse(
            self.variant,
            bytes,
            payload_len + min_length,
            &self.config.header_options,
        ) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.invalidate();
                return Err(e.into());
            }
        };

        let state = &mut self.state;
        state.is_private_data_valid = true;
        state.bytes_to_skip = parsed.private_header_length - min_length;

        let is_new = state.stream_phase == StreamPhase::AwaitingFirstPacket
            || !parsed.has_same_stream_parameters(&state.current_header);
        state.is_private_data_new = is_new;

        if self.variant.has_access_unit_pointer() {
            let guess = state.guessed_next_first_access_unit_pointer;
            if guess != 0 && guess != parsed.first_access_unit_pointer {
                debug!(
                    "First access unit pointer {} differs from expected {guess}",
                    parsed.first_access_unit_pointer
                );
                state.guessed_next_first_access_unit_pointer = 0;
            }

            let next = parsed.frame_length_bytes as i64 + parsed.first_access_unit_pointer as i64
                - payload_len as i64;
            state.guessed_next_first_access_unit_pointer = u32::try_from(next).unwrap_or(0);
        }

        state.pending_header = parsed;

        let length = min_length as usize;
        self.private_data[..length].copy_from_slice(&bytes[..length]);
        header::normalize_private_data(self.variant, &mut self.private_data[..length])?;

        Ok(if is_new {
            PrivateDataStatus::NewParameters
        } else {
            PrivateDataStatus::Unchanged
        })
    }

    /// Decides how the next bytes of the current packet are handled.
    ///
    /// `remaining` is the number of elementary bytes of the packet not yet
    /// consumed. A [`SlicePhase::GotCompleteFrame`] decision consumes nothing
    /// and queues the finished frame.
    pub fn decide_next_slice(&mut self, remaining: u32) -> SliceDecision {
        let decision = self.next_slice(remaining);
        self.state.phase = Some(decision.phase);

        debug!(
            "{:?} {} of {remaining} bytes, {} units accumulated",
            decision.phase, decision.len, self.state.accumulated_frame_count
        );

        decision
    }

    fn next_slice(&mut self, remaining: u32) -> SliceDecision {
        let offset = tables::first_access_unit_offset(self.variant);

        if self.state.stream_phase == StreamPhase::AwaitingFirstPacket
            && self.state.is_private_data_valid
        {
            let state = &mut self.state;
            let pending = &state.pending_header;
            let len = state.bytes_to_skip + pending.first_access_unit_pointer + offset
                - pending.private_header_length;

            state.bytes_to_skip = 0;
            state.stream_phase = StreamPhase::Streaming;

            return SliceDecision::skip(len.min(remaining));
        }

        if self.state.must_accumulate_private_data {
            self.start_frame();
            self.state.must_accumulate_private_data = false;
        }

        if !self.state.is_private_data_valid {
            return SliceDecision::skip(remaining);
        }

        if self.state.bytes_to_skip > 0 {
            let len = self.state.bytes_to_skip.min(remaining);
            self.state.bytes_to_skip -= len;

            return SliceDecision::skip(len);
        }

        if self.state.remaining_split_frame_bytes > 0 {
            let len = self.state.remaining_split_frame_bytes.min(remaining);
            self.state.remaining_split_frame_bytes -= len;

            if self.state.remaining_split_frame_bytes == 0 {
                self.split_unit = None;
            }

            return SliceDecision::read(len);
        }

        if self.state.accumulated_frame_count >= self.glob_threshold()
            || self.state.is_private_data_new
        {
            self.complete_frame();
            return SliceDecision::complete();
        }

        debug_assert!(
            self.state.bytes_to_skip == 0 && self.state.remaining_split_frame_bytes == 0,
            "new access unit while stuffing or a split unit is pending"
        );

        let pending = self.state.pending_header;
        if pending.frame_length_bytes == 0 {
            return SliceDecision::skip(remaining);
        }

        self.begin_units(&pending);

        if remaining < pending.frame_length_bytes {
            self.state.remaining_split_frame_bytes = pending.frame_length_bytes - remaining;
            SliceDecision::read(remaining)
        } else {
            SliceDecision::read(pending.frame_length_bytes)
        }
    }

    fn glob_threshold(&self) -> u32 {
        self.config
            .glob_threshold
            .unwrap_or_else(|| {
                tables::glob_threshold(self.variant, self.state.pending_header.sampling_freq_1)
            })
            .max(1)
    }

    /// Duration of one access unit in 90 kHz ticks.
    fn unit_duration(&self, header: &ParsedFrameHeader) -> u64 {
        tables::presentation_duration(self.variant, header.sampling_freq_1)
            .map(u64::from)
            .unwrap_or_else(|| {
                samples_to_ticks(header.access_unit_samples as u64, header.sampling_freq_hz())
            })
    }

    fn start_frame(&mut self) {
        let length = tables::private_header_length(self.variant) as usize;

        self.frame = FrameInProgress {
            data: self.private_data[..length].to_vec(),
            header: Some(self.state.current_header),
            playback_time: self.state.playback_time_accumulator,
            new_stream_parameters: self.new_parameters_for_next_frame,
            ..Default::default()
        };
        self.new_parameters_for_next_frame = false;
    }

    /// Accounts the units read on the normal path.
    fn begin_units(&mut self, pending: &ParsedFrameHeader) {
        if let Some(pts) = self.packet_pts.take() {
            if self.frame.pts.is_none() {
                let elapsed = self.frame.access_units as u64 * self.unit_duration(pending);
                self.frame.pts = Some(pts.saturating_sub(elapsed));
            }
        }

        let complete_units = pending.nb_access_units.saturating_sub(1);
        self.split_unit = Some(SplitUnit {
            start: self.frame.data.len()
                + (complete_units * pending.access_unit_size_bytes) as usize,
            number_of_samples: pending.access_unit_samples,
            only_unit_of_read: complete_units == 0,
        });

        self.frame.access_units += pending.nb_access_units;
        self.frame.number_of_samples += pending.number_of_samples;
        self.state.accumulated_frame_count += 1;
        self.state.globbed_frame_count_this_packet += pending.nb_access_units;
    }

    fn complete_frame(&mut self) {
        self.emit_frame();

        let duration = self.unit_duration(&self.state.current_header);
        let state = &mut self.state;

        state.accumulated_frame_count = 0;
        state.must_accumulate_private_data = true;
        self.new_parameters_for_next_frame = state.is_private_data_new;
        state.is_private_data_new = false;
        state.playback_time_accumulator += state.globbed_frame_count_this_packet as u64 * duration;
        state.globbed_frame_count_this_packet = 0;
        state.current_header = state.pending_header;
    }

    fn emit_frame(&mut self) {
        self.split_unit = None;
        let frame = std::mem::take(&mut self.frame);

        let Some(header) = frame.header else {
            return;
        };

        if frame.access_units == 0 {
            return;
        }

        self.frames.push_back(CollatedFrame {
            data: frame.data,
            header,
            access_units: frame.access_units,
            number_of_samples: frame.number_of_samples,
            playback_time: frame.playback_time,
            pts: frame.pts,
            new_stream_parameters: frame.new_stream_parameters,
        });
    }

    /// Drops the partial last unit of a read still waiting for its
    /// continuation. Complete units read before it are kept.
    fn abandon_split_unit(&mut self) {
        if self.state.remaining_split_frame_bytes == 0 {
            return;
        }

        if let Some(split) = self.split_unit.take() {
            debug!(
                "Abandoning split access unit, {} bytes missing",
                self.state.remaining_split_frame_bytes
            );

            self.frame.data.truncate(split.start);
            self.frame.access_units = self.frame.access_units.saturating_sub(1);
            self.frame.number_of_samples = self
                .frame
                .number_of_samples
                .saturating_sub(split.number_of_samples);
            if split.only_unit_of_read {
                self.state.accumulated_frame_count =
                    self.state.accumulated_frame_count.saturating_sub(1);
            }
            self.state.globbed_frame_count_this_packet =
                self.state.globbed_frame_count_this_packet.saturating_sub(1);

            if self.frame.access_units == 0 {
                self.frame.pts = None;
            }
        }

        self.state.remaining_split_frame_bytes = 0;
    }

    fn invalidate(&mut self) {
        self.invalid_private_data += 1;
        self.abandon_split_unit();

        self.state.is_private_data_valid = false;
        self.state.bytes_to_skip = 0;
        self.state.stream_phase = StreamPhase::AwaitingFirstPacket;
    }

    /// Collates the private data area and elementary bytes of one PES packet.
    ///
    /// Invalid private data is logged and the packet skipped, unless the fail
    /// level turns the condition into an error.
    pub fn push_packet(&mut self, packet: &PesPacket) -> Result<()> {
        let min_length = tables::private_header_length(self.variant) as usize;

        if packet.payload.len() < min_length {
            self.invalidate();
            log_or_err!(
                self,
                Warn,
                anyhow!(CollateError::TruncatedPrivateData {
                    needed: min_length,
                    available: packet.payload.len(),
                })
            );
            return Ok(());
        }

        let (private_data, elementary) = packet.payload.split_at(min_length);
        self.packet_pts = packet.pts;

        if let Err(e) =
            self.handle_private_data_area(private_data, packet.stream_id, elementary.len() as u32)
        {
            log_or_err!(self, Warn, anyhow!(e));
        }

        let mut offset = 0;
        while offset < elementary.len() {
            let remaining = (elementary.len() - offset) as u32;
            let decision = self.decide_next_slice(remaining);
            let len = decision.len as usize;

            if decision.phase == SlicePhase::ReadSubFrame {
                self.frame
                    .data
                    .extend_from_slice(&elementary[offset..offset + len]);
            }

            offset += len;
        }

        self.packet_pts = None;

        Ok(())
    }

    /// Queues the units accumulated so far, dropping a trailing partial unit.
    pub fn flush(&mut self) {
        self.abandon_split_unit();

        if self.state.globbed_frame_count_this_packet > 0 || self.frame.access_units > 0 {
            let is_new = self.state.is_private_data_new;
            self.complete_frame();
            self.state.is_private_data_new = is_new;
        }
    }
}

impl Iterator for Collator {
    type Item = CollatedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::tests::{BD, DVD_VIDEO};
    use crate::utils::errors::ParseError;

    fn bd_packet(pts: Option<u64>) -> PesPacket {
        let mut payload = BD.to_vec();
        payload.extend((0..192).map(|i| i as u8));

        PesPacket {
            stream_id: 0xBD,
            pts,
            dts: None,
            payload,
        }
    }

    fn dvd_video_packet(pointer: u16, elementary: usize, pts: Option<u64>) -> PesPacket {
        let mut payload = DVD_VIDEO.to_vec();
        payload[2..4].copy_from_slice(&pointer.to_be_bytes());
        payload.extend(std::iter::repeat_n(0x55, elementary));

        PesPacket {
            stream_id: 0xBD,
            pts,
            dts: None,
            payload,
        }
    }

    #[test]
    fn first_packet_sequence() -> Result<(), CollateError> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        let status = collator.handle_private_data_area(&BD, 0xBD, 192)?;
        assert_eq!(status, PrivateDataStatus::NewParameters);

        assert_eq!(collator.decide_next_slice(192), SliceDecision::skip(0));
        assert_eq!(collator.decide_next_slice(192), SliceDecision::complete());
        assert_eq!(collator.decide_next_slice(192), SliceDecision::read(192));
        assert_eq!(collator.state().accumulated_frame_count, 1);
        assert_eq!(collator.state().phase, Some(SlicePhase::ReadSubFrame));

        Ok(())
    }

    #[test]
    fn globs_up_to_threshold() -> Result<(), CollateError> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        collator.handle_private_data_area(&BD, 0xBD, 192)?;
        collator.decide_next_slice(192);
        collator.decide_next_slice(192);
        assert_eq!(collator.decide_next_slice(192).phase, SlicePhase::ReadSubFrame);

        for count in 2..=4 {
            let status = collator.handle_private_data_area(&BD, 0xBD, 192)?;
            assert_eq!(status, PrivateDataStatus::Unchanged);
            assert_eq!(collator.decide_next_slice(192), SliceDecision::read(192));
            assert_eq!(collator.state().accumulated_frame_count, count);
        }

        collator.handle_private_data_area(&BD, 0xBD, 192)?;
        assert_eq!(collator.decide_next_slice(192), SliceDecision::complete());
        assert_eq!(collator.state().accumulated_frame_count, 0);
        assert_eq!(collator.state().globbed_frame_count_this_packet, 0);
        assert_eq!(collator.state().playback_time_accumulator, 4 * 450);
        assert_eq!(collator.decide_next_slice(192), SliceDecision::read(192));

        let frame = collator.next().unwrap();
        assert_eq!(frame.access_units, 4);
        assert_eq!(frame.number_of_samples, 4 * 32);
        assert!(frame.new_stream_parameters);

        Ok(())
    }

    #[test]
    fn parameter_change_flushes_early() -> Result<(), CollateError> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        collator.handle_private_data_area(&BD, 0xBD, 192)?;
        collator.decide_next_slice(192);
        collator.decide_next_slice(192);
        collator.decide_next_slice(192);
        collator.handle_private_data_area(&BD, 0xBD, 192)?;
        collator.decide_next_slice(192);
        assert_eq!(collator.state().accumulated_frame_count, 2);

        // 16-bit words
        let mut changed = BD;
        changed[3] = 0x40;
        let status = collator.handle_private_data_area(&changed, 0xBD, 192)?;
        assert_eq!(status, PrivateDataStatus::NewParameters);

        assert_eq!(collator.decide_next_slice(192), SliceDecision::complete());
        assert_eq!(collator.state().accumulated_frame_count, 0);
        assert_eq!(collator.state().playback_time_accumulator, 2 * 450);
        assert_eq!(collator.state().current_header.number_of_samples, 48);

        assert_eq!(collator.decide_next_slice(192), SliceDecision::read(192));

        Ok(())
    }

    #[test]
    fn split_access_unit() -> Result<(), CollateError> {
        let mut collator = Collator::new(StreamVariant::DvdVideo, CollatorConfig::default());

        let mut first = DVD_VIDEO;
        first[2..4].copy_from_slice(&4u16.to_be_bytes());
        collator.handle_private_data_area(&first, 0xBD, 500)?;
        assert_eq!(collator.state().pending_header.frame_length_bytes, 640);
        assert_eq!(collator.state().guessed_next_first_access_unit_pointer, 144);

        assert_eq!(collator.decide_next_slice(500), SliceDecision::skip(0));
        assert_eq!(collator.decide_next_slice(500), SliceDecision::complete());
        assert_eq!(collator.decide_next_slice(500), SliceDecision::read(500));
        assert_eq!(collator.state().remaining_split_frame_bytes, 140);

        let mut second = DVD_VIDEO;
        second[2..4].copy_from_slice(&144u16.to_be_bytes());
        collator.handle_private_data_area(&second, 0xBD, 460)?;
        assert_eq!(collator.state().guessed_next_first_access_unit_pointer, 4);

        assert_eq!(collator.decide_next_slice(460), SliceDecision::read(140));
        assert_eq!(collator.state().remaining_split_frame_bytes, 0);
        assert_eq!(collator.decide_next_slice(320), SliceDecision::read(320));

        Ok(())
    }

    #[test]
    fn dvd_audio_stuffing_is_skipped() -> Result<(), CollateError> {
        use crate::structs::header::tests::DVD_AUDIO;

        let mut collator = Collator::new(StreamVariant::DvdAudio, CollatorConfig::default());

        // 4 stuffing bytes, first unit right after them
        let mut bytes = DVD_AUDIO;
        bytes[3] = 12;
        bytes[4..6].copy_from_slice(&11u16.to_be_bytes());
        collator.handle_private_data_area(&bytes, 0xBD, 4 + 240)?;
        assert_eq!(collator.state().bytes_to_skip, 4);

        assert_eq!(collator.decide_next_slice(244), SliceDecision::skip(4));
        assert_eq!(collator.state().bytes_to_skip, 0);
        assert_eq!(collator.decide_next_slice(240), SliceDecision::complete());
        assert_eq!(collator.decide_next_slice(240), SliceDecision::read(240));

        collator.handle_private_data_area(&bytes, 0xBD, 4 + 240)?;
        assert_eq!(collator.decide_next_slice(244), SliceDecision::skip(4));
        assert_eq!(collator.decide_next_slice(240), SliceDecision::read(240));

        Ok(())
    }

    #[test]
    fn invalid_private_data_skips_packet() -> Result<(), CollateError> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        assert!(matches!(
            collator.handle_private_data_area(&BD, 0xE0, 192),
            Err(CollateError::StreamIdMismatch {
                found: 0xE0,
                expected: 0xBD
            })
        ));
        assert_eq!(collator.decide_next_slice(192), SliceDecision::skip(192));

        let mut broken = BD;
        broken[2] = 0x01;
        assert!(matches!(
            collator.handle_private_data_area(&broken, 0xBD, 192),
            Err(CollateError::InvalidPrivateData(
                ParseError::InvalidChannelAssignment(0)
            ))
        ));
        assert_eq!(collator.decide_next_slice(192), SliceDecision::skip(192));
        assert_eq!(collator.invalid_private_data(), 2);

        collator.handle_private_data_area(&BD, 0xBD, 192)?;
        assert_eq!(collator.decide_next_slice(192), SliceDecision::skip(0));

        Ok(())
    }

    #[test]
    fn collates_packets_into_frames() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        for i in 0..5 {
            collator.push_packet(&bd_packet(Some(1_000 + i * 450)))?;
        }
        collator.flush();

        let frames = collator.by_ref().collect::<Vec<_>>();
        assert_eq!(frames.len(), 2);

        let first = &frames[0];
        assert_eq!(first.access_units, 4);
        assert_eq!(first.pts, Some(1_000));
        assert_eq!(first.playback_time, 0);
        assert!(first.new_stream_parameters);
        assert_eq!(first.data.len(), 4 + 4 * 192);
        assert_eq!(&first.data[..4], &BD);

        let reparsed = header::parse(
            StreamVariant::BdHdmv,
            &first.data,
            first.data.len() as u32,
            &HeaderOptions::default(),
        )?;
        assert_eq!(reparsed.nb_access_units, 4);

        let second = &frames[1];
        assert_eq!(second.access_units, 1);
        assert_eq!(second.pts, Some(1_000 + 4 * 450));
        assert_eq!(second.playback_time, 4 * 450);
        assert!(!second.new_stream_parameters);

        Ok(())
    }

    #[test]
    fn extrapolates_pts_to_frame_start() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::DvdVideo, CollatorConfig::default());

        collator.push_packet(&dvd_video_packet(4, 500, None))?;
        collator.push_packet(&dvd_video_packet(144, 460, Some(10_000)))?;
        collator.flush();

        let frame = collator.next().unwrap();
        assert_eq!(frame.access_units, 3);
        assert_eq!(frame.pts, Some(10_000 - 2 * 150));
        assert_eq!(frame.data.len(), 7 + 960);

        let reparsed = header::parse(
            StreamVariant::DvdVideo,
            &frame.data,
            frame.data.len() as u32,
            &HeaderOptions::default(),
        )?;
        assert_eq!(reparsed.first_access_unit_pointer, 4);
        assert_eq!(reparsed.nb_access_units, 3);

        Ok(())
    }

    #[test]
    fn invalid_packet_abandons_split_unit() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::DvdVideo, CollatorConfig::default());

        collator.push_packet(&dvd_video_packet(4, 500, Some(0)))?;
        assert_eq!(collator.state().remaining_split_frame_bytes, 140);

        let mut broken = dvd_video_packet(144, 460, None);
        broken.payload[0] = 0x80;
        collator.push_packet(&broken)?;
        assert_eq!(collator.state().remaining_split_frame_bytes, 0);
        assert_eq!(collator.state().stream_phase, StreamPhase::AwaitingFirstPacket);

        collator.push_packet(&dvd_video_packet(144, 460, None))?;
        collator.flush();

        // the complete first unit survives, the resync starts a new frame
        let frames = collator.collect::<Vec<_>>();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].access_units, 1);
        assert_eq!(frames[0].pts, Some(0));
        assert_eq!(frames[0].data.len(), 7 + 320);
        assert_eq!(frames[1].access_units, 1);
        assert!(frames[1].new_stream_parameters);
        assert_eq!(frames[1].data.len(), 7 + 320);

        Ok(())
    }

    #[test]
    fn flush_keeps_complete_units_of_split_read() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::DvdVideo, CollatorConfig::default());

        collator.push_packet(&dvd_video_packet(4, 800, Some(0)))?;
        assert_eq!(collator.state().pending_header.nb_access_units, 3);
        assert_eq!(collator.state().remaining_split_frame_bytes, 160);

        collator.flush();
        assert_eq!(collator.state().remaining_split_frame_bytes, 0);

        let frames = collator.collect::<Vec<_>>();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].access_units, 2);
        assert_eq!(frames[0].number_of_samples, 160);
        assert_eq!(frames[0].pts, Some(0));
        assert_eq!(frames[0].data.len(), 7 + 640);

        let reparsed = header::parse(
            StreamVariant::DvdVideo,
            &frames[0].data,
            frames[0].data.len() as u32,
            &HeaderOptions::default(),
        )?;
        assert_eq!(reparsed.nb_access_units, 2);

        Ok(())
    }

    #[test]
    fn invalid_packet_keeps_complete_units_of_split_read() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::DvdVideo, CollatorConfig::default());

        collator.push_packet(&dvd_video_packet(4, 800, Some(0)))?;
        assert_eq!(collator.state().accumulated_frame_count, 1);

        let mut broken = dvd_video_packet(164, 460, None);
        broken.payload[0] = 0x80;
        collator.push_packet(&broken)?;
        assert_eq!(collator.invalid_private_data(), 1);
        assert_eq!(collator.state().remaining_split_frame_bytes, 0);
        // the read still holds two complete units
        assert_eq!(collator.state().accumulated_frame_count, 1);
        assert_eq!(collator.state().globbed_frame_count_this_packet, 2);

        collator.flush();

        let frames = collator.collect::<Vec<_>>();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].access_units, 2);
        assert_eq!(frames[0].number_of_samples, 160);
        assert_eq!(frames[0].data.len(), 7 + 640);

        Ok(())
    }

    #[test]
    fn strict_mode_rejects_invalid_packets() {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());
        collator.set_fail_level(log::Level::Warn);

        let mut packet = bd_packet(None);
        packet.stream_id = 0xC0;
        assert!(collator.push_packet(&packet).is_err());

        packet.payload.truncate(2);
        assert!(collator.push_packet(&packet).is_err());
    }

    #[test]
    fn reset_restarts_stream() -> anyhow::Result<()> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());

        let run = |collator: &mut Collator| -> anyhow::Result<Vec<CollatedFrame>> {
            for i in 0..9 {
                collator.push_packet(&bd_packet(Some(i * 450)))?;
            }
            collator.flush();
            Ok(collator.by_ref().collect())
        };

        let first = run(&mut collator)?;
        let state = collator.state().clone();

        collator.reset();
        collator.reset();
        let second = run(&mut collator)?;

        assert_eq!(first, second);
        assert_eq!(&state, collator.state());
        assert_eq!(first.len(), 3);

        Ok(())
    }

    #[test]
    fn glob_threshold_override() -> anyhow::Result<()> {
        let config = CollatorConfig {
            glob_threshold: Some(1),
            ..Default::default()
        };
        let mut collator = Collator::new(StreamVariant::BdHdmv, config);

        for _ in 0..3 {
            collator.push_packet(&bd_packet(None))?;
        }
        collator.flush();

        assert!(collator.all(|frame| frame.access_units == 1));

        Ok(())
    }
}
