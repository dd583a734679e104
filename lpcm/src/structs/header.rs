//! LPCM private data area (frame header) parsing.
//!
//! Every PES packet of an LPCM stream starts with a variant specific private
//! data area describing the access units carried in the packet. The layouts
//! are, most significant bit first:
//!
//! | Variant   | Layout                                                             |
//! |-----------|--------------------------------------------------------------------|
//! | DVD-Video | sub stream id, unit count, pointer, flags, word size, rate, chans  |
//! | DVD-Audio | sub stream id, header length, pointer, two channel groups          |
//! | HD DVD    | DVD-Video layout with wider rate and channel fields                |
//! | BD HDMV   | frame size, channel assignment, rate, bits per sample              |
//! | S/PDIF in | frame size, CEA-861 allocation, rate, channels, down-mix info      |
//!
//! A parsed header always describes whole access units: the number of units
//! is re-derived from the payload that follows the first access unit
//! pointer, rounding up when the packet ends inside a unit.

use log::trace;

use crate::structs::tables::{self, AUDIO_FRAME_NUMBER_NONE, MAX_AUDIO_FRAME_NUMBER, MAX_CHANNELS};
use crate::structs::variant::{SamplingFreq, StreamVariant, WordSize};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ParseError;

/// Sample count table used to size HD DVD access units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleCountTable {
    DvdVideo,
    #[default]
    DvdAudio,
}

/// Parser options for behaviour that differs between disc revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderOptions {
    /// Highest DVD-Video sampling frequency accepted, `F96` or `F192`.
    pub dvd_video_max_sampling_freq: SamplingFreq,
    pub hd_dvd_sample_counts: SampleCountTable,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            dvd_video_max_sampling_freq: SamplingFreq::F96,
            hd_dvd_sample_counts: SampleCountTable::DvdAudio,
        }
    }
}

/// S/PDIF input specific header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpdifInProperties {
    /// Raw CEA-861 channel allocation code.
    pub organisation: u8,
    pub channel_count: u8,
    pub down_mix_inhibit: bool,
    pub level_shift: u8,
    pub lfe_playback_level: u8,
    pub layout: u8,
    pub sampling_freq_hz: u32,
}

/// Exploded private data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrameHeader {
    pub variant: StreamVariant,
    pub sub_stream_id: u8,
    pub audio_frame_number: u8,

    pub word_size_1: WordSize,
    pub word_size_2: WordSize,
    pub sampling_freq_1: SamplingFreq,
    pub sampling_freq_2: SamplingFreq,

    pub channel_count: u8,
    pub channel_assignment: u8,
    pub bit_shift_channel_2: u8,

    pub mute_flag: bool,
    pub emphasis_flag: bool,
    pub drc_code: u8,

    pub first_access_unit_pointer: u32,
    pub private_header_length: u32,

    /// Access units covered, including one cut by the end of the packet.
    pub nb_access_units: u32,
    /// Samples per channel over all access units.
    pub number_of_samples: u32,
    /// Bytes of all access units, private data area excluded.
    pub frame_length_bytes: u32,

    pub access_unit_size_bytes: u32,
    pub access_unit_samples: u32,

    pub spdifin: Option<SpdifInProperties>,
}

impl ParsedFrameHeader {
    /// Header of a stream that has not seen a private data area yet.
    pub fn empty(variant: StreamVariant) -> Self {
        Self {
            variant,
            sub_stream_id: 0,
            audio_frame_number: AUDIO_FRAME_NUMBER_NONE,
            word_size_1: WordSize::None,
            word_size_2: WordSize::None,
            sampling_freq_1: SamplingFreq::None,
            sampling_freq_2: SamplingFreq::None,
            channel_count: 0,
            channel_assignment: 0,
            bit_shift_channel_2: 0,
            mute_flag: false,
            emphasis_flag: false,
            drc_code: 0,
            first_access_unit_pointer: 0,
            private_header_length: tables::private_header_length(variant),
            nb_access_units: 0,
            number_of_samples: 0,
            frame_length_bytes: 0,
            access_unit_size_bytes: 0,
            access_unit_samples: 0,
            spdifin: None,
        }
    }

    pub fn sampling_freq_hz(&self) -> u32 {
        self.sampling_freq_1.hz()
    }

    /// Compares the fields a decoder has to be reconfigured for.
    pub fn has_same_stream_parameters(&self, other: &Self) -> bool {
        self.sub_stream_id == other.sub_stream_id
            && self.word_size_1 == other.word_size_1
            && self.word_size_2 == other.word_size_2
            && self.emphasis_flag == other.emphasis_flag
            && self.mute_flag == other.mute_flag
            && self.channel_count == other.channel_count
            && self.sampling_freq_1 == other.sampling_freq_1
            && self.sampling_freq_2 == other.sampling_freq_2
    }
}

/// Parses one private data area.
///
/// `bytes` must hold at least the variant's fixed private data area;
/// `available` is the length of the whole PES payload the area starts, and
/// bounds the first access unit pointer.
pub fn parse(
    variant: StreamVariant,
    bytes: &[u8],
    available: u32,
    options: &HeaderOptions,
) -> Result<ParsedFrameHeader, ParseError> {
    let needed = tables::private_header_length(variant) as usize;
    if bytes.len() < needed {
        return Err(ParseError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    let mut reader = BsIoSliceReader::from_slice(&bytes[..needed]);
    let header = match variant {
        StreamVariant::DvdVideo => read_dvd_video(&mut reader, options)?,
        StreamVariant::DvdAudio => read_dvd_audio(&mut reader)?,
        StreamVariant::HdDvd => read_hd_dvd(&mut reader, options)?,
        StreamVariant::BdHdmv => read_bd(&mut reader)?,
        StreamVariant::SpdifIn => read_spdifin(&mut reader)?,
    };

    let header = count_access_units(header, available)?;

    trace!(
        "{} header: {} {} {} ch, pointer {}, {} units, {} samples, {} bytes",
        header.variant,
        header.sampling_freq_1,
        header.word_size_1,
        header.channel_count,
        header.first_access_unit_pointer,
        header.nb_access_units,
        header.number_of_samples,
        header.frame_length_bytes,
    );

    Ok(header)
}

/// Rewrites the pointer fields of a private data area so that it describes
/// access units starting right after the fixed area.
pub fn normalize_private_data(variant: StreamVariant, bytes: &mut [u8]) -> Result<(), ParseError> {
    let needed = tables::private_header_length(variant) as usize;
    if bytes.len() < needed {
        return Err(ParseError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    let pointer = (tables::private_header_length(variant)
        - tables::first_access_unit_offset(variant)) as u16;

    match variant {
        StreamVariant::DvdVideo | StreamVariant::HdDvd => {
            bytes[2..4].copy_from_slice(&pointer.to_be_bytes());
        }
        StreamVariant::DvdAudio => {
            bytes[3] = (tables::private_header_length(variant)
                - tables::DVD_AUDIO_PRIVATE_HEADER_BASE) as u8;
            bytes[4..6].copy_from_slice(&pointer.to_be_bytes());
        }
        StreamVariant::BdHdmv | StreamVariant::SpdifIn => {}
    }

    Ok(())
}

/// Size of one access unit of a DVD channel group.
///
/// 20-bit samples are stored as a pair of 16-bit words followed by a byte
/// holding both 4-bit remainders.
fn dvd_group_bytes(word_size: WordSize, samples: u32, channels: u8) -> u32 {
    match word_size {
        WordSize::W20 => (samples / 2) * channels as u32 * 5,
        ws => samples * channels as u32 * ws.bytes_per_sample(),
    }
}

fn check_sub_stream_id(sub_stream_id: u8, mask: u8, id: u8) -> Result<(), ParseError> {
    if sub_stream_id & mask != id {
        return Err(ParseError::InvalidSubStreamId(sub_stream_id));
    }

    Ok(())
}

fn check_audio_frame_number(afn: u8) -> Result<(), ParseError> {
    if afn >= MAX_AUDIO_FRAME_NUMBER && afn != AUDIO_FRAME_NUMBER_NONE {
        return Err(ParseError::InvalidAudioFrameNumber(afn));
    }

    Ok(())
}

/// Word sizes of disc variants stop at 24 bits.
fn disc_word_size(code: u8, group: u8) -> Result<WordSize, ParseError> {
    match WordSize::from_code(code) {
        Some(ws @ (WordSize::W16 | WordSize::W20 | WordSize::W24)) => Ok(ws),
        _ => Err(ParseError::InvalidWordSize { group, value: code }),
    }
}

fn read_dvd_video(
    reader: &mut BsIoSliceReader,
    options: &HeaderOptions,
) -> Result<ParsedFrameHeader, ParseError> {
    let variant = StreamVariant::DvdVideo;
    let mut header = ParsedFrameHeader::empty(variant);

    header.sub_stream_id = reader.get_n(8)?;
    header.nb_access_units = reader.get_n(8)?;
    header.first_access_unit_pointer = reader.get_n(16)?;
    header.emphasis_flag = reader.get()?;
    header.mute_flag = reader.get()?;
    reader.skip_n(1)?;
    header.audio_frame_number = reader.get_n(5)?;
    let ws: u8 = reader.get_n(2)?;
    let sf: u8 = reader.get_n(2)?;
    reader.skip_n(1)?;
    header.channel_count = reader.get_n::<u8>(3)? + 1;
    header.drc_code = reader.get_n(8)?;

    check_sub_stream_id(
        header.sub_stream_id,
        tables::DVD_VIDEO_SUBSTREAM_ID_MASK,
        tables::DVD_VIDEO_SUBSTREAM_ID,
    )?;
    check_audio_frame_number(header.audio_frame_number)?;
    header.word_size_1 = disc_word_size(ws, 1)?;

    let freq = SamplingFreq::from_code(sf)
        .filter(|&f| f <= options.dvd_video_max_sampling_freq)
        .ok_or(ParseError::InvalidSamplingFrequency { group: 1, value: sf })?;
    header.sampling_freq_1 = freq;

    let samples = tables::dvd_video_sample_count(freq)
        .ok_or(ParseError::InvalidSamplingFrequency { group: 1, value: sf })?;
    header.access_unit_samples = samples;
    header.access_unit_size_bytes = dvd_group_bytes(header.word_size_1, samples, header.channel_count);

    Ok(header)
}

fn read_dvd_audio(reader: &mut BsIoSliceReader) -> Result<ParsedFrameHeader, ParseError> {
    let variant = StreamVariant::DvdAudio;
    let mut header = ParsedFrameHeader::empty(variant);

    header.sub_stream_id = reader.get_n(8)?;
    // reserved, UPC/EAN/ISRC number and data
    reader.skip_n(3)?;
    reader.skip_n(13)?;
    let length: u32 = reader.get_n(8)?;
    header.private_header_length = length + tables::DVD_AUDIO_PRIVATE_HEADER_BASE;
    header.first_access_unit_pointer = reader.get_n(16)?;
    header.emphasis_flag = reader.get()?;
    // reserved, stereo playback mode and down-mix code
    reader.skip_n(1)?;
    reader.skip_n(6)?;
    let ws1: u8 = reader.get_n(4)?;
    let ws2: u8 = reader.get_n(4)?;
    let sf1: u8 = reader.get_n(4)?;
    let sf2: u8 = reader.get_n(4)?;
    // reserved, multi channel type
    reader.skip_n(4)?;
    reader.skip_n(4)?;
    header.bit_shift_channel_2 = reader.get_n(3)?;
    header.channel_assignment = reader.get_n(5)?;
    header.drc_code = reader.get_n(8)?;

    check_sub_stream_id(
        header.sub_stream_id,
        tables::DVD_AUDIO_SUBSTREAM_ID_MASK,
        tables::DVD_AUDIO_SUBSTREAM_ID,
    )?;

    if header.private_header_length < tables::private_header_length(variant) {
        return Err(ParseError::InvalidPrivateHeaderLength(header.private_header_length));
    }

    header.word_size_1 = disc_word_size(ws1, 1)?;
    header.word_size_2 = match ws2 {
        0xF => WordSize::None,
        code => disc_word_size(code, 2)?,
    };

    header.sampling_freq_1 = SamplingFreq::from_code(sf1)
        .filter(|&f| tables::dvd_audio_sample_count(f).is_some())
        .ok_or(ParseError::InvalidSamplingFrequency { group: 1, value: sf1 })?;
    header.sampling_freq_2 = match sf2 {
        SamplingFreq::NOT_SPECIFIED => SamplingFreq::None,
        code => SamplingFreq::from_code(code)
            .filter(|&f| f.is_none() || tables::dvd_audio_sample_count(f).is_some())
            .ok_or(ParseError::InvalidSamplingFrequency { group: 2, value: code })?,
    };

    let (channels_1, channels_2) = tables::dvd_audio_channel_counts(header.channel_assignment)
        .ok_or(ParseError::InvalidChannelAssignment(header.channel_assignment))?;
    header.channel_count = channels_1 + channels_2;

    let samples_1 = tables::dvd_audio_sample_count(header.sampling_freq_1).unwrap_or(0);
    let samples_2 = tables::dvd_audio_sample_count(header.sampling_freq_2).unwrap_or(0);

    let bytes_1 = dvd_group_bytes(header.word_size_1, samples_1, channels_1);
    let bytes_2 = match header.word_size_2 {
        WordSize::None => 0,
        ws => dvd_group_bytes(ws, samples_2, channels_2),
    };

    header.access_unit_samples = samples_1;
    header.access_unit_size_bytes = bytes_1 + bytes_2;

    Ok(header)
}

fn read_hd_dvd(
    reader: &mut BsIoSliceReader,
    options: &HeaderOptions,
) -> Result<ParsedFrameHeader, ParseError> {
    let variant = StreamVariant::HdDvd;
    let mut header = ParsedFrameHeader::empty(variant);

    header.sub_stream_id = reader.get_n(8)?;
    header.nb_access_units = reader.get_n(8)?;
    header.first_access_unit_pointer = reader.get_n(16)?;
    header.emphasis_flag = reader.get()?;
    header.mute_flag = reader.get()?;
    header.audio_frame_number = reader.get_n(5)?;
    let ws: u8 = reader.get_n(2)?;
    let sf: u8 = reader.get_n(3)?;
    header.channel_count = reader.get_n::<u8>(4)? + 1;
    header.drc_code = reader.get_n(8)?;
    // reserved, down-mix code validity and code, reserved
    reader.skip_n(3)?;
    reader.skip_n(5)?;
    reader.skip_n(3)?;
    header.channel_assignment = reader.get_n(5)?;

    check_sub_stream_id(
        header.sub_stream_id,
        tables::DVD_VIDEO_SUBSTREAM_ID_MASK,
        tables::DVD_VIDEO_SUBSTREAM_ID,
    )?;
    check_audio_frame_number(header.audio_frame_number)?;
    header.word_size_1 = disc_word_size(ws, 1)?;

    if header.channel_count > MAX_CHANNELS {
        return Err(ParseError::InvalidChannelCount(header.channel_count));
    }

    let freq = SamplingFreq::from_code(sf)
        .filter(|&f| f <= SamplingFreq::F192)
        .ok_or(ParseError::InvalidSamplingFrequency { group: 1, value: sf })?;
    header.sampling_freq_1 = freq;

    let samples = match options.hd_dvd_sample_counts {
        SampleCountTable::DvdAudio => tables::dvd_audio_sample_count(freq),
        SampleCountTable::DvdVideo => tables::dvd_video_sample_count(freq),
    }
    .ok_or(ParseError::InvalidSamplingFrequency { group: 1, value: sf })?;

    header.access_unit_samples = samples;
    header.access_unit_size_bytes = dvd_group_bytes(header.word_size_1, samples, header.channel_count);

    Ok(header)
}

fn read_bd(reader: &mut BsIoSliceReader) -> Result<ParsedFrameHeader, ParseError> {
    let variant = StreamVariant::BdHdmv;
    let mut header = ParsedFrameHeader::empty(variant);

    let frame_size: u32 = reader.get_n(16)?;
    header.channel_assignment = reader.get_n(4)?;
    let sf: u8 = reader.get_n(4)?;
    let bits_per_sample: u8 = reader.get_n(2)?;

    header.channel_count = tables::bd_channel_count(header.channel_assignment)
        .ok_or(ParseError::InvalidChannelAssignment(header.channel_assignment))?;

    header.sampling_freq_1 = tables::bd_sampling_freq(sf);
    if header.sampling_freq_1.is_none() {
        return Err(ParseError::InvalidSamplingFrequency { group: 1, value: sf });
    }

    if bits_per_sample == 0 {
        return Err(ParseError::InvalidBitsPerSample(bits_per_sample));
    }
    header.word_size_1 = WordSize::from_code(bits_per_sample - 1)
        .ok_or(ParseError::InvalidBitsPerSample(bits_per_sample))?;
    let bytes_per_sample = if bits_per_sample >= 2 { 3 } else { 2 };

    header.first_access_unit_pointer = 1;
    header.access_unit_size_bytes = frame_size;
    header.access_unit_samples = frame_size / (bytes_per_sample * header.channel_count as u32);

    Ok(header)
}

fn read_spdifin(reader: &mut BsIoSliceReader) -> Result<ParsedFrameHeader, ParseError> {
    let variant = StreamVariant::SpdifIn;
    let mut header = ParsedFrameHeader::empty(variant);
    let mut props = SpdifInProperties::default();

    let frame_size: u32 = reader.get_n(16)?;
    props.organisation = reader.get_n(5)?;
    let sf: u8 = reader.get_n(4)?;
    let bits_per_sample: u8 = reader.get_n(2)?;
    header.emphasis_flag = reader.get()?;
    props.channel_count = reader.get_n(4)?;
    props.down_mix_inhibit = reader.get()?;
    props.level_shift = reader.get_n(4)?;
    props.lfe_playback_level = reader.get_n(2)?;
    props.layout = reader.get_n(4)?;

    header.word_size_1 = WordSize::W32;
    header.sampling_freq_1 = tables::spdifin_sampling_freq(sf);
    if header.sampling_freq_1.is_none() {
        return Err(ParseError::InvalidSamplingFrequency { group: 1, value: sf });
    }
    props.sampling_freq_hz = header.sampling_freq_1.hz();

    if bits_per_sample != 0 {
        return Err(ParseError::InvalidBitsPerSample(bits_per_sample));
    }

    if props.channel_count == 0 || props.channel_count > MAX_CHANNELS {
        return Err(ParseError::InvalidChannelCount(props.channel_count));
    }
    header.channel_count = props.channel_count;

    header.first_access_unit_pointer = 1;
    header.access_unit_size_bytes = frame_size;
    header.access_unit_samples =
        frame_size / (header.word_size_1.bytes_per_sample() * props.channel_count as u32);
    header.spdifin = Some(props);

    Ok(header)
}

/// Validates the first access unit pointer and counts the units following it.
fn count_access_units(
    mut header: ParsedFrameHeader,
    available: u32,
) -> Result<ParsedFrameHeader, ParseError> {
    if header.access_unit_size_bytes == 0 || header.access_unit_samples == 0 {
        return Err(ParseError::EmptyAccessUnit);
    }

    let offset = tables::first_access_unit_offset(header.variant);
    let start = header.first_access_unit_pointer + offset;

    if start > available {
        return Err(ParseError::PointerBeyondPacket {
            pointer: header.first_access_unit_pointer,
            offset,
            available,
        });
    }

    // bounded by the fixed area; extended DVD-Audio bytes are skipped as stuffing
    let min_length = tables::private_header_length(header.variant);
    if start < min_length {
        return Err(ParseError::PointerInsideHeader {
            pointer: header.first_access_unit_pointer,
            offset,
            header_length: min_length,
        });
    }

    let payload = available - start;
    let units = payload.div_ceil(header.access_unit_size_bytes);

    header.nb_access_units = units;
    header.frame_length_bytes = units * header.access_unit_size_bytes;
    header.number_of_samples = units * header.access_unit_samples;

    Ok(header)
}
