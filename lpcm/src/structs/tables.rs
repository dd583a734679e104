//! Per-variant constant tables.
//!
//! Lookups taking a [`SamplingFreq`] return `None` for codes that have no
//! entry in the variant's table; the header parser turns those into errors,
//! so a successfully parsed header never yields `None` here.

use crate::structs::variant::{SamplingFreq, StreamVariant};

/// PES stream id of private_stream_1, which carries every LPCM variant.
pub const PES_PRIVATE_STREAM_1: u8 = 0xBD;

pub const DVD_VIDEO_SUBSTREAM_ID: u8 = 0xA0;
pub const DVD_VIDEO_SUBSTREAM_ID_MASK: u8 = 0xF8;
pub const DVD_AUDIO_SUBSTREAM_ID: u8 = 0xA0;
pub const DVD_AUDIO_SUBSTREAM_ID_MASK: u8 = 0xFF;

/// The DVD-Audio private_header_length field counts bytes after this offset.
pub const DVD_AUDIO_PRIVATE_HEADER_BASE: u32 = 4;

/// Largest fixed private data area of all variants.
pub const MAX_PRIVATE_HEADER_LENGTH: usize = 12;

/// Audio frame number used for "no frame header starts in this packet".
pub const AUDIO_FRAME_NUMBER_NONE: u8 = 31;
pub const MAX_AUDIO_FRAME_NUMBER: u8 = 20;

pub const MAX_CHANNELS: u8 = 8;

/// Fixed (minimum, for DVD-Audio) private data area length in bytes.
pub const fn private_header_length(variant: StreamVariant) -> u32 {
    match variant {
        StreamVariant::DvdVideo => 7,
        StreamVariant::DvdAudio => 12,
        StreamVariant::HdDvd => 9,
        StreamVariant::BdHdmv => 4,
        StreamVariant::SpdifIn => 8,
    }
}

/// Offset the first access unit pointer is relative to.
pub const fn first_access_unit_offset(variant: StreamVariant) -> u32 {
    match variant {
        StreamVariant::DvdVideo => 3,
        StreamVariant::DvdAudio => 5,
        StreamVariant::HdDvd => 3,
        StreamVariant::BdHdmv => 3,
        StreamVariant::SpdifIn => 7,
    }
}

/// Samples per channel in one DVD-Video access unit (1/600 s).
pub fn dvd_video_sample_count(freq: SamplingFreq) -> Option<u32> {
    match freq {
        SamplingFreq::F48 => Some(80),
        SamplingFreq::F96 => Some(160),
        SamplingFreq::F192 => Some(320),
        _ => None,
    }
}

/// Samples per channel in one DVD-Audio access unit.
pub fn dvd_audio_sample_count(freq: SamplingFreq) -> Option<u32> {
    match freq {
        SamplingFreq::F48 | SamplingFreq::F44_1 => Some(40),
        SamplingFreq::F96 | SamplingFreq::F88_2 => Some(80),
        SamplingFreq::F192 | SamplingFreq::F176_4 => Some(160),
        _ => None,
    }
}

const BD_SAMPLING_FREQ: [SamplingFreq; 16] = [
    SamplingFreq::None,
    SamplingFreq::F48,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::F96,
    SamplingFreq::F192,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
];

// CEA-861 sampling frequency codes
const SPDIFIN_SAMPLING_FREQ: [SamplingFreq; 16] = [
    SamplingFreq::None,
    SamplingFreq::F32,
    SamplingFreq::F44_1,
    SamplingFreq::F48,
    SamplingFreq::F88_2,
    SamplingFreq::F96,
    SamplingFreq::F176_4,
    SamplingFreq::F192,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
    SamplingFreq::None,
];

pub fn bd_sampling_freq(code: u8) -> SamplingFreq {
    BD_SAMPLING_FREQ[(code & 0xF) as usize]
}

pub fn spdifin_sampling_freq(code: u8) -> SamplingFreq {
    SPDIFIN_SAMPLING_FREQ[(code & 0xF) as usize]
}

const BD_CHANNEL_COUNT: [i8; 12] = [-1, 2, 2, 2, 4, 4, 4, 4, 6, 6, 8, 8];

pub fn bd_channel_count(channel_assignment: u8) -> Option<u8> {
    BD_CHANNEL_COUNT
        .get(channel_assignment as usize)
        .and_then(|&count| u8::try_from(count).ok())
}

const DVD_AUDIO_GROUP_1_CHANNELS: [u8; 21] = [
    1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 4, 4, 4,
];

const DVD_AUDIO_GROUP_2_CHANNELS: [u8; 21] = [
    0, 0, 1, 2, 1, 2, 3, 1, 2, 3, 2, 3, 4, 1, 2, 1, 2, 3, 1, 1, 2,
];

/// Channel counts of (group 1, group 2) for a DVD-Audio channel assignment.
pub fn dvd_audio_channel_counts(channel_assignment: u8) -> Option<(u8, u8)> {
    let i = channel_assignment as usize;
    Some((
        *DVD_AUDIO_GROUP_1_CHANNELS.get(i)?,
        *DVD_AUDIO_GROUP_2_CHANNELS.get(i)?,
    ))
}

/// Number of collated units accumulated before a decode command is issued.
pub fn glob_threshold(variant: StreamVariant, freq: SamplingFreq) -> u32 {
    match variant {
        StreamVariant::SpdifIn => 1,
        _ => 4 / freq.rate_multiplier(),
    }
}

/// Nominal duration of one access unit in 90 kHz ticks.
///
/// S/PDIF input access units have no fixed duration; callers derive it from
/// the header's sample count instead.
pub fn presentation_duration(variant: StreamVariant, freq: SamplingFreq) -> Option<u32> {
    match variant {
        StreamVariant::DvdVideo => Some(150),
        StreamVariant::DvdAudio | StreamVariant::HdDvd => match freq {
            SamplingFreq::F48 | SamplingFreq::F96 | SamplingFreq::F192 => Some(75),
            SamplingFreq::F44_1 | SamplingFreq::F88_2 | SamplingFreq::F176_4 => Some(82),
            _ => None,
        },
        StreamVariant::BdHdmv => Some(450),
        StreamVariant::SpdifIn => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_offsets_reach_end_of_header() {
        // The default pointer of variants without a pointer field is 1.
        assert_eq!(
            1 + first_access_unit_offset(StreamVariant::BdHdmv),
            private_header_length(StreamVariant::BdHdmv)
        );
        assert_eq!(
            1 + first_access_unit_offset(StreamVariant::SpdifIn),
            private_header_length(StreamVariant::SpdifIn)
        );
        assert!(
            StreamVariant::ALL
                .iter()
                .all(|&v| private_header_length(v) as usize <= MAX_PRIVATE_HEADER_LENGTH)
        );
    }

    #[test]
    fn channel_tables() {
        assert_eq!(bd_channel_count(0), None);
        assert_eq!(bd_channel_count(1), Some(2));
        assert_eq!(bd_channel_count(11), Some(8));
        assert_eq!(bd_channel_count(12), None);

        assert_eq!(dvd_audio_channel_counts(0), Some((1, 0)));
        assert_eq!(dvd_audio_channel_counts(20), Some((4, 2)));
        assert_eq!(dvd_audio_channel_counts(21), None);
    }

    #[test]
    fn sampling_freq_tables() {
        assert_eq!(bd_sampling_freq(1), SamplingFreq::F48);
        assert_eq!(bd_sampling_freq(5), SamplingFreq::F192);
        assert_eq!(bd_sampling_freq(2), SamplingFreq::None);
        assert_eq!(spdifin_sampling_freq(2), SamplingFreq::F44_1);
        assert_eq!(spdifin_sampling_freq(0), SamplingFreq::None);

        assert_eq!(dvd_video_sample_count(SamplingFreq::F96), Some(160));
        assert_eq!(dvd_audio_sample_count(SamplingFreq::F88_2), Some(80));
        assert_eq!(dvd_audio_sample_count(SamplingFreq::F32), None);
    }

    #[test]
    fn glob_thresholds_scale_with_rate() {
        assert_eq!(glob_threshold(StreamVariant::DvdVideo, SamplingFreq::F48), 4);
        assert_eq!(glob_threshold(StreamVariant::DvdAudio, SamplingFreq::F88_2), 2);
        assert_eq!(glob_threshold(StreamVariant::BdHdmv, SamplingFreq::F192), 1);
        assert_eq!(glob_threshold(StreamVariant::SpdifIn, SamplingFreq::F48), 1);
    }
}
