//! Stream variants and the enumerated header codes shared between them.
//!
//! Sampling frequencies are kept as the DVD-family code rather than raw Hz;
//! Blu-ray and S/PDIF input codes are remapped onto the same enumeration by
//! the header parser.

use std::fmt::{Display, Formatter};

/// LPCM wire variant, fixed for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamVariant {
    DvdVideo,
    DvdAudio,
    HdDvd,
    BdHdmv,
    SpdifIn,
}

impl StreamVariant {
    pub const ALL: [StreamVariant; 5] = [
        StreamVariant::DvdVideo,
        StreamVariant::DvdAudio,
        StreamVariant::HdDvd,
        StreamVariant::BdHdmv,
        StreamVariant::SpdifIn,
    ];

    /// Whether the private data area carries a first access unit pointer.
    pub fn has_access_unit_pointer(self) -> bool {
        !matches!(self, StreamVariant::BdHdmv | StreamVariant::SpdifIn)
    }
}

impl Display for StreamVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamVariant::DvdVideo => "DVD-Video",
            StreamVariant::DvdAudio => "DVD-Audio",
            StreamVariant::HdDvd => "HD DVD",
            StreamVariant::BdHdmv => "Blu-ray HDMV",
            StreamVariant::SpdifIn => "S/PDIF input",
        };

        f.write_str(name)
    }
}

/// Sampling frequency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum SamplingFreq {
    F48 = 0,
    F96 = 1,
    F192 = 2,
    F32 = 4,
    F16 = 5,
    F22_05 = 6,
    F24 = 7,
    F44_1 = 8,
    F88_2 = 9,
    F176_4 = 10,
    #[default]
    None = 11,
}

impl SamplingFreq {
    /// DVD-Audio group 2 "not specified" code, outside the table range.
    pub const NOT_SPECIFIED: u8 = 0xF;

    pub fn from_code(code: u8) -> Option<Self> {
        let freq = match code {
            0 => Self::F48,
            1 => Self::F96,
            2 => Self::F192,
            4 => Self::F32,
            5 => Self::F16,
            6 => Self::F22_05,
            7 => Self::F24,
            8 => Self::F44_1,
            9 => Self::F88_2,
            10 => Self::F176_4,
            11 => Self::None,
            _ => return None,
        };

        Some(freq)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn hz(self) -> u32 {
        match self {
            Self::F48 => 48_000,
            Self::F96 => 96_000,
            Self::F192 => 192_000,
            Self::F32 => 32_000,
            Self::F16 => 16_000,
            Self::F22_05 => 22_050,
            Self::F24 => 24_000,
            Self::F44_1 => 44_100,
            Self::F88_2 => 88_200,
            Self::F176_4 => 176_400,
            Self::None => 0,
        }
    }

    /// 1, 2 or 4 for the base, double and quadruple rates of a family.
    pub fn rate_multiplier(self) -> u32 {
        match self {
            Self::F96 | Self::F88_2 => 2,
            Self::F192 | Self::F176_4 => 4,
            _ => 1,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl Display for SamplingFreq {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            freq => write!(f, "{} Hz", freq.hz()),
        }
    }
}

/// Quantization word length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WordSize {
    W16 = 0,
    W20 = 1,
    W24 = 2,
    W32 = 3,
    #[default]
    None = 0xF,
}

impl WordSize {
    pub fn from_code(code: u8) -> Option<Self> {
        let ws = match code {
            0 => Self::W16,
            1 => Self::W20,
            2 => Self::W24,
            3 => Self::W32,
            0xF => Self::None,
            _ => return None,
        };

        Some(ws)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::W16 => 16,
            Self::W20 => 20,
            Self::W24 => 24,
            Self::W32 => 32,
            Self::None => 0,
        }
    }

    /// Container bytes of one sample in disc layouts; 20-bit words are
    /// packed differently and handled by the parser.
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            Self::W16 => 2,
            Self::W20 | Self::W24 => 3,
            Self::W32 => 4,
            Self::None => 0,
        }
    }
}

impl Display for WordSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            ws => write!(f, "{}-bit", ws.bits()),
        }
    }
}

#[test]
fn sampling_freq_codes() {
    assert_eq!(SamplingFreq::from_code(8), Some(SamplingFreq::F44_1));
    assert_eq!(SamplingFreq::from_code(3), None);
    assert_eq!(SamplingFreq::from_code(SamplingFreq::NOT_SPECIFIED), None);
    assert_eq!(SamplingFreq::F176_4.hz(), 176_400);
    assert_eq!(SamplingFreq::F88_2.rate_multiplier(), 2);
    assert_eq!(format!("{}", SamplingFreq::F96), "96000 Hz");
}

#[test]
fn word_size_codes() {
    assert_eq!(WordSize::from_code(1), Some(WordSize::W20));
    assert_eq!(WordSize::from_code(0xF), Some(WordSize::None));
    assert_eq!(WordSize::from_code(4), None);
    assert_eq!(WordSize::W32.bytes_per_sample(), 4);
    assert_eq!(format!("{}", WordSize::W24), "24-bit");
}
