#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Private data area too short: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid sub stream identifier ({0:#04X})")]
    InvalidSubStreamId(u8),

    #[error("Invalid audio frame number ({0})")]
    InvalidAudioFrameNumber(u8),

    #[error("Invalid quantization word length for channel group {group} ({value})")]
    InvalidWordSize { group: u8, value: u8 },

    #[error("Invalid number of audio channels ({0})")]
    InvalidChannelCount(u8),

    #[error("Invalid sampling frequency code for channel group {group} ({value})")]
    InvalidSamplingFrequency { group: u8, value: u8 },

    #[error("Invalid channel assignment ({0})")]
    InvalidChannelAssignment(u8),

    #[error("Invalid bits per sample code ({0})")]
    InvalidBitsPerSample(u8),

    #[error("Invalid private header length ({0})")]
    InvalidPrivateHeaderLength(u32),

    #[error("Access unit size computes to zero bytes")]
    EmptyAccessUnit,

    #[error(
        "First access unit pointer ({pointer}) + offset ({offset}) lies outside the packet ({available} bytes)"
    )]
    PointerBeyondPacket {
        pointer: u32,
        offset: u32,
        available: u32,
    },

    #[error(
        "First access unit pointer ({pointer}) + offset ({offset}) must be >= private header length ({header_length})"
    )]
    PointerInsideHeader {
        pointer: u32,
        offset: u32,
        header_length: u32,
    },

    #[error("Bitstream read failed: {0}")]
    Bitstream(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CollateError {
    #[error("PES stream id mismatch: found {found:#04X}, expected {expected:#04X}")]
    StreamIdMismatch { found: u8, expected: u8 },

    #[error("Private data area shorter than {needed} bytes ({available})")]
    TruncatedPrivateData { needed: usize, available: usize },

    #[error("Invalid private data area: {0}")]
    InvalidPrivateData(#[from] ParseError),
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Buffer length ({buffer}) is inconsistent with frame header ({header})")]
    LengthMismatch { buffer: usize, header: usize },

    #[error("Timestamp discontinuity: expected {expected} us, found {found} us")]
    TimestampJump { expected: u64, found: u64 },

    #[error("Collated frame does not carry a parseable header: {0}")]
    InvalidHeader(#[from] ParseError),
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Insufficient buffer data for packet extraction")]
    InsufficientData,

    #[error("Unbounded PES packet (stream id {0:#04X}) is not supported")]
    UnboundedPacket(u8),

    #[error("Invalid PES header for stream id {0:#04X}")]
    InvalidPesHeader(u8),

    #[error("PES header data length {header} exceeds packet length {packet}")]
    HeaderTooLong { header: usize, packet: usize },
}
