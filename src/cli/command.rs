use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use lpcm::process::collate::CollatorConfig;
use lpcm::process::extract::SubStreamFilter;
use lpcm::structs::header::{HeaderOptions, SampleCountTable};
use lpcm::structs::tables;
use lpcm::structs::variant::{SamplingFreq, StreamVariant};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for inspecting and collating LPCM audio carried in PES packets",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first invalid packet or frame).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print stream parameters and a collation summary.
    Info(InfoArgs),

    /// Collate the stream into decoder-sized frames and write a frame index.
    Collate(CollateArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input program stream or PES file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Debug, Args)]
pub struct CollateArgs {
    /// Input program stream or PES file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for the collated frames (.lpcm) and frame index (.yaml).
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// LPCM variant carried by the input.
    #[arg(long, value_enum)]
    pub variant: Variant,

    /// PES stream id carrying the audio.
    #[arg(long, value_name = "ID", value_parser = parse_byte, default_value = "0xBD")]
    pub stream_id: u8,

    /// Sub-stream id to select (DVD and HD DVD only).
    #[arg(long, value_name = "ID", value_parser = parse_byte)]
    pub substream: Option<u8>,

    /// Accept 192 kHz in DVD-Video headers.
    #[arg(long)]
    pub dvd_video_192k: bool,

    /// Size HD DVD access units with the DVD-Video sample counts.
    #[arg(long)]
    pub hd_dvd_video_sample_counts: bool,

    /// Access units globbed into one frame (default depends on the rate).
    #[arg(long, value_name = "UNITS", value_parser = clap::value_parser!(u32).range(1..))]
    pub glob_threshold: Option<u32>,

    /// Decoder latency in samples, used to derive decode times.
    #[arg(long, value_name = "SAMPLES")]
    pub decode_latency: Option<u32>,
}

impl StreamArgs {
    pub fn header_options(&self) -> HeaderOptions {
        HeaderOptions {
            dvd_video_max_sampling_freq: if self.dvd_video_192k {
                SamplingFreq::F192
            } else {
                SamplingFreq::F96
            },
            hd_dvd_sample_counts: if self.hd_dvd_video_sample_counts {
                SampleCountTable::DvdVideo
            } else {
                SampleCountTable::DvdAudio
            },
        }
    }

    pub fn collator_config(&self) -> CollatorConfig {
        CollatorConfig {
            stream_id: self.stream_id,
            glob_threshold: self.glob_threshold,
            header_options: self.header_options(),
        }
    }

    /// Sub-stream selection for variants whose packets carry a sub-stream id.
    pub fn sub_stream_filter(&self) -> Option<SubStreamFilter> {
        let (id, mask) = match self.variant.into() {
            StreamVariant::DvdVideo | StreamVariant::HdDvd => (
                tables::DVD_VIDEO_SUBSTREAM_ID,
                tables::DVD_VIDEO_SUBSTREAM_ID_MASK,
            ),
            StreamVariant::DvdAudio => (
                tables::DVD_AUDIO_SUBSTREAM_ID,
                tables::DVD_AUDIO_SUBSTREAM_ID_MASK,
            ),
            StreamVariant::BdHdmv | StreamVariant::SpdifIn => {
                if self.substream.is_some() {
                    log::warn!("--substream is ignored for {}", StreamVariant::from(self.variant));
                }
                return None;
            }
        };

        Some(match self.substream {
            Some(id) => SubStreamFilter { id, mask: 0xFF },
            None => SubStreamFilter { id, mask },
        })
    }
}

fn parse_byte(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };

    parsed.map_err(|e| format!("invalid byte value '{value}': {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// DVD-Video LPCM.
    DvdVideo,
    /// DVD-Audio LPCM.
    DvdAudio,
    /// HD DVD LPCM.
    HdDvd,
    /// Blu-ray HDMV LPCM.
    BdHdmv,
    /// S/PDIF input capture.
    SpdifIn,
}

impl From<Variant> for StreamVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::DvdVideo => StreamVariant::DvdVideo,
            Variant::DvdAudio => StreamVariant::DvdAudio,
            Variant::HdDvd => StreamVariant::HdDvd,
            Variant::BdHdmv => StreamVariant::BdHdmv,
            Variant::SpdifIn => StreamVariant::SpdifIn,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
