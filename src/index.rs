use std::path::Path;

use anyhow::Result;
use lpcm::process::collate::CollatedFrame;
use lpcm::process::parse::ParsedFrame;
use lpcm::structs::variant::{StreamVariant, WordSize};
use serde::{Deserialize, Serialize};

pub const INDEX_VERSION: &str = "1.0";

/// Frame index written next to a collated `.lpcm` file.
///
/// Offsets point into the data file; every frame there starts with its own
/// private data area.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameIndex {
    version: String,
    variant: String,
    data: String,
    #[serde(default)]
    frames: Vec<FrameEntry>,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEntry {
    index: u64,
    offset: u64,
    size: usize,
    access_units: u32,
    samples: u32,
    /// Presentation time in microseconds.
    time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decode_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<StreamParameters>,
}

/// Decoder configuration, repeated only where it changes.
#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParameters {
    sample_rate: u32,
    word_size: u32,
    channels: u8,
    channel_assignment: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_2: Option<ChannelGroup2>,
    #[serde(default)]
    emphasis: bool,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    drc_code: u8,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelGroup2 {
    sample_rate: u32,
    word_size: u32,
    bit_shift: u8,
}

impl StreamParameters {
    fn from_parsed(parsed: &ParsedFrame) -> Self {
        let header = &parsed.header;

        let group_2 = (header.variant == StreamVariant::DvdAudio
            && header.word_size_2 != WordSize::None)
            .then(|| ChannelGroup2 {
                sample_rate: header.sampling_freq_2.hz(),
                word_size: header.word_size_2.bits(),
                bit_shift: header.bit_shift_channel_2,
            });

        Self {
            sample_rate: parsed.sample_rate,
            word_size: header.word_size_1.bits(),
            channels: header.channel_count,
            channel_assignment: header.channel_assignment,
            group_2,
            emphasis: header.emphasis_flag,
            mute: header.mute_flag,
            drc_code: parsed.drc_code,
        }
    }
}

impl FrameIndex {
    pub fn new(variant: StreamVariant, data_path: &Path) -> Self {
        let data = data_path
            .file_name()
            .unwrap_or(data_path.as_os_str())
            .to_string_lossy()
            .into_owned();

        Self {
            version: INDEX_VERSION.to_string(),
            variant: variant.to_string(),
            data,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, offset: u64, frame: &CollatedFrame, parsed: &ParsedFrame) {
        self.frames.push(FrameEntry {
            index: parsed.display_frame_index,
            offset,
            size: frame.data.len(),
            access_units: frame.access_units,
            samples: parsed.sample_count,
            time: parsed.playback_time,
            decode_time: parsed.decode_time,
            pts: frame.pts,
            parameters: parsed
                .stream_parameters_changed
                .then(|| StreamParameters::from_parsed(parsed)),
        });
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn serialize_index(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpcm::process::collate::{Collator, CollatorConfig};
    use lpcm::process::extract::PesPacket;
    use lpcm::process::parse::FrameParser;
    use lpcm::structs::header::HeaderOptions;

    #[test]
    fn roundtrip() {
        let yaml_data = r#"version: '1.0'
variant: Blu-ray HDMV
data: movie.lpcm
frames:
- index: 0
  offset: 0
  size: 772
  accessUnits: 4
  samples: 128
  time: 100000
  pts: 9000
  parameters:
    sampleRate: 48000
    wordSize: 16
    channels: 2
    channelAssignment: 1
- index: 1
  offset: 772
  size: 772
  accessUnits: 4
  samples: 128
  time: 102666
  decodeTime: 99666
"#;

        let index: FrameIndex = serde_yaml_ng::from_str(yaml_data).unwrap();
        assert_eq!(index.frame_count(), 2);
        assert_eq!(index.frames[1].offset, 772);
        assert!(index.frames[1].parameters.is_none());
        assert_eq!(
            index.frames[0].parameters.as_ref().map(|p| p.sample_rate),
            Some(48_000)
        );

        let reparsed: FrameIndex =
            serde_yaml_ng::from_str(&index.serialize_index().unwrap()).unwrap();
        assert_eq!(index, reparsed);
    }

    #[test]
    fn parameters_only_on_change() -> Result<()> {
        let mut collator = Collator::new(StreamVariant::BdHdmv, CollatorConfig::default());
        for i in 0..9u64 {
            let mut payload = vec![0x00, 0xC0, 0x11, 0x80];
            payload.resize(4 + 192, 0);
            collator.push_packet(&PesPacket {
                stream_id: 0xBD,
                pts: (i == 0).then_some(0),
                dts: None,
                payload,
            })?;
        }
        collator.flush();

        let mut parser = FrameParser::new(StreamVariant::BdHdmv, HeaderOptions::default());
        let mut index = FrameIndex::new(StreamVariant::BdHdmv, Path::new("/tmp/out.lpcm"));
        let mut offset = 0;
        for frame in collator {
            let parsed = parser.parse(&frame)?;
            index.push(offset, &frame, &parsed);
            offset += frame.data.len() as u64;
        }

        assert_eq!(index.data, "out.lpcm");
        assert!(index.frame_count() >= 2);
        assert!(index.frames[0].parameters.is_some());
        assert!(index.frames[1..].iter().all(|f| f.parameters.is_none()));
        assert_eq!(index.frames[1].offset, index.frames[0].size as u64);

        Ok(())
    }
}
