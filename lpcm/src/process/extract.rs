use std::collections::VecDeque;

use log::{debug, trace};

use crate::structs::tables::PES_PRIVATE_STREAM_1;
use crate::utils::errors::ExtractError;

const PACK_START: u8 = 0xBA;
const PROGRAM_END: u8 = 0xB9;
const SYSTEM_HEADER: u8 = 0xBB;
const PROGRAM_STREAM_MAP: u8 = 0xBC;
const PADDING_STREAM: u8 = 0xBE;
const PRIVATE_STREAM_2: u8 = 0xBF;

/// Payload bytes of one PES packet together with its timestamps.
///
/// For private_stream_1 the payload starts with the LPCM private data area.
/// Timestamps are raw 90 kHz values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesPacket {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub payload: Vec<u8>,
}

impl PesPacket {
    /// First payload byte, which identifies DVD sub streams.
    pub fn sub_stream_id(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

impl AsRef<[u8]> for PesPacket {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Sub stream filter, matched as `sub_stream_id & mask == id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubStreamFilter {
    pub id: u8,
    pub mask: u8,
}

/// Extracts PES packets from an MPEG program stream or bare PES bytes.
///
/// Bytes are pushed in arbitrary chunks; packets are produced through the
/// [`Iterator`] implementation as soon as they are complete. Pack headers,
/// system headers, padding and private_stream_2 packets are skipped.
///
/// ```rust,no_run
/// use lpcm::process::extract::PesExtractor;
///
/// let mut extractor = PesExtractor::default();
/// extractor.push_bytes(&std::fs::read("audio.vob")?);
///
/// for packet in extractor.by_ref().filter_map(Result::ok) {
///     println!("stream {:#04X}: {} bytes", packet.stream_id, packet.payload.len());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct PesExtractor {
    buffer: VecDeque<u8>,
    io_counter: usize,
    stream_id: Option<u8>,
    sub_stream: Option<SubStreamFilter>,
    packets_extracted: usize,
    bytes_skipped: usize,
}

impl Default for PesExtractor {
    fn default() -> Self {
        Self {
            buffer: VecDeque::with_capacity(64 * 1024),
            io_counter: 0,
            stream_id: Some(PES_PRIVATE_STREAM_1),
            sub_stream: None,
            packets_extracted: 0,
            bytes_skipped: 0,
        }
    }
}

impl PesExtractor {
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
        self.io_counter += 1;
    }

    /// Restricts extraction to one PES stream id; `None` yields every stream.
    pub fn set_stream_id(&mut self, stream_id: Option<u8>) {
        self.stream_id = stream_id;
    }

    pub fn set_sub_stream(&mut self, filter: Option<SubStreamFilter>) {
        self.sub_stream = filter;
    }

    pub fn packets_extracted(&self) -> usize {
        self.packets_extracted
    }

    /// Bytes discarded while searching for start codes.
    pub fn bytes_skipped(&self) -> usize {
        self.bytes_skipped
    }

    /// Drops everything before the next `00 00 01` start code.
    fn resync(&mut self) -> bool {
        let found = self
            .buffer
            .iter()
            .zip(self.buffer.iter().skip(1))
            .zip(self.buffer.iter().skip(2))
            .position(|((&a, &b), &c)| a == 0 && b == 0 && c == 1);

        let drop = match found {
            Some(offset) => offset,
            // keep a possible partial start code
            None => self.buffer.len().saturating_sub(2),
        };

        if drop > 0 {
            trace!("Skipping {drop} bytes before start code");
            self.bytes_skipped += drop;
            self.consume_front(drop);
        }

        found.is_some() && self.buffer.len() >= 4
    }

    fn consume_front(&mut self, cnt: usize) {
        self.buffer.drain(..cnt);
    }

    fn pack_header_len(&self) -> Option<usize> {
        let marker = *self.buffer.get(4)?;

        if marker & 0xC0 == 0x40 {
            // MPEG-2, with stuffing
            Some(14 + (*self.buffer.get(13)? & 0x07) as usize)
        } else {
            // MPEG-1
            Some(12)
        }
    }

    fn packet_len(&self) -> Option<usize> {
        let len = u16::from_be_bytes([*self.buffer.get(4)?, *self.buffer.get(5)?]);
        Some(len as usize)
    }

    fn iter_insufficient(&mut self) -> Option<Result<PesPacket, ExtractError>> {
        self.io_counter -= 1;
        Some(Err(ExtractError::InsufficientData))
    }

    fn accepts(&self, packet: &PesPacket) -> bool {
        if self.stream_id.is_some_and(|id| id != packet.stream_id) {
            return false;
        }

        match (self.sub_stream, packet.sub_stream_id()) {
            (Some(filter), Some(id)) => id & filter.mask == filter.id,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

impl Iterator for PesExtractor {
    type Item = Result<PesPacket, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.io_counter == 0 {
            return None;
        }

        loop {
            if !self.resync() {
                return self.iter_insufficient();
            }

            let stream_id = self.buffer[3];

            match stream_id {
                PACK_START => {
                    let Some(len) = self.pack_header_len() else {
                        return self.iter_insufficient();
                    };
                    if self.buffer.len() < len {
                        return self.iter_insufficient();
                    }

                    self.consume_front(len);
                    continue;
                }
                PROGRAM_END => {
                    self.consume_front(4);
                    continue;
                }
                id if id < PROGRAM_END => {
                    // not a stream id, keep searching
                    self.bytes_skipped += 1;
                    self.consume_front(1);
                    continue;
                }
                _ => {}
            }

            let Some(len) = self.packet_len() else {
                return self.iter_insufficient();
            };

            if len == 0 {
                self.consume_front(4);
                return Some(Err(ExtractError::UnboundedPacket(stream_id)));
            }

            if self.buffer.len() < 6 + len {
                return self.iter_insufficient();
            }

            let packet_bytes = self.buffer.drain(..6 + len).skip(6).collect::<Vec<_>>();

            if matches!(
                stream_id,
                SYSTEM_HEADER | PROGRAM_STREAM_MAP | PADDING_STREAM | PRIVATE_STREAM_2
            ) {
                trace!("Skipping {len} bytes of stream {stream_id:#04X}");
                continue;
            }

            let packet = match read_packet(stream_id, packet_bytes) {
                Ok(packet) => packet,
                Err(e) => return Some(Err(e)),
            };

            if !self.accepts(&packet) {
                continue;
            }

            self.packets_extracted += 1;
            return Some(Ok(packet));
        }
    }
}

/// Decodes a 33-bit timestamp from its five byte, marker interleaved form.
pub fn read_timestamp(bytes: &[u8]) -> u64 {
    (((bytes[0] >> 1) & 0x07) as u64) << 30
        | (bytes[1] as u64) << 22
        | ((bytes[2] >> 1) as u64) << 15
        | (bytes[3] as u64) << 7
        | (bytes[4] >> 1) as u64
}

/// Splits the packet body after the 6-byte prefix into header and payload.
fn read_packet(stream_id: u8, body: Vec<u8>) -> Result<PesPacket, ExtractError> {
    let (pts, dts, header_len) = if body.first().is_some_and(|b| b & 0xC0 == 0x80) {
        read_mpeg2_header(stream_id, &body)?
    } else {
        read_mpeg1_header(stream_id, &body)?
    };

    let payload = body[header_len..].to_vec();
    debug!(
        "PES {stream_id:#04X}: {} payload bytes, pts {pts:?}",
        payload.len()
    );

    Ok(PesPacket {
        stream_id,
        pts,
        dts,
        payload,
    })
}

type HeaderFields = (Option<u64>, Option<u64>, usize);

fn read_mpeg2_header(stream_id: u8, body: &[u8]) -> Result<HeaderFields, ExtractError> {
    if body.len() < 3 {
        return Err(ExtractError::InvalidPesHeader(stream_id));
    }

    let flags = body[1];
    let header_len = 3 + body[2] as usize;
    if header_len > body.len() {
        return Err(ExtractError::HeaderTooLong {
            header: header_len,
            packet: body.len(),
        });
    }

    let fields = &body[3..header_len];
    let pts = if flags & 0x80 != 0 {
        let bytes = fields
            .get(..5)
            .ok_or(ExtractError::InvalidPesHeader(stream_id))?;
        Some(read_timestamp(bytes))
    } else {
        None
    };
    let dts = if flags & 0xC0 == 0xC0 {
        let bytes = fields
            .get(5..10)
            .ok_or(ExtractError::InvalidPesHeader(stream_id))?;
        Some(read_timestamp(bytes))
    } else {
        None
    };

    Ok((pts, dts, header_len))
}

fn read_mpeg1_header(stream_id: u8, body: &[u8]) -> Result<HeaderFields, ExtractError> {
    let mut pos = body.iter().take_while(|&&b| b == 0xFF).count();

    if body.get(pos).is_some_and(|b| b & 0xC0 == 0x40) {
        // STD buffer scale and size
        pos += 2;
    }

    let marker = *body.get(pos).ok_or(ExtractError::InvalidPesHeader(stream_id))?;
    let (pts, dts, len) = match marker & 0xF0 {
        0x20 => {
            let bytes = body
                .get(pos..pos + 5)
                .ok_or(ExtractError::InvalidPesHeader(stream_id))?;
            (Some(read_timestamp(bytes)), None, 5)
        }
        0x30 => {
            let bytes = body
                .get(pos..pos + 10)
                .ok_or(ExtractError::InvalidPesHeader(stream_id))?;
            (
                Some(read_timestamp(&bytes[..5])),
                Some(read_timestamp(&bytes[5..])),
                10,
            )
        }
        _ if marker == 0x0F => (None, None, 1),
        _ => return Err(ExtractError::InvalidPesHeader(stream_id)),
    };

    Ok((pts, dts, pos + len))
}

/// Encodes a timestamp with the given 4-bit prefix, as found in PES headers.
#[cfg(test)]
pub(crate) fn write_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 1,
        (ts >> 22) as u8,
        (((ts >> 15) & 0x7F) as u8) << 1 | 1,
        (ts >> 7) as u8,
        ((ts & 0x7F) as u8) << 1 | 1,
    ]
}

/// Builds an MPEG-2 PES packet with an optional PTS.
#[cfg(test)]
pub(crate) fn mpeg2_pes(stream_id: u8, pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    let header: Vec<u8> = match pts {
        Some(pts) => {
            let mut h = vec![0x81, 0x80, 0x05];
            h.extend_from_slice(&write_timestamp(0x2, pts));
            h
        }
        None => vec![0x81, 0x00, 0x00],
    };

    let len = (header.len() + payload.len()) as u16;
    let mut out = vec![0x00, 0x00, 0x01, stream_id];
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPEG2_PACK: [u8; 14] = [
        0x00, 0x00, 0x01, 0xBA, 0x44, 0x00, 0x04, 0x00, 0x04, 0x01, 0x01, 0x89, 0xC3, 0xF8,
    ];

    #[test]
    fn timestamp_round_trip() {
        let ts = 0x1_2345_6789 & ((1 << 33) - 1);
        assert_eq!(read_timestamp(&write_timestamp(0x2, ts)), ts);
        assert_eq!(read_timestamp(&[0x21, 0x00, 0x01, 0x00, 0x01]), 0);
    }

    #[test]
    fn extracts_program_stream() -> anyhow::Result<()> {
        let mut stream = Vec::new();
        stream.extend_from_slice(&MPEG2_PACK);
        stream.extend_from_slice(&mpeg2_pes(0xBD, Some(90_000), &[0xA0, 1, 2, 3]));
        stream.extend_from_slice(&mpeg2_pes(PADDING_STREAM, None, &[0xFF; 16]));
        stream.extend_from_slice(&mpeg2_pes(0xE0, Some(1), &[0; 8]));
        stream.extend_from_slice(&mpeg2_pes(0xBD, None, &[0xA1, 4, 5]));
        stream.extend_from_slice(&[0x00, 0x00, 0x01, PROGRAM_END]);

        let mut extractor = PesExtractor::default();
        extractor.push_bytes(&stream);

        let packet = extractor.next().unwrap()?;
        assert_eq!(packet.stream_id, 0xBD);
        assert_eq!(packet.pts, Some(90_000));
        assert_eq!(packet.payload, vec![0xA0, 1, 2, 3]);

        let packet = extractor.next().unwrap()?;
        assert_eq!(packet.pts, None);
        assert_eq!(packet.sub_stream_id(), Some(0xA1));

        assert!(matches!(
            extractor.next(),
            Some(Err(ExtractError::InsufficientData))
        ));
        assert!(extractor.next().is_none());
        assert_eq!(extractor.packets_extracted(), 2);

        Ok(())
    }

    #[test]
    fn packets_split_across_pushes() -> anyhow::Result<()> {
        let stream = mpeg2_pes(0xBD, Some(3_600), &[0xA0; 100]);
        let mut extractor = PesExtractor::default();

        extractor.push_bytes(&stream[..50]);
        assert!(matches!(
            extractor.next(),
            Some(Err(ExtractError::InsufficientData))
        ));
        assert!(extractor.next().is_none());

        extractor.push_bytes(&stream[50..]);
        let packet = extractor.next().unwrap()?;
        assert_eq!(packet.payload.len(), 100);
        assert_eq!(packet.pts, Some(3_600));

        Ok(())
    }

    #[test]
    fn sub_stream_filter() -> anyhow::Result<()> {
        let mut stream = Vec::new();
        stream.extend_from_slice(&mpeg2_pes(0xBD, None, &[0x80, 0, 0, 0]));
        stream.extend_from_slice(&mpeg2_pes(0xBD, None, &[0xA2, 0, 0, 0]));

        let mut extractor = PesExtractor::default();
        extractor.set_sub_stream(Some(SubStreamFilter {
            id: 0xA0,
            mask: 0xF8,
        }));
        extractor.push_bytes(&stream);

        let packet = extractor.next().unwrap()?;
        assert_eq!(packet.sub_stream_id(), Some(0xA2));

        Ok(())
    }

    #[test]
    fn skips_garbage_and_rejects_unbounded() {
        let mut stream = vec![0x12, 0x34, 0x00, 0x00, 0x01, 0xBD, 0x00, 0x00];
        stream.extend_from_slice(&mpeg2_pes(0xBD, None, &[0xA0]));

        let mut extractor = PesExtractor::default();
        extractor.push_bytes(&stream);

        assert!(matches!(
            extractor.next(),
            Some(Err(ExtractError::UnboundedPacket(0xBD)))
        ));
        assert!(matches!(extractor.next(), Some(Ok(_))));
        assert_eq!(extractor.bytes_skipped(), 4);
    }

    #[test]
    fn mpeg1_packet_header() -> anyhow::Result<()> {
        let mut body = vec![0xFF, 0xFF, 0x40, 0x20];
        body.extend_from_slice(&write_timestamp(0x2, 1234));
        body.extend_from_slice(&[9, 9]);

        let packet = read_packet(0xBD, body)?;
        assert_eq!(packet.pts, Some(1234));
        assert_eq!(packet.payload, vec![9, 9]);

        assert!(matches!(
            read_packet(0xBD, vec![0xFF, 0x55]),
            Err(ExtractError::InvalidPesHeader(0xBD))
        ));

        Ok(())
    }
}
