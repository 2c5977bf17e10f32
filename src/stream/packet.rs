//! Wire envelope for inbound stream packets and the payload parsing strategy.
//!
//! The transport hands the engine opaque byte blobs. The envelope pins down
//! only what the engine itself needs: a packet-type tag, the 16-bit sequence
//! number, a stream-specific properties block, and the raw payload. What the
//! properties and payload mean belongs to the concrete stream kind, injected
//! as a [`PayloadParser`].

use anyhow::{bail, Context, Result};
use rkyv::{Archive, Deserialize, Serialize};

/// Tag carried by every packet.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(compare(PartialEq))]
pub enum PacketType {
    /// Ordinary audio payload.
    Audio,
    /// A sender-side silence marker: carries a sample count, no payload.
    SilentAudio,
}

/// One packet as it travels over the wire.
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[rkyv(compare(PartialEq))]
pub struct StreamPacket {
    pub packet_type: PacketType,
    pub sequence_number: u16,
    pub properties: Vec<u8>,
    pub payload: Vec<u8>,
}

impl StreamPacket {
    /// Serialize the packet using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .context("Serialization error")
    }

    /// Deserialize a packet from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rkyv::from_bytes::<StreamPacket, rkyv::rancor::Error>(bytes)
            .context("Deserialization error")
    }
}

/// Decodes the stream-specific portion of a packet.
///
/// The engine needs two facts from a packet body: how many samples the
/// packet covers (to size silence synthesis for detected gaps) and the
/// decoded samples themselves. Each concrete stream kind supplies both.
pub trait PayloadParser<Sample>: Send + Sync {
    /// Parse the properties block; returns the number of interleaved samples
    /// this packet covers.
    fn parse_stream_properties(&self, packet_type: PacketType, properties: &[u8])
        -> Result<usize>;

    /// Decode the payload into interleaved samples.
    fn parse_audio_data(
        &self,
        packet_type: PacketType,
        payload: &[u8],
        num_samples: usize,
    ) -> Result<Vec<Sample>>;
}

/// Default stream kind: the properties block is a little-endian u32 sample
/// count and the payload is raw 16-bit little-endian PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPcmParser;

impl PayloadParser<i16> for RawPcmParser {
    fn parse_stream_properties(
        &self,
        _packet_type: PacketType,
        properties: &[u8],
    ) -> Result<usize> {
        let bytes: [u8; 4] = properties
            .try_into()
            .context("properties block must be a 4-byte sample count")?;
        Ok(u32::from_le_bytes(bytes) as usize)
    }

    fn parse_audio_data(
        &self,
        packet_type: PacketType,
        payload: &[u8],
        num_samples: usize,
    ) -> Result<Vec<i16>> {
        match packet_type {
            PacketType::SilentAudio => Ok(vec![0; num_samples]),
            PacketType::Audio => {
                if payload.len() != num_samples * 2 {
                    bail!(
                        "payload is {} bytes but properties promised {} samples",
                        payload.len(),
                        num_samples
                    );
                }
                Ok(payload
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect())
            }
        }
    }
}

impl RawPcmParser {
    /// Build an audio packet in this parser's wire format.
    pub fn audio_packet(sequence_number: u16, samples: &[i16]) -> StreamPacket {
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        StreamPacket {
            packet_type: PacketType::Audio,
            sequence_number,
            properties: (samples.len() as u32).to_le_bytes().to_vec(),
            payload,
        }
    }

    /// Build a silence marker covering `num_samples` samples.
    pub fn silent_packet(sequence_number: u16, num_samples: usize) -> StreamPacket {
        StreamPacket {
            packet_type: PacketType::SilentAudio,
            sequence_number,
            properties: (num_samples as u32).to_le_bytes().to_vec(),
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization() {
        let packet = RawPcmParser::audio_packet(42, &[100, -100, 200, -200]);
        let bytes = packet.to_bytes().unwrap();
        let decoded = StreamPacket::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Audio);
        assert_eq!(decoded.sequence_number, 42);
        assert_eq!(decoded.payload, packet.payload);
    }

    #[test]
    fn test_raw_pcm_round_trip() {
        let samples = vec![1i16, -2, 30000, -30000];
        let packet = RawPcmParser::audio_packet(0, &samples);
        let parser = RawPcmParser;
        let count = parser
            .parse_stream_properties(packet.packet_type, &packet.properties)
            .unwrap();
        assert_eq!(count, 4);
        let decoded = parser
            .parse_audio_data(packet.packet_type, &packet.payload, count)
            .unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_silent_packet_has_no_payload() {
        let packet = RawPcmParser::silent_packet(7, 960);
        let parser = RawPcmParser;
        assert!(packet.payload.is_empty());
        assert_eq!(
            parser
                .parse_stream_properties(packet.packet_type, &packet.properties)
                .unwrap(),
            960
        );
    }

    #[test]
    fn test_mismatched_payload_rejected() {
        let parser = RawPcmParser;
        assert!(parser
            .parse_audio_data(PacketType::Audio, &[0u8; 6], 4)
            .is_err());
    }

    #[test]
    fn test_truncated_properties_rejected() {
        let parser = RawPcmParser;
        assert!(parser
            .parse_stream_properties(PacketType::Audio, &[1, 2])
            .is_err());
    }
}
