//! Per-peer stream registry.
//!
//! Each remote peer's audio gets its own [`InboundAudioStream`]; streams
//! share nothing, so peers are processed in parallel without coordination.
//! The registry routes incoming packets to the right stream (creating it on
//! first contact), mixes every peer's popped audio into one output, and
//! expires peers that go silent.
//!
//! # Thread Safety
//!
//! Uses [`DashMap`] internally for lock-free concurrent access between the
//! network receiver thread (pushes packets) and the audio output thread
//! (pulls mixed audio).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::audio::frame::AudioBuffer;
use crate::audio::AudioSample;
use crate::pipeline::Source;
use crate::stream::inbound::{InboundAudioStream, StreamStatsSnapshot};
use crate::stream::packet::PayloadParser;
use crate::stream::settings::StreamSettings;

const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Unique identifier for a remote peer, derived from their socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(SocketAddr);

impl PeerId {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn as_socket_addr(&self) -> &SocketAddr {
        &self.0
    }
}

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct PeerEntry<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    stream: InboundAudioStream<Sample, Parser, CHANNELS, SAMPLE_RATE>,
    last_seen: Instant,
}

/// Routes packets to per-peer jitter buffers and mixes their output.
pub struct StreamRegistry<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    streams: DashMap<PeerId, PeerEntry<Sample, Parser, CHANNELS, SAMPLE_RATE>>,
    frame_samples: usize,
    frame_capacity: usize,
    settings: AtomicCell<StreamSettings>,
    parser: Parser,
    peer_timeout: Duration,
}

impl<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32>
    StreamRegistry<Sample, Parser, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample> + Clone,
{
    pub fn new(
        frame_samples: usize,
        frame_capacity: usize,
        settings: StreamSettings,
        parser: Parser,
    ) -> Self {
        Self {
            streams: DashMap::new(),
            frame_samples,
            frame_capacity,
            settings: AtomicCell::new(settings),
            parser,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }

    pub fn with_peer_timeout(mut self, peer_timeout: Duration) -> Self {
        self.peer_timeout = peer_timeout;
        self
    }

    /// Route one received packet to its peer's stream, creating the stream
    /// on first contact. Malformed packets are logged and dropped; the peer
    /// stays registered.
    pub fn ingest(&self, peer: PeerId, bytes: &[u8]) {
        let mut entry = self.streams.entry(peer).or_insert_with(|| {
            info!("Creating inbound stream for new peer: {}", peer);
            PeerEntry {
                stream: InboundAudioStream::new(
                    self.frame_samples,
                    self.frame_capacity,
                    self.settings.load(),
                    self.parser.clone(),
                ),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        if let Err(e) = entry.stream.ingest(bytes) {
            warn!("Dropped packet from {}: {:?}", peer, e);
        }
    }

    /// Pull up to `max_samples` from every peer and mix them together.
    ///
    /// Returns `None` when no stream produced anything.
    pub fn pull_and_mix(
        &self,
        max_samples: usize,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        let mut mixed: Vec<f64> = vec![0.0; max_samples];
        let mut produced = 0usize;

        for entry in self.streams.iter() {
            if let Some(buffer) = entry.stream.pop_samples(max_samples, false, true) {
                produced = produced.max(buffer.len());
                for (i, sample) in buffer.data().iter().enumerate() {
                    mixed[i] += sample.to_f64_normalized();
                }
            }
        }

        if produced == 0 {
            return None;
        }
        mixed.truncate(produced);
        let samples: Vec<Sample> = mixed.into_iter().map(Sample::from_f64_normalized).collect();
        AudioBuffer::new(samples).ok()
    }

    /// Advance every stream's statistics windows.
    pub fn tick_all(&self) {
        for entry in self.streams.iter() {
            entry.stream.tick();
        }
    }

    /// Removes peers that haven't sent anything within the timeout period.
    pub fn cleanup_stale(&self) {
        let now = Instant::now();
        self.streams.retain(|peer, entry| {
            let alive = now.duration_since(entry.last_seen) < self.peer_timeout;
            if !alive {
                info!("Removing stale peer stream: {}", peer);
            }
            alive
        });
    }

    /// Atomically replace the settings for new and existing streams.
    pub fn set_settings(&self, settings: StreamSettings) {
        self.settings.store(settings);
        for entry in self.streams.iter() {
            entry.stream.set_settings(settings);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.streams.len()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.streams.iter().map(|entry| *entry.key()).collect()
    }

    /// Statistics snapshot for one peer's stream.
    pub fn stats(&self, peer: PeerId) -> Option<StreamStatsSnapshot> {
        self.streams.get(&peer).map(|entry| entry.stream.stats())
    }
}

impl<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> Source
    for StreamRegistry<Sample, Parser, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample> + Clone,
{
    type Output = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;

    fn pull(&self, len: usize) -> Option<Self::Output> {
        self.pull_and_mix(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::packet::RawPcmParser;

    const FRAME: usize = 480;

    type TestRegistry = StreamRegistry<i16, RawPcmParser, 1, 48000>;

    fn peer(port: u16) -> PeerId {
        PeerId::from(SocketAddr::from(([192, 168, 1, 10], port)))
    }

    fn registry() -> TestRegistry {
        StreamRegistry::new(FRAME, 50, StreamSettings::default(), RawPcmParser)
    }

    fn audio_bytes(seq: u16, fill: i16) -> Vec<u8> {
        RawPcmParser::audio_packet(seq, &vec![fill; FRAME])
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_stream_created_per_peer() {
        let registry = registry();
        registry.ingest(peer(1000), &audio_bytes(0, 1));
        registry.ingest(peer(1000), &audio_bytes(1, 1));
        registry.ingest(peer(2000), &audio_bytes(0, 1));
        assert_eq!(registry.peer_count(), 2);
        assert_eq!(registry.stats(peer(1000)).unwrap().sequence.received, 2);
        assert_eq!(registry.stats(peer(2000)).unwrap().sequence.received, 1);
        assert!(registry.stats(peer(3000)).is_none());
    }

    #[test]
    fn test_pull_mixes_peers() {
        let registry = registry();
        registry.ingest(peer(1000), &audio_bytes(0, 1000));
        registry.ingest(peer(2000), &audio_bytes(0, 2000));
        let mixed = registry.pull_and_mix(FRAME).unwrap();
        assert_eq!(mixed.len(), FRAME);
        // normalized sum of both peers, within integer conversion error
        assert!((mixed.data()[0] - 3000).abs() <= 2);
    }

    #[test]
    fn test_pull_empty_registry() {
        let registry = registry();
        assert!(registry.pull_and_mix(FRAME).is_none());
    }

    #[test]
    fn test_malformed_packet_keeps_peer() {
        let registry = registry();
        registry.ingest(peer(1000), &[0xde, 0xad]);
        assert_eq!(registry.peer_count(), 1);
        assert_eq!(registry.stats(peer(1000)).unwrap().malformed_packets, 1);
    }

    #[test]
    fn test_stale_peers_expire() {
        let registry = StreamRegistry::<i16, RawPcmParser, 1, 48000>::new(
            FRAME,
            50,
            StreamSettings::default(),
            RawPcmParser,
        )
        .with_peer_timeout(Duration::ZERO);
        registry.ingest(peer(1000), &audio_bytes(0, 1));
        registry.cleanup_stale();
        assert_eq!(registry.peer_count(), 0);
    }

    #[test]
    fn test_set_settings_applies_to_existing_streams() {
        let registry = registry();
        registry.ingest(peer(1000), &audio_bytes(0, 1));
        let settings = StreamSettings {
            dynamic_jitter_buffers: false,
            static_desired_jitter_buffer_frames: 7,
            ..StreamSettings::default()
        };
        registry.set_settings(settings);
        assert_eq!(registry.stats(peer(1000)).unwrap().desired_frames, 7);
    }
}
