//! Inbound stream engine: packets in, jitter-compensated audio out.
//!
//! # Key Types
//!
//! - [`packet::StreamPacket`] - the wire envelope the transport delivers
//! - [`packet::PayloadParser`] - stream-kind-specific payload decoding
//! - [`inbound::InboundAudioStream`] - the per-peer jitter buffer controller
//! - [`registry::StreamRegistry`] - one controller per remote peer, mixed output
//! - [`ticker::spawn_ticker`] - the once-per-second maintenance heartbeat

pub mod estimator;
pub mod inbound;
pub mod packet;
pub mod registry;
pub mod settings;
pub mod ticker;

pub use estimator::JitterEstimator;
pub use inbound::{InboundAudioStream, IngestOutcome, StreamPhase, StreamStatsSnapshot};
pub use packet::{PacketType, PayloadParser, RawPcmParser, StreamPacket};
pub use registry::{PeerId, StreamRegistry};
pub use settings::StreamSettings;
pub use ticker::spawn_ticker;
