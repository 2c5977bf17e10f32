//! Adaptive jitter buffering for inbound packetized audio.
//!
//! An unreliable transport delivers audio packets late, early, twice, or
//! never. This crate absorbs that: each remote peer's stream flows into a
//! bounded frame ring buffer whose target depth adapts to the observed
//! inter-packet timing, trading latency against dropout risk.
//!
//! ```text
//! packet bytes ──► StreamRegistry ──► InboundAudioStream (per peer)
//!                                         │  sequence classification
//!                                         │  silence synthesis for gaps
//!                                         │  ring buffer + depth control
//!                                         ▼
//!                              pull_and_mix ──► playback samples
//! ```
//!
//! The depth controller is deliberately asymmetric: repeated starvation
//! grows the buffer immediately, while shrinking requires a sustained
//! starve-free window. See [`stream::inbound`] for the control loop and
//! [`stream::settings::StreamSettings`] for the knobs.

pub mod audio;
pub mod pipeline;
pub mod stats;
pub mod stream;

pub use audio::buffers::AudioRingBuffer;
pub use audio::frame::AudioBuffer;
pub use audio::AudioSample;
pub use pipeline::{Sink, Source};
pub use stream::inbound::{InboundAudioStream, IngestOutcome, StreamPhase, StreamStatsSnapshot};
pub use stream::packet::{PacketType, PayloadParser, RawPcmParser, StreamPacket};
pub use stream::registry::{PeerId, StreamRegistry};
pub use stream::settings::StreamSettings;
pub use stream::ticker::spawn_ticker;
