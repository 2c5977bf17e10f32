//! Periodic maintenance driver for a stream registry.
//!
//! The control loop needs a low-frequency heartbeat: it advances the
//! statistics windows and expires peers that went silent. The engine itself
//! never spawns anything; a host that already has its own scheduler can
//! call [`StreamRegistry::tick_all`] directly instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use crate::audio::AudioSample;
use crate::stream::packet::PayloadParser;
use crate::stream::registry::StreamRegistry;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn a task that ticks every stream once per second until `shutdown`
/// is set.
pub fn spawn_ticker<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32>(
    registry: Arc<StreamRegistry<Sample, Parser, CHANNELS, SAMPLE_RATE>>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample> + Clone + 'static,
{
    tokio::spawn(async move {
        let mut tick = interval(TICK_INTERVAL);
        while !shutdown.load(Ordering::Relaxed) {
            tick.tick().await;
            registry.tick_all();
            registry.cleanup_stale();
        }
        info!("Stream ticker shutting down");
    })
}
