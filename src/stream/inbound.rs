//! The inbound audio stream controller.
//!
//! One [`InboundAudioStream`] absorbs the network timing variance of a
//! single remote stream. It owns the frame ring buffer, classifies packet
//! sequence numbers, synthesizes silence for detected gaps, and runs the
//! feedback loop that sizes the buffer: quick to grow when starvation
//! repeats, slow to shrink once the stream has been healthy for a while.
//!
//! # Concurrency
//!
//! A packet-ingestion thread, an audio-render thread, and a low-frequency
//! tick all call into the same instance. All mutable state sits behind one
//! coarse mutex held only for the duration of a single ingest, pop, or
//! tick; nothing here blocks on I/O. The settings snapshot lives in an
//! [`AtomicCell`] so replacing it never contends with the audio path.
//!
//! Time enters through the `*_at(now_usecs)` variants; the plain methods
//! sample the stream's own monotonic clock. Simulations and tests drive the
//! `_at` forms directly.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam::atomic::AtomicCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::buffers::AudioRingBuffer;
use crate::audio::frame::AudioBuffer;
use crate::audio::AudioSample;
use crate::pipeline::{Sink, Source};
use crate::stats::sequence::{Arrival, SequenceStats, SequenceTracker};
use crate::stats::starve::StarveHistory;
use crate::stats::time_weighted::TimeWeightedAvg;
use crate::stats::USECS_PER_SECOND;
use crate::stream::estimator::JitterEstimator;
use crate::stream::packet::{PacketType, PayloadParser, StreamPacket};
use crate::stream::settings::StreamSettings;

/// How much time-weighted frames-available history accumulates before
/// `current_jitter_buffer_frames` refreshes and the accumulator resets.
const FRAMES_AVAILABLE_STAT_WINDOW_USECS: u64 = 2 * USECS_PER_SECOND;

/// Starve timestamps retained for the escalation window.
const STARVE_HISTORY_CAPACITY: usize = 100;

/// Lifecycle phase of an inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamPhase {
    /// No frame has ever been written.
    Starting,
    /// Filling toward the desired depth; pops are withheld.
    Buffering,
    /// Pops are served normally.
    Steady,
    /// A pop could not be satisfied; refilling.
    Starved,
}

/// What ingesting one packet did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Payload (or synthesized silence) entered the buffer.
    Written { samples: usize },
    /// Out-of-order arrival of an already-passed slot; counted, not written.
    Late,
    /// Repeat of a consumed packet; counted, not written.
    Duplicate,
}

/// Read-only statistics snapshot, shaped for a periodic report packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamStatsSnapshot {
    pub sequence: SequenceStats,
    pub frames_available: usize,
    pub frames_available_average: f64,
    pub current_jitter_buffer_frames: usize,
    pub desired_frames: usize,
    pub desired_frames_using_max_gap: usize,
    pub desired_frames_using_stddev: usize,
    pub starve_count: u64,
    pub consecutive_not_mixed: u64,
    pub overflow_count: u64,
    pub silent_frames_dropped: u64,
    pub old_frames_dropped: u64,
    pub malformed_packets: u64,
    pub phase: StreamPhase,
}

struct StreamCore<Sample> {
    ring: AudioRingBuffer<Sample>,
    sequence: SequenceTracker,
    estimator: JitterEstimator,
    starve_history: StarveHistory,
    frames_available_stat: TimeWeightedAvg,
    phase: StreamPhase,
    desired_frames: usize,
    current_jitter_buffer_frames: usize,
    starve_count: u64,
    consecutive_not_mixed: u64,
    silent_frames_dropped: u64,
    old_frames_dropped: u64,
    malformed_packets: u64,
    last_pop_succeeded: bool,
}

/// Jitter-buffering controller for one remote peer's audio stream.
pub struct InboundAudioStream<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    settings: AtomicCell<StreamSettings>,
    parser: Parser,
    epoch: Instant,
    frame_samples: usize,
    frame_capacity: usize,
    frame_duration_usecs: u64,
    core: Mutex<StreamCore<Sample>>,
}

fn clamp_desired(frames: usize, frame_capacity: usize, max_frames_over_desired: usize) -> usize {
    let ceiling = frame_capacity.saturating_sub(max_frames_over_desired).max(1);
    frames.clamp(1, ceiling)
}

impl<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32>
    InboundAudioStream<Sample, Parser, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample>,
{
    pub fn new(
        frame_samples: usize,
        frame_capacity: usize,
        settings: StreamSettings,
        parser: Parser,
    ) -> Self {
        assert!(CHANNELS > 0, "streams carry at least one channel");
        assert!(
            frame_samples % CHANNELS == 0,
            "frame size must be a whole number of sample frames"
        );
        let frame_duration_usecs =
            frame_samples as u64 * USECS_PER_SECOND / (CHANNELS as u64 * SAMPLE_RATE as u64);
        let estimator = JitterEstimator::new(
            frame_duration_usecs,
            settings.window_seconds_for_desired_calc_on_too_many_starves,
            settings.window_seconds_for_desired_reduction,
        );
        let initial_desired = if settings.dynamic_jitter_buffers {
            1
        } else {
            settings.static_desired_jitter_buffer_frames
        };
        Self {
            settings: AtomicCell::new(settings),
            parser,
            epoch: Instant::now(),
            frame_samples,
            frame_capacity,
            frame_duration_usecs,
            core: Mutex::new(StreamCore {
                ring: AudioRingBuffer::new(frame_samples, frame_capacity),
                sequence: SequenceTracker::new(),
                estimator,
                starve_history: StarveHistory::new(STARVE_HISTORY_CAPACITY),
                frames_available_stat: TimeWeightedAvg::new(),
                phase: StreamPhase::Starting,
                desired_frames: clamp_desired(
                    initial_desired,
                    frame_capacity,
                    settings.max_frames_over_desired,
                ),
                current_jitter_buffer_frames: 0,
                starve_count: 0,
                consecutive_not_mixed: 0,
                silent_frames_dropped: 0,
                old_frames_dropped: 0,
                malformed_packets: 0,
                last_pop_succeeded: false,
            }),
        }
    }

    fn now_usecs(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    // ---- ingestion ----

    /// Decode and ingest one packet received from the transport.
    pub fn ingest(&self, bytes: &[u8]) -> Result<IngestOutcome> {
        self.ingest_at(self.now_usecs(), bytes)
    }

    pub fn ingest_at(&self, now: u64, bytes: &[u8]) -> Result<IngestOutcome> {
        let packet = match StreamPacket::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.core.lock().unwrap().malformed_packets += 1;
                return Err(e).context("dropping undecodable packet");
            }
        };
        self.ingest_packet_at(now, packet)
    }

    /// Ingest a packet the transport has already decoded.
    pub fn ingest_packet(&self, packet: StreamPacket) -> Result<IngestOutcome> {
        self.ingest_packet_at(self.now_usecs(), packet)
    }

    pub fn ingest_packet_at(&self, now: u64, packet: StreamPacket) -> Result<IngestOutcome> {
        let settings = self.settings.load();
        let mut core = self.core.lock().unwrap();
        let core = &mut *core;

        let arrival = core.sequence.classify(packet.sequence_number);
        let _gap = core.estimator.record_arrival(
            now,
            settings.desired_frames_padding,
            settings.stddev_multiplier,
        );
        self.recompute_desired(core, &settings, now);

        let outcome = match arrival {
            Arrival::Late => {
                debug!(seq = packet.sequence_number, "late packet, payload stale");
                IngestOutcome::Late
            }
            Arrival::Duplicate => {
                debug!(seq = packet.sequence_number, "duplicate packet dropped");
                IngestOutcome::Duplicate
            }
            Arrival::InOrder | Arrival::Early { .. } => {
                let num_samples = match self
                    .parser
                    .parse_stream_properties(packet.packet_type, &packet.properties)
                {
                    Ok(n) if n % CHANNELS == 0 => n,
                    Ok(n) => {
                        core.malformed_packets += 1;
                        anyhow::bail!("sample count {} splits a {}-channel frame", n, CHANNELS);
                    }
                    Err(e) => {
                        core.malformed_packets += 1;
                        return Err(e).context("dropping packet with bad stream properties");
                    }
                };

                if let Arrival::Early { lost } = arrival {
                    let missed = lost as usize * num_samples;
                    self.write_droppable_silent_samples(core, &settings, missed);
                    debug!(lost, samples = missed, "filled sequence gap with silence");
                }

                match packet.packet_type {
                    PacketType::SilentAudio => {
                        self.write_droppable_silent_samples(core, &settings, num_samples);
                        IngestOutcome::Written {
                            samples: num_samples,
                        }
                    }
                    PacketType::Audio => {
                        let samples = match self.parser.parse_audio_data(
                            packet.packet_type,
                            &packet.payload,
                            num_samples,
                        ) {
                            Ok(samples) if samples.len() % CHANNELS == 0 => samples,
                            Ok(samples) => {
                                core.malformed_packets += 1;
                                anyhow::bail!(
                                    "decoded {} samples, not a whole number of {}-channel frames",
                                    samples.len(),
                                    CHANNELS
                                );
                            }
                            Err(e) => {
                                core.malformed_packets += 1;
                                return Err(e).context("dropping packet with bad audio data");
                            }
                        };
                        core.ring.write_samples(&samples);
                        IngestOutcome::Written {
                            samples: samples.len(),
                        }
                    }
                }
            }
        };

        if let IngestOutcome::Written { .. } = outcome {
            self.after_write(core, &settings);
        }
        Ok(outcome)
    }

    /// Write silence, shedding whole silent frames when the smoothed buffer
    /// depth already runs above target. Dropping silence instead of audio is
    /// how standing latency drains without an audible glitch.
    fn write_droppable_silent_samples(
        &self,
        core: &mut StreamCore<Sample>,
        settings: &StreamSettings,
        num_samples: usize,
    ) {
        let desired_plus_padding = core.desired_frames + settings.desired_frames_padding;
        let mut to_write = num_samples;

        if num_samples >= self.frame_samples
            && core.current_jitter_buffer_frames > desired_plus_padding
        {
            let droppable = core.current_jitter_buffer_frames - desired_plus_padding;
            let received_frames = num_samples / self.frame_samples;
            let dropped = droppable.min(received_frames);
            core.current_jitter_buffer_frames -= dropped;
            core.silent_frames_dropped += dropped as u64;
            core.frames_available_stat.start_new_window();
            to_write = num_samples - dropped * self.frame_samples;
            debug!(dropped, "shed silent frames to reduce standing latency");
        }

        core.ring.write_silent_samples(to_write);
    }

    fn after_write(&self, core: &mut StreamCore<Sample>, settings: &StreamSettings) {
        // Proactive latency reduction, distinct from the ring's own
        // overwrite: anything beyond desired + slack is stale audio.
        let limit = core.desired_frames + settings.max_frames_over_desired;
        let frames_available = core.ring.frames_available();
        if frames_available > limit {
            let excess = frames_available - limit;
            core.ring.skip_oldest_samples(excess * self.frame_samples);
            core.old_frames_dropped += excess as u64;
            debug!(dropped = excess, "dropped old frames to reduce latency");
        }

        match core.phase {
            StreamPhase::Starting => {
                info!("first frames buffered, stream started");
                core.phase = StreamPhase::Buffering;
            }
            StreamPhase::Starved => core.phase = StreamPhase::Buffering,
            _ => {}
        }
        if core.phase == StreamPhase::Buffering
            && core.ring.frames_available() >= core.desired_frames
        {
            debug!(
                frames = core.ring.frames_available(),
                desired = core.desired_frames,
                "refilled to desired depth"
            );
            core.phase = StreamPhase::Steady;
        }
    }

    /// Recomputation that runs on packet arrival and on tick: pin the depth
    /// in static mode, otherwise let it relax toward the short-window
    /// estimate once the stream has been starve-free long enough. Growth
    /// happens only when a starve is recorded.
    fn recompute_desired(&self, core: &mut StreamCore<Sample>, settings: &StreamSettings, now: u64) {
        if !settings.dynamic_jitter_buffers {
            core.desired_frames = clamp_desired(
                settings.static_desired_jitter_buffer_frames,
                self.frame_capacity,
                settings.max_frames_over_desired,
            );
            return;
        }

        let quiet_usecs = settings.window_seconds_for_desired_reduction * USECS_PER_SECOND;
        if !core.starve_history.quiet_for(now, quiet_usecs) {
            return;
        }
        if let Some(target) = core.estimator.reduction_target(now) {
            let target = clamp_desired(target, self.frame_capacity, settings.max_frames_over_desired);
            if target < core.desired_frames {
                debug!(
                    from = core.desired_frames,
                    to = target,
                    "relaxing desired depth after starve-free window"
                );
                core.desired_frames = target;
            }
        }
    }

    fn record_starve(&self, core: &mut StreamCore<Sample>, settings: &StreamSettings, now: u64) {
        core.starve_count += 1;
        core.starve_history.record(now);
        core.phase = StreamPhase::Starved;

        if !settings.dynamic_jitter_buffers {
            return;
        }

        let window_usecs =
            settings.window_seconds_for_desired_calc_on_too_many_starves * USECS_PER_SECOND;
        let starves_in_window = core.starve_history.count_within(now, window_usecs);
        if starves_in_window <= settings.window_starve_threshold {
            return;
        }

        // Too many starves: grow to whatever the lookback window justifies.
        // The packet that would have ended this starve is still in flight,
        // so the max-gap method also considers how overdue it already is.
        let calculated = if settings.use_stddev_for_jitter_calc {
            core.estimator.desired_from_stddev()
        } else {
            core.estimator
                .desired_from_max_gap()
                .max(core.estimator.frames_overdue(now))
        };
        let escalated = clamp_desired(calculated, self.frame_capacity, settings.max_frames_over_desired);
        if escalated > core.desired_frames {
            info!(
                from = core.desired_frames,
                to = escalated,
                starves = starves_in_window,
                "escalating desired depth after repeated starvation"
            );
            core.desired_frames = escalated;
        }
    }

    // ---- playback ----

    /// Pop up to `max_frames` whole frames.
    pub fn pop_frames(
        &self,
        max_frames: usize,
        all_or_nothing: bool,
        starve_if_nothing_popped: bool,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        self.pop_frames_at(
            self.now_usecs(),
            max_frames,
            all_or_nothing,
            starve_if_nothing_popped,
        )
    }

    pub fn pop_frames_at(
        &self,
        now: u64,
        max_frames: usize,
        all_or_nothing: bool,
        starve_if_nothing_popped: bool,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        self.pop_units(
            now,
            self.frame_samples,
            max_frames,
            all_or_nothing,
            starve_if_nothing_popped,
        )
    }

    /// Pop up to `max_samples` interleaved samples (rounded down to whole
    /// sample frames across channels).
    pub fn pop_samples(
        &self,
        max_samples: usize,
        all_or_nothing: bool,
        starve_if_nothing_popped: bool,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        self.pop_samples_at(
            self.now_usecs(),
            max_samples,
            all_or_nothing,
            starve_if_nothing_popped,
        )
    }

    pub fn pop_samples_at(
        &self,
        now: u64,
        max_samples: usize,
        all_or_nothing: bool,
        starve_if_nothing_popped: bool,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        self.pop_units(
            now,
            CHANNELS,
            max_samples / CHANNELS,
            all_or_nothing,
            starve_if_nothing_popped,
        )
    }

    fn pop_units(
        &self,
        now: u64,
        unit_samples: usize,
        max_units: usize,
        all_or_nothing: bool,
        starve_if_nothing_popped: bool,
    ) -> Option<AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>> {
        if max_units == 0 {
            return None;
        }
        let settings = self.settings.load();
        let mut core = self.core.lock().unwrap();
        let core = &mut *core;

        // A starved or filling stream resumes popping once depth recovers.
        if matches!(core.phase, StreamPhase::Buffering | StreamPhase::Starved)
            && core.ring.frames_available() >= core.desired_frames
        {
            core.phase = StreamPhase::Steady;
        }
        if core.phase != StreamPhase::Steady {
            core.consecutive_not_mixed += 1;
            core.last_pop_succeeded = false;
            return None;
        }

        let available_units = core.ring.samples_available() / unit_samples;
        let take_units = if available_units >= max_units {
            max_units
        } else if !all_or_nothing && available_units > 0 {
            available_units
        } else {
            if starve_if_nothing_popped {
                self.record_starve(core, &settings, now);
            }
            core.consecutive_not_mixed += 1;
            core.last_pop_succeeded = false;
            return None;
        };

        let samples = core.ring.read_samples(take_units * unit_samples, false);
        core.last_pop_succeeded = true;
        core.consecutive_not_mixed = 0;
        AudioBuffer::new(samples).ok()
    }

    // ---- periodic maintenance ----

    /// Advance the statistics windows. Called roughly once per second by an
    /// external scheduler; tolerant of being called early or late.
    pub fn tick(&self) {
        self.tick_at(self.now_usecs());
    }

    pub fn tick_at(&self, now: u64) {
        let settings = self.settings.load();
        let mut core = self.core.lock().unwrap();
        let core = &mut *core;

        let frames_available = core.ring.frames_available();
        core.frames_available_stat.sample(now, frames_available as f64);
        if core.frames_available_stat.elapsed_usecs() >= FRAMES_AVAILABLE_STAT_WINDOW_USECS {
            core.current_jitter_buffer_frames =
                core.frames_available_stat.average().round() as usize;
            core.frames_available_stat.start_new_window();
        }

        core.estimator.prune(now);
        self.recompute_desired(core, &settings, now);
    }

    // ---- lifecycle ----

    /// Drop buffered audio and restart sequence tracking; historical depth
    /// statistics (gap windows, starve history, desired depth) survive.
    pub fn reset(&self) {
        let mut core = self.core.lock().unwrap();
        core.ring.clear();
        core.sequence.restart();
        core.frames_available_stat.reset();
        core.current_jitter_buffer_frames = 0;
        core.phase = StreamPhase::Starting;
        core.last_pop_succeeded = false;
    }

    /// Zero every counter; buffered audio and the current desired depth are
    /// untouched.
    pub fn reset_stats(&self) {
        let mut core = self.core.lock().unwrap();
        core.sequence.reset_stats();
        core.ring.reset_overflow_count();
        core.starve_count = 0;
        core.consecutive_not_mixed = 0;
        core.silent_frames_dropped = 0;
        core.old_frames_dropped = 0;
        core.malformed_packets = 0;
    }

    /// Drop buffered audio only.
    pub fn clear_buffer(&self) {
        let mut core = self.core.lock().unwrap();
        core.ring.clear();
        core.frames_available_stat.reset();
        core.current_jitter_buffer_frames = 0;
    }

    /// Atomically replace the settings snapshot.
    pub fn set_settings(&self, settings: StreamSettings) {
        self.settings.store(settings);
        let mut core = self.core.lock().unwrap();
        core.estimator.set_windows(
            settings.window_seconds_for_desired_calc_on_too_many_starves,
            settings.window_seconds_for_desired_reduction,
        );
        let desired = if settings.dynamic_jitter_buffers {
            core.desired_frames
        } else {
            settings.static_desired_jitter_buffer_frames
        };
        core.desired_frames =
            clamp_desired(desired, self.frame_capacity, settings.max_frames_over_desired);
    }

    // ---- observers ----

    pub fn settings(&self) -> StreamSettings {
        self.settings.load()
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    pub fn frame_duration_usecs(&self) -> u64 {
        self.frame_duration_usecs
    }

    pub fn frames_available(&self) -> usize {
        self.core.lock().unwrap().ring.frames_available()
    }

    pub fn samples_available(&self) -> usize {
        self.core.lock().unwrap().ring.samples_available()
    }

    pub fn desired_jitter_buffer_frames(&self) -> usize {
        self.core.lock().unwrap().desired_frames
    }

    pub fn phase(&self) -> StreamPhase {
        self.core.lock().unwrap().phase
    }

    pub fn is_starved(&self) -> bool {
        self.phase() == StreamPhase::Starved
    }

    pub fn has_started(&self) -> bool {
        self.phase() != StreamPhase::Starting
    }

    pub fn last_pop_succeeded(&self) -> bool {
        self.core.lock().unwrap().last_pop_succeeded
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        let core = self.core.lock().unwrap();
        StreamStatsSnapshot {
            sequence: core.sequence.stats(),
            frames_available: core.ring.frames_available(),
            frames_available_average: core.frames_available_stat.average(),
            current_jitter_buffer_frames: core.current_jitter_buffer_frames,
            desired_frames: core.desired_frames,
            desired_frames_using_max_gap: core.estimator.desired_from_max_gap(),
            desired_frames_using_stddev: core.estimator.desired_from_stddev(),
            starve_count: core.starve_count,
            consecutive_not_mixed: core.consecutive_not_mixed,
            overflow_count: core.ring.overflow_count(),
            silent_frames_dropped: core.silent_frames_dropped,
            old_frames_dropped: core.old_frames_dropped,
            malformed_packets: core.malformed_packets,
            phase: core.phase,
        }
    }
}

impl<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> Sink
    for InboundAudioStream<Sample, Parser, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample>,
{
    type Input = StreamPacket;

    fn push(&self, input: StreamPacket) {
        if let Err(e) = self.ingest_packet(input) {
            warn!("Error processing packet: {:?}", e);
        }
    }
}

impl<Sample, Parser, const CHANNELS: usize, const SAMPLE_RATE: u32> Source
    for InboundAudioStream<Sample, Parser, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
    Parser: PayloadParser<Sample>,
{
    type Output = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;

    fn pull(&self, len: usize) -> Option<Self::Output> {
        self.pop_samples(len, false, true)
    }
}
