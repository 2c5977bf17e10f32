//! Audio data types and the frame ring buffer.
//!
//! # Data Types
//! - [`AudioSample`] - Trait for audio sample types (i16, f32, etc.)
//! - [`frame::AudioBuffer`] - A buffer of interleaved audio samples
//!
//! # Buffers
//! - [`buffers::AudioRingBuffer`] - Fixed-capacity frame ring with an
//!   evict-oldest overflow policy

pub mod buffers;
pub mod frame;
pub mod sample;

pub use buffers::AudioRingBuffer;
pub use frame::AudioBuffer;
pub use sample::AudioSample;
