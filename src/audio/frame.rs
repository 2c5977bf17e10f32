use anyhow::Result;

use crate::audio::AudioSample;

/// A type-safe audio buffer with compile-time channel count and sample rate.
///
/// Holds interleaved samples; the length is always a multiple of the channel
/// count so downstream consumers can assume whole sample frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    data: Vec<Sample>,
}

impl<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32>
    AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>
{
    /// Create a new audio buffer from raw interleaved samples.
    ///
    /// Returns an error if the data length is not a multiple of the channel
    /// count.
    pub fn new(data: Vec<Sample>) -> Result<Self> {
        if !data.is_empty() && data.len() % CHANNELS != 0 {
            anyhow::bail!(
                "Data length {} must be a multiple of channels {}",
                data.len(),
                CHANNELS
            );
        }
        Ok(Self { data })
    }

    /// Returns the number of samples per channel.
    pub fn samples_per_channel(&self) -> usize {
        self.data.len() / CHANNELS
    }

    pub const fn channels(&self) -> usize {
        CHANNELS
    }

    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Access the underlying raw sample data.
    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    /// Consumes the buffer and returns the raw vector.
    pub fn into_inner(self) -> Vec<Sample> {
        self.data
    }
}

impl<Sample: AudioSample, const CHANNELS: usize, const SAMPLE_RATE: u32>
    AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>
{
    /// A buffer of `samples` interleaved silent samples.
    ///
    /// `samples` is rounded down to a whole multiple of the channel count.
    pub fn silent(samples: usize) -> Self {
        Self {
            data: vec![Sample::silence(); samples - samples % CHANNELS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_buffer_creation() {
        let buffer = AudioBuffer::<i16, 2, 48000>::new(vec![100, -100, 200, -200]).unwrap();
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.samples_per_channel(), 2);
        assert_eq!(buffer.data(), &[100, -100, 200, -200]);
    }

    #[test]
    fn test_audio_buffer_rejects_partial_frames() {
        assert!(AudioBuffer::<i16, 2, 48000>::new(vec![0; 961]).is_err());
    }

    #[test]
    fn test_silent_buffer() {
        let buffer = AudioBuffer::<i16, 2, 48000>::silent(7);
        assert_eq!(buffer.len(), 6);
        assert!(buffer.data().iter().all(|&s| s == 0));
    }
}
