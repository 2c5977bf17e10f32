//! Core pipeline traits.
//!
//! The jitter buffer engine sits between a packet-ingestion path and an
//! audio-render path; these two traits are the seams it plugs into:
//!
//! - [`Sink`] - passive receiver, the ingestion side
//! - [`Source`] - passive producer, the playback side

/// Passive receiver - can receive pushed data.
///
/// The implementation decides what to do with pushed input; a buffer stores
/// it, a forwarding node processes and passes it on.
pub trait Sink: Send + Sync {
    type Input;

    fn push(&self, input: Self::Input);
}

/// Passive producer - can return data when pulled.
///
/// `len` is a unit count whose meaning belongs to the implementation
/// (samples, for everything in this crate). Returns `None` when nothing can
/// be produced right now.
pub trait Source: Send + Sync {
    type Output;

    fn pull(&self, len: usize) -> Option<Self::Output>;
}
