//! Voice transport seam and playback control for Herald.
//!
//! The platform's voice library is an external capability. This crate
//! pins down the interface Herald programs against:
//!
//! - [`transport`] — the [`VoiceTransport`]/[`VoiceConnection`] traits
//!   and the connection lifecycle event model.
//! - [`playback`] — the [`AudioSink`] trait and the process-wide
//!   [`PlaybackController`] that owns the single shared sink.
//! - [`loopback`] — an in-process simulated transport and sink used by
//!   tests and local runs, standing in for a production adapter that
//!   would wrap the platform SDK's connection and audio objects.
//!
//! The ordering contract lives here: a sink must be attached to a
//! connection before playback is started on it, and each successful
//! `play` produces exactly one completion signal.

pub mod error;
pub mod loopback;
pub mod playback;
pub mod transport;

pub use error::VoiceError;
pub use loopback::{LoopbackConnection, LoopbackSink, LoopbackTransport};
pub use playback::{AudioSink, PlaybackController, PlaybackFinished};
pub use transport::{wait_for_state, ConnectionState, VoiceConnection, VoiceTransport};
