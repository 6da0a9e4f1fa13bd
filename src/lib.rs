//! # thinkgear-rs
//!
//! Async Rust client for the ThinkGear Connector's JSON telemetry stream,
//! plus a small game-state engine that turns the brainwave readings into
//! score, level, combo and overdrive meters for a dashboard.
//!
//! ## Data flow
//!
//! ```text
//! ThinkGear Connector ──TCP/JSON lines──▶ SensorLink ──SensorEvent──▶ Session ──▶ Sink
//!                                          (link.rs)                  (engine.rs)  (host)
//! ```
//!
//! | Record on the wire | Rate | Drives |
//! |---|---|---|
//! | `{"rawEeg": n}` | ~512 Hz | waveform trace |
//! | `{"poorSignalLevel": n, "eSense": {..}, "eegPower": {..}}` | ~1 Hz | meters, score, geometry |
//! | `{"blinkStrength": n}` | on blink | ignored by the engine |
//!
//! ## Quick start
//!
//! ```no_run
//! use thinkgear_rs::prelude::*;
//!
//! struct Print;
//!
//! impl Sink for Print {
//!     fn on_derived_state(&mut self, s: &DerivedState) {
//!         println!("score={} level={} combo=x{}", s.score, s.level, s.combo);
//!     }
//!     fn on_connectivity_error(&mut self, message: &str) {
//!         eprintln!("{message}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let (mut events, handle) = SensorLink::new(config.link).connect();
//!     let mut session = Session::new(Print, config.session);
//!     session.run(&mut events).await;
//!     handle.disconnect().await;
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`link`] | TCP connection, handshake and read loop ([`link::SensorLink`]) |
//! | [`sink`] | Host callbacks and the [`sink::Session`] dispatcher |
//! | [`engine`] | Pure game rules: `(state, sample) -> state` |
//! | [`types`] | Wire records, events and the [`types::DerivedState`] snapshot |
//! | [`protocol`] | Port, handshake and display constants |
//! | [`parse`] | Line framing and record decoding |
//! | [`config`] | TOML configuration with environment overrides |
//! | [`error`] | Decode and link error types |

pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod parse;
pub mod protocol;
pub mod sink;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Link and session ──────────────────────────────────────────────────────
    pub use crate::link::{LinkEvents, LinkHandle, SensorLink};
    pub use crate::sink::{Session, Sink};

    // ── Configuration and errors ──────────────────────────────────────────────
    pub use crate::config::{AppConfig, LinkConfig, SessionConfig};
    pub use crate::error::{DecodeError, LinkError};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::types::{
        Cue, DerivedState, ESense, EegPower, ElectrodeQuality, LinkStats, LinkStatus, Point,
        Sample, SensorEvent, Tint, Waveform,
    };

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{BAND_NAMES, DEFAULT_HOST, DEFAULT_PORT, ELECTRODE_NAMES};
}
