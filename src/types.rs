use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::protocol::{ELECTRODE_COUNT, WAVEFORM_BASELINE, WAVEFORM_CAPACITY, WAVEFORM_X_STEP};

/// One decoded telemetry record: a single line from the ThinkGear bridge.
///
/// The bridge multiplexes several payload shapes over the same stream:
///
/// | Line kind | Typical rate | Fields present |
/// |---|---|---|
/// | raw wave | 512 Hz | `rawEeg` |
/// | eSense / power | ~1 Hz | `poorSignalLevel`, `eSense`, `eegPower` |
/// | blink | on event | `blinkStrength` |
/// | status | on change | `poorSignalLevel` (plus ignored `status`) |
///
/// Every group is therefore optional.  `None` means "not part of this
/// line's payload"; it is never a stand-in for zero.
///
/// Immutable once decoded by [`crate::parse::decode_line`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Contact quality, 0 (perfect) to 200 (no skin contact).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poor_signal_level: Option<u8>,
    /// Attention / meditation meters.
    #[serde(rename = "eSense", default, skip_serializing_if = "Option::is_none")]
    pub esense: Option<ESense>,
    /// Per-band spectral power.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eeg_power: Option<EegPower>,
    /// One signed raw ADC tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_eeg: Option<i32>,
    /// Strength of a detected eye blink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink_strength: Option<u8>,
}

impl Sample {
    /// Contact quality used by the game rules.  A line without the field is
    /// treated as perfect contact, which is what the bridge implies when it
    /// omits it.
    pub fn signal_level(&self) -> u8 {
        self.poor_signal_level.unwrap_or(0)
    }
}

/// eSense meters, each on a 0–100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ESense {
    pub attention: u8,
    pub meditation: u8,
}

/// Spectral band powers as reported by the sensor (unitless, ≥ 0).
///
/// `mid_gamma` is not part of the stock ThinkGear payload; it defaults to 0
/// when the bridge does not send it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EegPower {
    pub delta: u32,
    pub theta: u32,
    pub low_alpha: u32,
    pub high_alpha: u32,
    pub low_beta: u32,
    pub high_beta: u32,
    pub low_gamma: u32,
    pub high_gamma: u32,
    #[serde(default)]
    pub mid_gamma: u32,
}

impl EegPower {
    /// The eight projected bands in [`crate::protocol::BAND_NAMES`] order.
    /// `mid_gamma` is deliberately not included.
    pub fn bands(&self) -> [u32; 8] {
        [
            self.delta,
            self.theta,
            self.low_alpha,
            self.high_alpha,
            self.low_beta,
            self.high_beta,
            self.low_gamma,
            self.high_gamma,
        ]
    }
}

/// All events emitted by [`crate::link::SensorLink`].
///
/// Consumers receive these through the [`crate::link::LinkEvents`] returned
/// by [`crate::link::SensorLink::connect`].  A connection attempt produces
/// either a single `Error` (connect or handshake failed) or `Connected`
/// followed by any number of `Sample`s and at most one terminal `Error` or
/// `StreamClosed`.  After a local [`crate::link::LinkHandle::disconnect`]
/// nothing further is delivered.
#[derive(Debug)]
pub enum SensorEvent {
    /// Socket open and handshake written.  Carries the bridge address.
    Connected(SocketAddr),
    /// A successfully decoded line.
    Sample(Sample),
    /// Connect, handshake or read failure.  Always the last event.
    Error(LinkError),
    /// The bridge closed the stream.  Always the last event.
    StreamClosed,
}

/// Connectivity as seen through the sample stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    /// No connection, or the stream ended.
    #[default]
    Offline,
    /// Connected, eSense arriving, but contact is not perfect.
    Searching,
    /// Connected with perfect contact (`poorSignalLevel == 0`).
    Linked,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkStatus::Offline => "SYSTEM OFFLINE",
            LinkStatus::Searching => "SEARCHING FOR SIGNAL...",
            LinkStatus::Linked => "LINK ESTABLISHED",
        })
    }
}

/// Per-electrode contact classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ElectrodeQuality {
    /// No eSense line seen yet.
    #[default]
    Unknown,
    Good,
    Fair,
    Poor,
}

impl ElectrodeQuality {
    /// Classify a `poorSignalLevel`: 0 → Good, < 50 → Fair, otherwise Poor.
    pub fn from_signal_level(level: u8) -> Self {
        match level {
            0 => ElectrodeQuality::Good,
            1..=49 => ElectrodeQuality::Fair,
            _ => ElectrodeQuality::Poor,
        }
    }
}

/// A planar display coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Colour hint for the band geometry.  The host maps it to a palette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Tint {
    #[default]
    Calm,
    /// Combo of 4 or more.
    Streak,
    /// Overdrive active.
    Overdrive,
}

/// A side-channel cue raised by one state transition (e.g. a sound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cue {
    OverdriveActivated,
    LevelUp { level: u32 },
}

/// Rolling window of the most recent raw-wave display values.
///
/// Always holds exactly [`WAVEFORM_CAPACITY`] entries: it starts filled with
/// the [`WAVEFORM_BASELINE`] and every [`push`](Waveform::push) evicts the
/// oldest value.  X-coordinates are not stored; [`points`](Waveform::points)
/// derives them from the index so they are always `0, 2, 4, …`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    values: VecDeque<f64>,
}

impl Waveform {
    pub fn new() -> Self {
        Self {
            values: std::iter::repeat(WAVEFORM_BASELINE)
                .take(WAVEFORM_CAPACITY)
                .collect(),
        }
    }

    /// Append `y`, evicting the oldest value.
    pub fn push(&mut self, y: f64) {
        self.values.pop_front();
        self.values.push_back(y);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Display values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Evenly spaced display points, oldest first: `x = index × 2`.
    pub fn points(&self) -> Vec<Point> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &y)| Point::new(i as f64 * WAVEFORM_X_STEP, y))
            .collect()
    }
}

impl Default for Waveform {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of everything the engine derives from the sample stream.
///
/// Produced by [`crate::engine::apply`] and [`crate::engine::on_raw_sample`]
/// as a fresh value per transition; hosts that need change notification
/// diff consecutive snapshots themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedState {
    /// Never decreases except on reset.
    pub score: u64,
    /// Starts at 1.
    pub level: u32,
    /// Always `< max_xp`.
    pub current_xp: u32,
    /// Starts at 100, grows ×1.5 (floored) per level.
    pub max_xp: u32,
    /// Streak counter in `1..=5`.
    pub combo: u8,
    /// Resource meter in `0..=100`.
    pub overdrive_meter: u8,
    pub overdrive_active: bool,
    /// Text of the last game event.
    pub status_message: String,
    pub link_status: LinkStatus,
    /// Last attention value accepted under good contact.
    pub attention: Option<u8>,
    /// Last meditation value accepted under good contact.
    pub meditation: Option<u8>,
    /// Eight band points; empty until the first good-contact power line.
    pub geometry: Vec<Point>,
    pub waveform: Waveform,
    pub electrodes: [ElectrodeQuality; ELECTRODE_COUNT],
    pub tint: Tint,
    /// Cues raised by the transition that produced this snapshot.
    pub cues: Vec<Cue>,
}

impl Default for DerivedState {
    fn default() -> Self {
        Self {
            score: 0,
            level: 1,
            current_xp: 0,
            max_xp: crate::engine::INITIAL_MAX_XP,
            combo: 1,
            overdrive_meter: 0,
            overdrive_active: false,
            status_message: "offline".into(),
            link_status: LinkStatus::Offline,
            attention: None,
            meditation: None,
            geometry: Vec::new(),
            waveform: Waveform::new(),
            electrodes: [ElectrodeQuality::Unknown; ELECTRODE_COUNT],
            tint: Tint::Calm,
            cues: Vec::new(),
        }
    }
}

/// Counters kept by the link's read loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Non-empty lines read from the socket.
    pub lines: u64,
    /// Lines that decoded into a [`Sample`].
    pub samples: u64,
    /// Decoded samples that carried eSense.
    pub epochs: u64,
    /// Lines dropped by the decoder.
    pub decode_errors: u64,
    /// Whether any eSense line has reported good contact (level < 50).
    pub good_contact_seen: bool,
}
