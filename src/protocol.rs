//! Endpoint defaults, handshake framing, and display constants for the
//! ThinkGear Connector socket protocol.
//!
//! The ThinkGear Connector is a local bridge process that owns the Bluetooth
//! link to the headset and re-serves its packets over TCP.  After a client
//! connects it must send a JSON configuration object; the bridge then streams
//! one JSON record per `\r`-terminated line.

// ── Endpoint ─────────────────────────────────────────────────────────────────

/// Address the ThinkGear Connector listens on.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the ThinkGear Connector listens on.
pub const DEFAULT_PORT: u16 = 13854;

// ── Handshake ────────────────────────────────────────────────────────────────

/// Configuration object sent once after connecting.
///
/// `enableRawOutput` turns on the 512 Hz `rawEeg` lines; `format: "Json"`
/// selects line-delimited JSON framing instead of the binary packet format.
pub const HANDSHAKE: &str = r#"{"enableRawOutput": true, "format": "Json"}"#;

/// Encode the configuration handshake for the socket.
///
/// The bridge reads a bare JSON object with no terminator.
///
/// ```
/// # use thinkgear_rs::protocol::encode_handshake;
/// let bytes = encode_handshake();
/// assert_eq!(bytes.first(), Some(&b'{'));
/// assert_eq!(bytes.last(), Some(&b'}'));
/// ```
pub fn encode_handshake() -> Vec<u8> {
    HANDSHAKE.as_bytes().to_vec()
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// Byte that terminates each record on the wire.
///
/// The bridge writes `\r` before it; [`crate::parse::decode_line`] trims it.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default upper bound on a single line; longer lines are dropped.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

// ── Value ranges ─────────────────────────────────────────────────────────────

/// Largest `poorSignalLevel` the sensor reports (no skin contact).
pub const MAX_POOR_SIGNAL_LEVEL: u8 = 200;

/// Largest eSense meter value.
pub const MAX_ESENSE: u8 = 100;

/// Largest `blinkStrength` value.
pub const MAX_BLINK_STRENGTH: u8 = 100;

// ── Human-readable labels ────────────────────────────────────────────────────

/// Projected band names, in geometry angle order (angle 0 first).
pub const BAND_NAMES: [&str; 8] = [
    "delta",
    "theta",
    "lowAlpha",
    "highAlpha",
    "lowBeta",
    "highBeta",
    "lowGamma",
    "highGamma",
];

/// Number of slots in the electrode quality map.
pub const ELECTRODE_COUNT: usize = 16;

/// Slot names for the electrode quality map, in slot order.
pub const ELECTRODE_NAMES: [&str; ELECTRODE_COUNT] = [
    "N1", "N2", "N3", "N4", "N5", "N6", "N7", "N8", "N9", "N10", "N11", "N12", "N13", "N14",
    "N15", "N16",
];

// ── Waveform display ─────────────────────────────────────────────────────────

/// Number of raw-wave points kept for display.
pub const WAVEFORM_CAPACITY: usize = 300;

/// Display value the waveform is pre-filled with (the vertical midline).
pub const WAVEFORM_BASELINE: f64 = 50.0;

/// Horizontal spacing between consecutive waveform points.
pub const WAVEFORM_X_STEP: f64 = 2.0;

/// Raw ADC ticks per display unit: `y = 50 + raw / 20`.
pub const WAVEFORM_RAW_DIVISOR: f64 = 20.0;

/// Inclusive upper bound of the waveform display range (lower bound is 0).
pub const WAVEFORM_MAX_Y: f64 = 100.0;
