//! Error types for the sensor link and the line decoder.
//!
//! Neither family is fatal: a [`DecodeError`] costs one line, a [`LinkError`]
//! ends the current connection attempt and is reported once to the host.

use std::io;
use std::net::SocketAddr;

/// Failure to turn one wire line into a [`crate::types::Sample`].
///
/// Produced by [`crate::parse::decode_line`].  The link logs these at debug
/// level and drops the line; they never reach the host.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The line is not a well-formed JSON object of the expected shape.
    #[error("malformed line: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field decoded but lies outside the range the sensor documents.
    #[error("{field} out of range: {value} (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// The line exceeded the configured maximum length and was discarded.
    #[error("line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },
}

/// Connectivity failure on the sensor link.
///
/// Reported to the host exactly once per connection attempt through
/// [`crate::types::SensorEvent::Error`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The TCP connect to the sensor bridge failed.
    #[error("Connection failed: is the ThinkGear Connector running on {addr}?")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Connected, but writing the configuration handshake failed.
    #[error("Handshake with sensor bridge at {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The socket failed while streaming (reset, broken pipe, ...).
    #[error("Sensor stream read failed: {0}")]
    Read(#[source] io::Error),
}
