//! Host boundary: the [`Sink`] callbacks and the [`Session`] dispatcher that
//! drives the engine from a link's event channel.
//!
//! The session is the single writer of the [`DerivedState`].  It consumes
//! [`SensorEvent`]s one at a time, so the engine never needs a lock; the sink
//! decides how snapshots reach its own thread or UI loop.

use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine;
use crate::link::LinkEvents;
use crate::types::{DerivedState, LinkStatus, Sample, SensorEvent};

/// Callbacks a host implements to receive derived state.
pub trait Sink {
    /// Called once per processed sample, raw-only updates included, and once
    /// when the bridge closes the stream.
    fn on_derived_state(&mut self, snapshot: &DerivedState);

    /// Called once per failed connection attempt or broken stream with a
    /// human-readable message.
    fn on_connectivity_error(&mut self, message: &str);
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn on_derived_state(&mut self, snapshot: &DerivedState) {
        (**self).on_derived_state(snapshot)
    }

    fn on_connectivity_error(&mut self, message: &str) {
        (**self).on_connectivity_error(message)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn on_derived_state(&mut self, snapshot: &DerivedState) {
        (**self).on_derived_state(snapshot)
    }

    fn on_connectivity_error(&mut self, message: &str) {
        (**self).on_connectivity_error(message)
    }
}

/// Owns the current [`DerivedState`] and feeds it through the engine.
pub struct Session<S> {
    sink: S,
    state: DerivedState,
    config: SessionConfig,
}

impl<S: Sink> Session<S> {
    pub fn new(sink: S, config: SessionConfig) -> Self {
        Self {
            sink,
            state: DerivedState::default(),
            config,
        }
    }

    /// The latest snapshot.
    pub fn state(&self) -> &DerivedState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Drop all progress and return to the startup defaults.
    pub fn reset(&mut self) {
        self.state = DerivedState::default();
    }

    /// Consume events until the link's stream ends.
    ///
    /// Returns after the terminal event of a connection attempt, or right
    /// after a local disconnect, which ends the stream without one.
    pub async fn run(&mut self, events: &mut LinkEvents) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("Session: event channel closed");
    }

    /// Process one link event.
    pub fn handle_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Connected(addr) => {
                info!("Session: linked to sensor bridge at {addr}");
                if self.config.reset_on_reconnect {
                    self.reset();
                    self.sink.on_derived_state(&self.state);
                }
            }
            SensorEvent::Sample(sample) => self.process(&sample),
            SensorEvent::Error(e) => {
                warn!("Session: {e}");
                self.state.link_status = LinkStatus::Offline;
                self.sink.on_connectivity_error(&e.to_string());
            }
            SensorEvent::StreamClosed => {
                info!("Session: sensor bridge closed the stream");
                self.state.link_status = LinkStatus::Offline;
                self.state.cues.clear();
                self.sink.on_derived_state(&self.state);
            }
        }
    }

    /// Run one sample through the engine and publish the snapshot.
    pub fn process(&mut self, sample: &Sample) {
        let next = match sample.raw_eeg {
            Some(raw) if is_raw_only(sample) => engine::on_raw_sample(&self.state, raw),
            _ => engine::apply(&self.state, sample),
        };
        for cue in &next.cues {
            info!("Session: {cue:?} ({})", next.status_message);
        }
        self.state = next;
        self.sink.on_derived_state(&self.state);
    }
}

fn is_raw_only(sample: &Sample) -> bool {
    sample.esense.is_none()
        && sample.eeg_power.is_none()
        && sample.poor_signal_level.is_none()
        && sample.blink_strength.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::types::{Cue, ESense};
    use std::io;

    #[derive(Default)]
    struct Recorder {
        snapshots: Vec<DerivedState>,
        errors: Vec<String>,
    }

    impl Sink for Recorder {
        fn on_derived_state(&mut self, snapshot: &DerivedState) {
            self.snapshots.push(snapshot.clone());
        }

        fn on_connectivity_error(&mut self, message: &str) {
            self.errors.push(message.to_owned());
        }
    }

    fn focused() -> Sample {
        Sample {
            poor_signal_level: Some(0),
            esense: Some(ESense {
                attention: 90,
                meditation: 100,
            }),
            ..Default::default()
        }
    }

    fn addr() -> std::net::SocketAddr {
        "127.0.0.1:13854".parse().unwrap()
    }

    #[test]
    fn one_snapshot_per_sample() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Connected(addr()));
        session.handle_event(SensorEvent::Sample(Sample {
            raw_eeg: Some(100),
            ..Default::default()
        }));
        session.handle_event(SensorEvent::Sample(focused()));
        let rec = session.sink();
        // reset defaults on connect, then one per sample
        assert_eq!(rec.snapshots.len(), 3);
        assert_eq!(rec.snapshots[0], DerivedState::default());
        assert_eq!(rec.snapshots[1].waveform.latest(), Some(55.0));
        assert_eq!(rec.snapshots[2].combo, 2);
        assert_eq!(rec.snapshots[2].link_status, LinkStatus::Linked);
    }

    #[test]
    fn errors_reach_the_sink_once() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Error(LinkError::ConnectionRefused {
            addr: "127.0.0.1:13854".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }));
        let rec = session.sink();
        assert!(rec.snapshots.is_empty());
        assert_eq!(
            rec.errors,
            vec!["Connection failed: is the ThinkGear Connector running on 127.0.0.1:13854?"]
        );
    }

    #[test]
    fn stream_close_publishes_offline() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Sample(focused()));
        session.handle_event(SensorEvent::StreamClosed);
        let last = session.sink().snapshots.last().cloned().unwrap();
        assert_eq!(last.link_status, LinkStatus::Offline);
        assert_eq!(last.combo, 2);
    }

    #[test]
    fn reconnect_resets_when_configured() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Sample(focused()));
        assert!(session.state().score > 0);
        session.handle_event(SensorEvent::Connected(addr()));
        assert_eq!(session.state(), &DerivedState::default());
        // The host sees the reset right away, not on the next line.
        let rec = session.into_sink();
        assert_eq!(rec.snapshots.len(), 2);
        assert_eq!(rec.snapshots[1], DerivedState::default());
    }

    #[test]
    fn reconnect_keeps_progress_when_disabled() {
        let config = SessionConfig {
            reset_on_reconnect: false,
        };
        let mut session = Session::new(Recorder::default(), config);
        session.handle_event(SensorEvent::Sample(focused()));
        let score = session.state().score;
        session.handle_event(SensorEvent::Connected(addr()));
        assert_eq!(session.state().score, score);
        assert_eq!(session.sink().snapshots.len(), 1);
    }

    #[test]
    fn read_failure_goes_offline_with_one_error() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Connected(addr()));
        session.handle_event(SensorEvent::Sample(focused()));
        session.handle_event(SensorEvent::Error(LinkError::Read(io::Error::from(
            io::ErrorKind::ConnectionReset,
        ))));
        assert_eq!(session.state().link_status, LinkStatus::Offline);
        let rec = session.sink();
        assert_eq!(rec.errors.len(), 1);
        assert!(rec.errors[0].starts_with("Sensor stream read failed"));
        // No extra snapshot for the error itself.
        assert_eq!(rec.snapshots.len(), 2);
    }

    #[test]
    fn handshake_failure_names_the_bridge() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        session.handle_event(SensorEvent::Error(LinkError::Handshake {
            addr: addr(),
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        }));
        let rec = session.sink();
        assert_eq!(rec.errors.len(), 1);
        assert!(rec.errors[0].starts_with("Handshake with sensor bridge at 127.0.0.1:13854 failed"));
        assert!(rec.snapshots.is_empty());
    }

    #[test]
    fn cues_are_per_snapshot() {
        let mut session = Session::new(Recorder::default(), SessionConfig::default());
        for _ in 0..10 {
            session.process(&focused());
        }
        let rec = session.sink();
        let with_cues: Vec<usize> = rec
            .snapshots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.cues.contains(&Cue::OverdriveActivated))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(with_cues, vec![9]);
    }

    #[tokio::test]
    async fn run_drains_until_channel_closes() {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(SensorEvent::Connected(addr())).await.unwrap();
        tx.send(SensorEvent::Sample(focused())).await.unwrap();
        tx.send(SensorEvent::StreamClosed).await.unwrap();
        drop(tx);

        let mut rec = Recorder::default();
        let mut session = Session::new(&mut rec, SessionConfig::default());
        session.run(&mut LinkEvents::from_receiver(rx)).await;
        drop(session);
        // reset on connect, the sample, the close
        assert_eq!(rec.snapshots.len(), 3);
    }
}
