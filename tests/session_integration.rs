//! End-to-end: fake ThinkGear bridge → SensorLink → Session → recording sink.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use thinkgear_rs::prelude::*;
use thinkgear_rs::protocol::HANDSHAKE;

const WAIT: Duration = Duration::from_secs(5);

const FOCUSED: &str = r#"{"poorSignalLevel":0,"eSense":{"attention":90,"meditation":0}}"#;

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

/// Accept one connection, check the handshake, write `lines` with the
/// bridge's `\r\n` terminator, then close.
fn serve_once(listener: TcpListener, lines: Vec<&'static str>) -> JoinHandle<TcpListener> {
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut hello = vec![0u8; HANDSHAKE.len()];
        sock.read_exact(&mut hello).await.unwrap();
        assert_eq!(hello, HANDSHAKE.as_bytes());
        for line in lines {
            sock.write_all(line.as_bytes()).await.unwrap();
            sock.write_all(b"\r\n").await.unwrap();
        }
        listener
    })
}

async fn bridge() -> (TcpListener, LinkConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = LinkConfig {
        port: listener.local_addr().unwrap().port(),
        ..LinkConfig::default()
    };
    (listener, config)
}

async fn run_once<S: Sink>(session: &mut Session<S>, link: &SensorLink) -> LinkStats {
    let (mut events, handle) = link.connect();
    timeout(WAIT, session.run(&mut events))
        .await
        .expect("session did not finish");
    handle.disconnect().await;
    handle.stats()
}

#[tokio::test]
async fn stream_drives_the_game_state() {
    let (listener, config) = bridge().await;
    let server = serve_once(
        listener,
        vec![
            r#"{"rawEeg":200}"#,
            FOCUSED,
            FOCUSED,
            "",
            FOCUSED,
            "not json",
            r#"{"poorSignalLevel":80,"eSense":{"attention":10,"meditation":0}}"#,
        ],
    );

    let link = SensorLink::new(config);
    let mut session = Session::new(Recorder::default(), SessionConfig::default());
    let stats = run_once(&mut session, &link).await;
    server.await.unwrap();

    let rec = session.sink();
    assert!(rec.errors.is_empty());
    // reset on connect + raw + 3 focused + noisy + close
    assert_eq!(rec.snapshots.len(), 7);
    assert_eq!(rec.snapshots[0], DerivedState::default());

    assert_eq!(rec.snapshots[1].waveform.latest(), Some(60.0));
    let combos: Vec<u8> = rec.snapshots[2..5].iter().map(|s| s.combo).collect();
    assert_eq!(combos, vec![2, 3, 4]);

    // Noisy contact freezes the game rules but still updates the electrodes.
    let noisy = &rec.snapshots[5];
    assert_eq!(noisy.link_status, LinkStatus::Searching);
    assert_eq!(noisy.combo, 4);
    assert_eq!(noisy.score, 810);
    assert_eq!(noisy.attention, Some(90));
    assert!(noisy
        .electrodes
        .iter()
        .all(|&q| q == ElectrodeQuality::Poor));

    let last = rec.snapshots.last().unwrap();
    assert_eq!(last.link_status, LinkStatus::Offline);
    assert_eq!(last.score, 810);
    assert_eq!(last.current_xp, 81);
    assert_eq!(last.level, 1);

    assert_eq!(stats.lines, 6);
    assert_eq!(stats.samples, 5);
    assert_eq!(stats.epochs, 4);
    assert_eq!(stats.decode_errors, 1);
    assert!(stats.good_contact_seen);
}

#[tokio::test]
async fn refused_connection_reports_one_error() {
    let (listener, config) = bridge().await;
    let endpoint = config.endpoint();
    drop(listener);

    let link = SensorLink::new(config);
    let mut session = Session::new(Recorder::default(), SessionConfig::default());
    run_once(&mut session, &link).await;

    let rec = session.sink();
    assert!(rec.snapshots.is_empty());
    assert_eq!(rec.errors.len(), 1);
    assert!(rec.errors[0].contains(&endpoint));
    assert_eq!(session.state().link_status, LinkStatus::Offline);
}

#[tokio::test]
async fn connection_reset_reports_one_error() {
    let (listener, config) = bridge().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut hello = vec![0u8; HANDSHAKE.len()];
        sock.read_exact(&mut hello).await.unwrap();
        sock.write_all(FOCUSED.as_bytes()).await.unwrap();
        sock.write_all(b"\r\n").await.unwrap();
        // Abortive close: the link sees a reset, not end of stream.
        sock.set_linger(Some(Duration::ZERO)).unwrap();
        drop(sock);
    });

    let link = SensorLink::new(config);
    let mut session = Session::new(Recorder::default(), SessionConfig::default());
    run_once(&mut session, &link).await;
    server.await.unwrap();

    assert_eq!(session.state().link_status, LinkStatus::Offline);
    let rec = session.into_sink();
    assert_eq!(rec.errors.len(), 1);
    assert!(rec.errors[0].starts_with("Sensor stream read failed"));
}

#[tokio::test]
async fn reconnect_resets_progress_by_default() {
    let (listener, config) = bridge().await;
    let link = SensorLink::new(config);
    let mut session = Session::new(Recorder::default(), SessionConfig::default());

    let server = serve_once(listener, vec![FOCUSED, FOCUSED, FOCUSED]);
    run_once(&mut session, &link).await;
    let listener = server.await.unwrap();
    assert_eq!(session.state().score, 810);

    let server = serve_once(listener, vec![FOCUSED]);
    run_once(&mut session, &link).await;
    server.await.unwrap();
    // Fresh combo 1 → 2, gain 9 × 2.
    assert_eq!(session.state().score, 180);
    assert_eq!(session.state().combo, 2);
}

#[tokio::test]
async fn reconnect_keeps_progress_when_configured() {
    let (listener, config) = bridge().await;
    let link = SensorLink::new(config);
    let mut session = Session::new(
        Recorder::default(),
        SessionConfig {
            reset_on_reconnect: false,
        },
    );

    let server = serve_once(listener, vec![FOCUSED, FOCUSED, FOCUSED]);
    run_once(&mut session, &link).await;
    let listener = server.await.unwrap();

    let server = serve_once(listener, vec![FOCUSED]);
    run_once(&mut session, &link).await;
    server.await.unwrap();
    // Combo continues 4 → 5, gain 9 × 5.
    assert_eq!(session.state().score, 810 + 450);
    assert_eq!(session.state().combo, 5);
}
