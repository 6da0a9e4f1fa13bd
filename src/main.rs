use std::io::{self, BufRead};

use anyhow::Result;
use log::{info, warn};

use thinkgear_rs::config::load_from_args;
use thinkgear_rs::link::SensorLink;
use thinkgear_rs::sink::{Session, Sink};
use thinkgear_rs::types::{Cue, DerivedState, LinkStatus};

/// Prints a status line whenever an eSense epoch changes the game state.
/// Raw-wave updates (~512 per second) only move the waveform and are skipped.
#[derive(Default)]
struct LogSink {
    last: Option<(u64, u32, u8, u8, LinkStatus)>,
}

impl Sink for LogSink {
    fn on_derived_state(&mut self, s: &DerivedState) {
        let key = (s.score, s.level, s.combo, s.overdrive_meter, s.link_status);
        if self.last == Some(key) && s.cues.is_empty() {
            return;
        }
        self.last = Some(key);

        let meter = |v: Option<u8>| v.map_or_else(|| "--".to_owned(), |v| format!("{v:3}"));
        println!(
            "[{:<23}] score={:7}  lvl={:2}  xp={:4}/{:<4}  combo=x{}  od={:3}%{}  att={}  med={}  | {}",
            s.link_status.to_string(),
            s.score,
            s.level,
            s.current_xp,
            s.max_xp,
            s.combo,
            s.overdrive_meter,
            if s.overdrive_active { "*" } else { " " },
            meter(s.attention),
            meter(s.meditation),
            s.status_message,
        );
        for cue in &s.cues {
            match cue {
                Cue::OverdriveActivated => println!("  ⚡  OVERDRIVE"),
                Cue::LevelUp { level } => println!("  ★  LEVEL {level}"),
            }
        }
    }

    fn on_connectivity_error(&mut self, message: &str) {
        println!("❌  {message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    //   thinkgear --config thinkgear.toml
    //   THINKGEAR_PORT=13855 thinkgear
    let config = load_from_args()?;

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG overrides the configured level, e.g. RUST_LOG=thinkgear_rs=debug
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    // ── Connect ───────────────────────────────────────────────────────────────
    let link = SensorLink::new(config.link.clone());
    let mut session = Session::new(LogSink::default(), config.session.clone());
    let lc = link.config();
    info!(
        "Bridge {}  channel={}  max_line={} B  reset_on_reconnect={}",
        lc.endpoint(),
        lc.channel_capacity,
        lc.max_line_bytes,
        config.session.reset_on_reconnect
    );
    let (mut events, mut handle) = link.connect();

    info!("Commands (type + Enter):");
    info!("  q  – quit");
    info!("  d  – disconnect");
    info!("  c  – (re)connect");
    info!("  s  – link statistics\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread so the blocking StdinLock never
    // sits across an await point.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    let mut streaming = true;
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv(), if streaming => match event {
                Some(event) => session.handle_event(event),
                None => {
                    streaming = false;
                    info!("Link idle. Type 'c' + Enter to reconnect or 'q' to quit.");
                }
            },
            line = line_rx.recv(), if stdin_open => match line.as_deref() {
                None => stdin_open = false,
                Some("") => {}
                Some("q") => {
                    info!("Quit requested.");
                    break;
                }
                Some("d") => {
                    handle.disconnect().await;
                    streaming = false;
                }
                Some("c") => {
                    handle.disconnect().await;
                    (events, handle) = link.connect();
                    streaming = true;
                }
                Some("s") => {
                    let st = handle.stats();
                    println!(
                        "[LINK] {}  lines={}  samples={}  epochs={}  dropped={}  good_contact_seen={}",
                        handle.endpoint(),
                        st.lines,
                        st.samples,
                        st.epochs,
                        st.decode_errors,
                        st.good_contact_seen
                    );
                }
                Some(other) => warn!("Unknown command: '{other}'"),
            },
            else => break,
        }
    }

    handle.disconnect().await;
    info!("Event loop finished – exiting.");
    Ok(())
}
