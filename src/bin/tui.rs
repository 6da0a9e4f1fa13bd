//! Real-time game dashboard for a ThinkGear Connector.
//!
//! Usage:
//!   cargo run --bin tui                          # connect to 127.0.0.1:13854
//!   cargo run --bin tui -- --config link.toml    # custom endpoint / policy
//!   cargo run --bin tui -- --simulate            # built-in headset simulator
//!
//! Keys
//! ----
//!   c        connect (or restart the simulator)
//!   d        disconnect
//!   r        reset score, level and meters
//!   q / Esc  quit

use std::f64::consts::PI;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph,
    },
    Frame, Terminal,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use thinkgear_rs::config::{load_from_args, AppConfig};
use thinkgear_rs::engine::GEOMETRY_ORIGIN;
use thinkgear_rs::link::{LinkEvents, LinkHandle, SensorLink};
use thinkgear_rs::parse::decode_line;
use thinkgear_rs::protocol::{
    BAND_NAMES, ELECTRODE_NAMES, WAVEFORM_CAPACITY, WAVEFORM_MAX_Y, WAVEFORM_X_STEP,
};
use thinkgear_rs::sink::{Session, Sink};
use thinkgear_rs::types::{
    DerivedState, ElectrodeQuality, LinkStats, LinkStatus, SensorEvent, Tint,
};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Raw-wave rate of the headset (Hz).
const RAW_HZ: f64 = 512.0;

/// Raw lines generated per simulator tick; one tick lasts `16 / 512 s`.
const SIM_RAW_PER_TICK: usize = 16;

/// Simulator ticks per eSense epoch (one epoch per second).
const SIM_TICKS_PER_EPOCH: u64 = (RAW_HZ as u64) / SIM_RAW_PER_TICK as u64;

/// Side of the square the band geometry is laid out in.
const GEOMETRY_EXTENT: f64 = 2.0 * GEOMETRY_ORIGIN.x;

/// Braille spinner frames cycled at ~100 ms intervals.
const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

// ── App mode ──────────────────────────────────────────────────────────────────

enum AppMode {
    /// Socket connect in progress.
    Connecting(String),
    /// Handshake sent; streaming from the bridge at this address.
    Streaming(String),
    /// `--simulate`: the built-in generator feeds the session.
    Simulated,
    /// No data source.
    Idle,
}

// ── Dashboard (the session's sink) ────────────────────────────────────────────

/// View state.  Owned by the [`Session`], which is shared between the event
/// task and the render loop behind one mutex.
struct Dashboard {
    snapshot: DerivedState,
    mode: AppMode,
    last_error: Option<String>,
    /// Set when a snapshot carried a cue; cleared by the render loop after
    /// ringing the terminal bell.
    pending_bell: bool,
    /// Incremented on every connect/disconnect so stale event tasks stand down.
    generation: u64,
    stats: LinkStats,
    snapshots: u64,
}

impl Dashboard {
    fn new() -> Self {
        Self {
            snapshot: DerivedState::default(),
            mode: AppMode::Idle,
            last_error: None,
            pending_bell: false,
            generation: 0,
            stats: LinkStats::default(),
            snapshots: 0,
        }
    }
}

impl Sink for Dashboard {
    fn on_derived_state(&mut self, snapshot: &DerivedState) {
        if !snapshot.cues.is_empty() {
            self.pending_bell = true;
        }
        self.snapshot = snapshot.clone();
        self.snapshots += 1;
    }

    fn on_connectivity_error(&mut self, message: &str) {
        self.last_error = Some(message.to_owned());
        self.snapshot.link_status = LinkStatus::Offline;
    }
}

type Shared = Arc<Mutex<Session<Dashboard>>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Session<Dashboard>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Data sources ──────────────────────────────────────────────────────────────

enum Source {
    Link(Arc<LinkHandle>),
    Simulator(JoinHandle<()>),
}

impl Source {
    /// Stop producing events.  Never blocks the render loop.
    fn stop(self) {
        match self {
            Source::Link(h) => {
                tokio::spawn(async move { h.disconnect().await });
            }
            Source::Simulator(task) => task.abort(),
        }
    }
}

/// Start a fresh data source and the task that feeds its events to the session.
fn start_source(shared: &Shared, config: &AppConfig, simulate: bool) -> Source {
    let generation = {
        let mut session = lock(shared);
        let ui = session.sink_mut();
        ui.generation += 1;
        ui.last_error = None;
        ui.stats = LinkStats::default();
        ui.mode = if simulate {
            AppMode::Simulated
        } else {
            AppMode::Connecting(config.link.endpoint())
        };
        ui.generation
    };

    if simulate {
        let (tx, rx) = mpsc::channel(config.link.channel_capacity.max(1));
        let task = spawn_simulator(tx);
        spawn_event_task(LinkEvents::from_receiver(rx), Arc::clone(shared), generation);
        Source::Simulator(task)
    } else {
        let (events, handle) = SensorLink::new(config.link.clone()).connect();
        spawn_event_task(events, Arc::clone(shared), generation);
        Source::Link(Arc::new(handle))
    }
}

/// Forward events into the session until the source ends or is replaced.
fn spawn_event_task(mut events: LinkEvents, shared: Shared, generation: u64) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut session = lock(&shared);
            if session.sink().generation != generation {
                return;
            }
            if let SensorEvent::Connected(addr) = &event {
                session.sink_mut().mode = AppMode::Streaming(addr.to_string());
            }
            session.handle_event(event);
        }
        let mut session = lock(&shared);
        let ui = session.sink_mut();
        if ui.generation == generation && !matches!(ui.mode, AppMode::Simulated) {
            ui.mode = AppMode::Idle;
        }
    });
}

// ── Headset simulator ─────────────────────────────────────────────────────────

/// One raw-wave tick at time `t` (seconds): a 10 Hz alpha rhythm, slower
/// theta, and a deterministic noise floor.  Peak ≈ ±700 ADC ticks.
fn sim_raw(t: f64) -> i32 {
    let alpha = 400.0 * (2.0 * PI * 10.0 * t).sin();
    let theta = 200.0 * (2.0 * PI * 6.0 * t + 0.7).sin();
    let noise = (((t * 1000.7).sin() * 9973.1).fract() - 0.5) * 160.0;
    (alpha + theta + noise).round() as i32
}

/// One eSense/power record at time `t` (seconds).
///
/// | Period | Effect |
/// |---|---|
/// | 40 s | attention sweeps 25–95, building and breaking combos |
/// | 60 s | five seconds of fair contact, then two with none |
/// | 17 s | one mid-gamma spike (critical hit) |
fn sim_epoch(t: f64) -> serde_json::Value {
    let cycle = t % 60.0;
    let poor_signal = match cycle {
        c if (45.0..50.0).contains(&c) => 26,
        c if (50.0..52.0).contains(&c) => 200,
        _ => 0,
    };
    let attention = (60.0 + 35.0 * (2.0 * PI * t / 40.0).sin()).clamp(0.0, 100.0) as u8;
    let meditation = (50.0 + 30.0 * (2.0 * PI * t / 25.0).cos()).clamp(0.0, 100.0) as u8;
    let wobble = |period: f64, base: f64| (base * (1.6 + (2.0 * PI * t / period).sin())) as u32;
    let mid_gamma = if (t as u64) % 17 == 16 { 12_000 } else { 3_000 };

    json!({
        "poorSignalLevel": poor_signal,
        "eSense": { "attention": attention, "meditation": meditation },
        "eegPower": {
            "delta": wobble(7.0, 400_000.0),
            "theta": wobble(9.0, 90_000.0),
            "lowAlpha": wobble(11.0, 20_000.0),
            "highAlpha": wobble(13.0, 15_000.0),
            "lowBeta": wobble(5.0, 9_000.0),
            "highBeta": wobble(6.0, 8_000.0),
            "lowGamma": wobble(4.0, 3_000.0),
            "highGamma": wobble(3.0, 1_500.0),
            "midGamma": mid_gamma,
        }
    })
}

/// Spawn a task that writes synthetic wire lines at the headset's rates and
/// feeds them through the regular decoder.
fn spawn_simulator(tx: mpsc::Sender<SensorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let dt = 1.0 / RAW_HZ;
        let mut ticker =
            tokio::time::interval(Duration::from_secs_f64(SIM_RAW_PER_TICK as f64 * dt));
        let mut t = 0.0_f64;
        let mut tick = 0u64;
        loop {
            ticker.tick().await;
            let mut lines: Vec<String> = (0..SIM_RAW_PER_TICK)
                .map(|i| json!({ "rawEeg": sim_raw(t + i as f64 * dt) }).to_string())
                .collect();
            if tick % SIM_TICKS_PER_EPOCH == 0 {
                lines.push(sim_epoch(t).to_string());
            }
            for line in lines {
                match decode_line(line.as_bytes()) {
                    Ok(Some(sample)) => {
                        if tx.send(SensorEvent::Sample(sample)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Simulator produced an invalid line: {e}"),
                }
            }
            t += SIM_RAW_PER_TICK as f64 * dt;
            tick += 1;
        }
    })
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Header / body / footer, with the body split into meters and waveform on
/// the left, geometry and electrodes on the right.
fn draw(frame: &mut Frame, ui: &Dashboard) {
    let root = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .split(frame.area());

    let [left, right] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
            .areas(root[1]);
    let [xp, overdrive, meters, wave] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(left);
    let [geometry, electrodes] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(6)]).areas(right);

    draw_header(frame, root[0], ui);
    draw_xp(frame, xp, &ui.snapshot);
    draw_overdrive(frame, overdrive, &ui.snapshot);
    draw_meters(frame, meters, &ui.snapshot);
    draw_waveform(frame, wave, &ui.snapshot);
    draw_geometry(frame, geometry, &ui.snapshot);
    draw_electrodes(frame, electrodes, &ui.snapshot);
    draw_footer(frame, root[2], ui);
}

// ── Header ────────────────────────────────────────────────────────────────────

fn spinner_str() -> &'static str {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    SPINNER[(ms / 100) as usize % SPINNER.len()]
}

fn status_color(status: LinkStatus) -> Color {
    match status {
        LinkStatus::Offline => Color::Red,
        LinkStatus::Searching => Color::Yellow,
        LinkStatus::Linked => Color::Green,
    }
}

/// Source, link status, score, level and read-loop counters.
fn draw_header(frame: &mut Frame, area: Rect, ui: &Dashboard) {
    let (label, color) = match &ui.mode {
        AppMode::Connecting(ep) => (format!("{} Connecting to {ep}…", spinner_str()), Color::Yellow),
        AppMode::Streaming(addr) => (format!("● {addr}"), Color::Green),
        AppMode::Simulated => ("◆ Simulated".to_owned(), Color::Cyan),
        AppMode::Idle => {
            let reason = ui
                .last_error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default();
            (format!("○ Idle{reason}"), Color::Red)
        }
    };
    let s = &ui.snapshot;

    let line = Line::from(vec![
        Span::styled(
            " THINKGEAR ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        sep(),
        Span::styled(
            s.link_status.to_string(),
            Style::default().fg(status_color(s.link_status)),
        ),
        sep(),
        Span::styled(
            format!("SCORE {:>8}", s.score),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(
            format!("LVL {}", s.level),
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(
            format!(
                "{} lines  {} dropped  {} snapshots",
                ui.stats.lines, ui.stats.decode_errors, ui.snapshots
            ),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
    ]);

    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn sep<'a>() -> Span<'a> {
    Span::styled(" │ ", Style::default().fg(Color::DarkGray))
}

// ── Meters ────────────────────────────────────────────────────────────────────

fn draw_xp(frame: &mut Frame, area: Rect, s: &DerivedState) {
    let ratio = (s.current_xp as f64 / s.max_xp.max(1) as f64).clamp(0.0, 1.0);
    frame.render_widget(
        Gauge::default()
            .block(Block::default().title(" Experience ").borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::LightBlue))
            .ratio(ratio)
            .label(format!("{} / {} XP", s.current_xp, s.max_xp)),
        area,
    );
}

fn draw_overdrive(frame: &mut Frame, area: Rect, s: &DerivedState) {
    let (color, title) = if s.overdrive_active {
        (Color::Yellow, " ⚡ OVERDRIVE ⚡ ")
    } else {
        (Color::Magenta, " Overdrive ")
    };
    frame.render_widget(
        Gauge::default()
            .block(
                Block::default()
                    .title(Span::styled(
                        title,
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color)),
            )
            .gauge_style(Style::default().fg(color))
            .ratio((s.overdrive_meter as f64 / 100.0).clamp(0.0, 1.0))
            .label(format!("{}%", s.overdrive_meter)),
        area,
    );
}

/// Combo multiplier and the last accepted eSense values.
fn draw_meters(frame: &mut Frame, area: Rect, s: &DerivedState) {
    let meter = |v: Option<u8>| v.map_or_else(|| " --".to_owned(), |v| format!("{v:3}"));
    let combo_color = if s.combo >= 4 { Color::Magenta } else { Color::White };
    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled("Combo ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("x{}", s.combo),
            Style::default().fg(combo_color).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled("Attention ", Style::default().fg(Color::DarkGray)),
        Span::styled(meter(s.attention), Style::default().fg(Color::Cyan)),
        sep(),
        Span::styled("Meditation ", Style::default().fg(Color::DarkGray)),
        Span::styled(meter(s.meditation), Style::default().fg(Color::Green)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

// ── Waveform ──────────────────────────────────────────────────────────────────

fn draw_waveform(frame: &mut Frame, area: Rect, s: &DerivedState) {
    // Clamp so ratatui keeps every point on-screen instead of dropping it.
    let data: Vec<(f64, f64)> = s
        .waveform
        .points()
        .iter()
        .map(|p| (p.x, p.y.clamp(0.0, WAVEFORM_MAX_Y)))
        .collect();
    let x_max = (WAVEFORM_CAPACITY - 1) as f64 * WAVEFORM_X_STEP;

    let chart = Chart::new(vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&data)])
    .block(
        Block::default()
            .title(Span::styled(
                " Raw wave ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL),
    )
    .x_axis(
        Axis::default()
            .bounds([0.0, x_max])
            .style(Style::default().fg(Color::DarkGray)),
    )
    .y_axis(
        Axis::default()
            .bounds([0.0, WAVEFORM_MAX_Y])
            .labels(vec!["0".to_string(), "50".to_string(), "100".to_string()])
            .style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(chart, area);
}

// ── Band geometry ─────────────────────────────────────────────────────────────

fn tint_color(tint: Tint) -> Color {
    match tint {
        Tint::Calm => Color::Cyan,
        Tint::Streak => Color::Magenta,
        Tint::Overdrive => Color::Yellow,
    }
}

/// Closed polygon through the eight band points.  Geometry uses screen
/// coordinates (y down); the canvas is y up, so y is flipped.
fn draw_geometry(frame: &mut Frame, area: Rect, s: &DerivedState) {
    let color = tint_color(s.tint);
    let pts: Vec<(f64, f64)> = s
        .geometry
        .iter()
        .map(|p| (p.x, GEOMETRY_EXTENT - p.y))
        .collect();
    let origin = (GEOMETRY_ORIGIN.x, GEOMETRY_EXTENT - GEOMETRY_ORIGIN.y);

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(Span::styled(
                    " Bands ",
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .marker(symbols::Marker::Braille)
        .x_bounds([0.0, GEOMETRY_EXTENT])
        .y_bounds([0.0, GEOMETRY_EXTENT])
        .paint(move |ctx| {
            for (i, &(x1, y1)) in pts.iter().enumerate() {
                let (x2, y2) = pts[(i + 1) % pts.len()];
                ctx.draw(&CanvasLine::new(x1, y1, x2, y2, color));
                ctx.draw(&CanvasLine::new(origin.0, origin.1, x1, y1, Color::DarkGray));
            }
            ctx.draw(&Points {
                coords: &pts,
                color: Color::White,
            });
            for (&(x, y), name) in pts.iter().zip(BAND_NAMES) {
                ctx.print(x, y, Span::styled(name, Style::default().fg(Color::DarkGray)));
            }
        });
    frame.render_widget(canvas, area);
}

// ── Electrodes ────────────────────────────────────────────────────────────────

fn draw_electrodes(frame: &mut Frame, area: Rect, s: &DerivedState) {
    let lines: Vec<Line> = ELECTRODE_NAMES
        .chunks(4)
        .zip(s.electrodes.chunks(4))
        .map(|(names, qualities)| {
            let mut spans = vec![Span::raw(" ")];
            for (name, q) in names.iter().zip(qualities) {
                let (dot, color) = match q {
                    ElectrodeQuality::Unknown => ("○", Color::DarkGray),
                    ElectrodeQuality::Good => ("●", Color::Green),
                    ElectrodeQuality::Fair => ("●", Color::Yellow),
                    ElectrodeQuality::Poor => ("●", Color::Red),
                };
                spans.push(Span::styled(format!("{dot} {name:<4}"), Style::default().fg(color)));
            }
            Line::from(spans)
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Contact ").borders(Borders::ALL)),
        area,
    );
}

// ── Footer ────────────────────────────────────────────────────────────────────

fn draw_footer(frame: &mut Frame, area: Rect, ui: &Dashboard) {
    let line = Line::from(vec![
        Span::raw(" "),
        key("[c]"),
        Span::raw("Connect  "),
        key("[d]"),
        Span::raw("Disconnect  "),
        key("[r]"),
        Span::raw("Reset  "),
        key("[q]"),
        Span::raw("Quit"),
        sep(),
        Span::styled(
            ui.snapshot.status_message.clone(),
            Style::default()
                .fg(tint_color(ui.snapshot.tint))
                .add_modifier(Modifier::BOLD),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn key(s: &str) -> Span<'_> {
    Span::styled(
        s,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    use std::io::IsTerminal as _;
    if !io::stdout().is_terminal() {
        eprintln!("Error: thinkgear tui requires a real terminal (TTY).");
        eprintln!("Run it directly in a terminal emulator, not piped or redirected.");
        std::process::exit(1);
    }

    let config = load_from_args()?;

    // ── Logging ─────────────────────────────────────────────────────────────
    // Logs go to thinkgear-tui.log so they never draw over the dashboard.
    {
        use std::fs::File;
        if let Ok(file) = File::create("thinkgear-tui.log") {
            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
            )
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        }
    }

    let simulate = std::env::args().any(|a| a == "--simulate");

    let shared: Shared = Arc::new(Mutex::new(Session::new(
        Dashboard::new(),
        config.session.clone(),
    )));
    let mut source = Some(start_source(&shared, &config, simulate));

    // ── Terminal setup ────────────────────────────────────────────────────────
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let tick = Duration::from_millis(33); // ~30 FPS

    // ── Main loop ─────────────────────────────────────────────────────────────
    loop {
        // ── 1. Render ─────────────────────────────────────────────────────────
        let ring = {
            let mut session = lock(&shared);
            if let Some(Source::Link(h)) = &source {
                session.sink_mut().stats = h.stats();
            }
            terminal.draw(|f| draw(f, session.sink()))?;
            std::mem::take(&mut session.sink_mut().pending_bell)
        };
        if ring {
            execute!(terminal.backend_mut(), Print("\x07"))?;
        }

        // ── 2. Handle keyboard ────────────────────────────────────────────────
        if !event::poll(tick)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        // Raw mode delivers Ctrl+C as a key event.
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            _ if ctrl_c => break,

            KeyCode::Char('c') => {
                if let Some(old) = source.take() {
                    old.stop();
                }
                source = Some(start_source(&shared, &config, simulate));
            }

            KeyCode::Char('d') => {
                if let Some(old) = source.take() {
                    old.stop();
                }
                let mut session = lock(&shared);
                let ui = session.sink_mut();
                ui.generation += 1;
                ui.mode = AppMode::Idle;
                ui.snapshot.link_status = LinkStatus::Offline;
            }

            KeyCode::Char('r') => {
                let mut session = lock(&shared);
                session.reset();
                let fresh = session.state().clone();
                session.sink_mut().snapshot = fresh;
            }

            _ => {}
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    match source {
        Some(Source::Link(h)) => h.disconnect().await,
        Some(Source::Simulator(task)) => task.abort(),
        None => {}
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
