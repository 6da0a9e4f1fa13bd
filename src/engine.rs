//! Derived-state transitions.
//!
//! [`apply`] folds one [`Sample`] into a [`DerivedState`] and returns the
//! next snapshot; [`on_raw_sample`] is the waveform-only shortcut.  Both are
//! pure: no I/O, no clocks, no shared state.  The host owns the current
//! snapshot and must call them from a single serialized context.
//!
//! Rule order per sample:
//!
//! 1. waveform (any line with a non-zero `rawEeg`)
//! 2. link status (eSense lines)
//! 3. gate: the game rules below run only for eSense lines with
//!    `poorSignalLevel < 50`; noisy lines freeze them
//! 4. combo → overdrive → scoring → level-up → geometry → tint
//! 5. electrode quality map (eSense lines)

use std::f64::consts::TAU;

use crate::protocol::{ELECTRODE_COUNT, WAVEFORM_BASELINE, WAVEFORM_MAX_Y, WAVEFORM_RAW_DIVISOR};
use crate::types::{
    Cue, DerivedState, ESense, EegPower, ElectrodeQuality, LinkStatus, Point, Sample, Tint,
};

// ── Rule constants ───────────────────────────────────────────────────────────

/// Contact must be strictly below this level for the game rules to run.
pub const GOOD_CONTACT_THRESHOLD: u8 = 50;

pub const COMBO_MIN: u8 = 1;
pub const COMBO_MAX: u8 = 5;
/// Attention strictly above this grows the combo.
pub const COMBO_BUILD_ATTENTION: u8 = 60;
/// Attention strictly below this breaks the combo.
pub const COMBO_BREAK_ATTENTION: u8 = 40;

pub const OVERDRIVE_MAX: u8 = 100;
/// Meter drained per sample while overdrive is active.
pub const OVERDRIVE_DRAIN: u8 = 10;

/// `midGamma` strictly above this doubles the XP gain.
pub const CRITICAL_MID_GAMMA: u32 = 10_000;

pub const INITIAL_MAX_XP: u32 = 100;

/// Centre of the band geometry.
pub const GEOMETRY_ORIGIN: Point = Point::new(150.0, 150.0);
pub const GEOMETRY_BASE_RADIUS: f64 = 50.0;
/// Radius added per combo step.
pub const GEOMETRY_COMBO_RADIUS: f64 = 5.0;
/// Radius added per natural-log unit of band power.
pub const GEOMETRY_LOG_SCALE: f64 = 5.0;

/// Combo at which the geometry switches to the streak tint.
const STREAK_TINT_COMBO: u8 = 4;

// ── Transitions ──────────────────────────────────────────────────────────────

/// Fold one sample into `state` and return the next snapshot.
///
/// `cues` on the result hold only the cues raised by this call.
pub fn apply(state: &DerivedState, sample: &Sample) -> DerivedState {
    let mut next = state.clone();
    next.cues.clear();

    if let Some(raw) = sample.raw_eeg {
        push_raw(&mut next, raw);
    }

    let Some(esense) = sample.esense else {
        return next;
    };
    let level = sample.signal_level();

    next.link_status = if level == 0 {
        LinkStatus::Linked
    } else {
        LinkStatus::Searching
    };

    if level < GOOD_CONTACT_THRESHOLD {
        run_game_rules(&mut next, esense, sample.eeg_power.as_ref());
    }

    next.electrodes = [ElectrodeQuality::from_signal_level(level); ELECTRODE_COUNT];
    next
}

/// Waveform-only transition for a single raw ADC tick.
pub fn on_raw_sample(state: &DerivedState, raw: i32) -> DerivedState {
    let mut next = state.clone();
    next.cues.clear();
    push_raw(&mut next, raw);
    next
}

/// Map a raw ADC tick to the waveform's display range.
pub fn raw_to_display(raw: i32) -> f64 {
    (WAVEFORM_BASELINE + raw as f64 / WAVEFORM_RAW_DIVISOR).clamp(0.0, WAVEFORM_MAX_Y)
}

/// Project the eight band powers onto a circle whose radius grows with `combo`.
///
/// Band `i` sits at angle `i × 2π/8` (counter-clockwise in maths orientation,
/// starting on the +x axis) at radius `50 + 5·combo + 5·ln(power)`.  Zero
/// power is clamped to 1 so its point sits on the base circle.
pub fn project_bands(power: &EegPower, combo: u8) -> Vec<Point> {
    let base = GEOMETRY_BASE_RADIUS + combo as f64 * GEOMETRY_COMBO_RADIUS;
    let bands = power.bands();
    let step = TAU / bands.len() as f64;
    bands
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let r = base + GEOMETRY_LOG_SCALE * (p.max(1) as f64).ln();
            let angle = i as f64 * step;
            Point::new(
                GEOMETRY_ORIGIN.x + r * angle.cos(),
                GEOMETRY_ORIGIN.y + r * angle.sin(),
            )
        })
        .collect()
}

fn push_raw(state: &mut DerivedState, raw: i32) {
    if raw != 0 {
        state.waveform.push(raw_to_display(raw));
    }
}

fn run_game_rules(state: &mut DerivedState, esense: ESense, power: Option<&EegPower>) {
    state.attention = Some(esense.attention);
    state.meditation = Some(esense.meditation);

    update_combo(state, esense.attention);
    update_overdrive(state, esense.meditation);
    score(state, esense.attention, power);
    level_up(state);

    if let Some(power) = power {
        state.geometry = project_bands(power, state.combo);
    }

    state.tint = if state.overdrive_active {
        Tint::Overdrive
    } else if state.combo >= STREAK_TINT_COMBO {
        Tint::Streak
    } else {
        Tint::Calm
    };
}

fn update_combo(state: &mut DerivedState, attention: u8) {
    if attention > COMBO_BUILD_ATTENTION {
        state.combo = (state.combo + 1).min(COMBO_MAX);
    } else if attention < COMBO_BREAK_ATTENTION {
        if state.combo > COMBO_MIN {
            state.status_message = "COMBO BROKEN!".into();
        }
        state.combo = COMBO_MIN;
    }
}

fn update_overdrive(state: &mut DerivedState, meditation: u8) {
    if !state.overdrive_active {
        let charged = state.overdrive_meter as u16 + (meditation / 10) as u16;
        if charged >= OVERDRIVE_MAX as u16 {
            state.overdrive_active = true;
            state.overdrive_meter = OVERDRIVE_MAX;
            state.status_message = ">>> OVERDRIVE ACTIVATED <<<".into();
            state.cues.push(Cue::OverdriveActivated);
        } else {
            state.overdrive_meter = charged as u8;
        }
    } else if state.overdrive_meter <= OVERDRIVE_DRAIN {
        state.overdrive_active = false;
        state.overdrive_meter = 0;
        state.status_message = "Overdrive Depleted".into();
    } else {
        state.overdrive_meter -= OVERDRIVE_DRAIN;
    }
}

fn score(state: &mut DerivedState, attention: u8, power: Option<&EegPower>) {
    let mut base_gain = (attention / 10) as u32;
    if power.is_some_and(|p| p.mid_gamma > CRITICAL_MID_GAMMA) {
        state.status_message = "CRITICAL SYNAPSE!".into();
        base_gain *= 2;
    }

    let multiplier = if state.overdrive_active {
        state.combo as u32 * 2
    } else {
        state.combo as u32
    };
    let gain = base_gain * multiplier;

    state.score += gain as u64 * 10;
    state.current_xp = state.current_xp.saturating_add(gain);
}

// At most one level per sample; surplus XP is discarded.
fn level_up(state: &mut DerivedState) {
    if state.current_xp >= state.max_xp {
        state.level += 1;
        state.current_xp = 0;
        state.max_xp = (state.max_xp as u64 * 3 / 2).min(u32::MAX as u64) as u32;
        state.status_message = format!("LEVEL UP! RANK {}", state.level);
        state.cues.push(Cue::LevelUp { level: state.level });
    }
}
