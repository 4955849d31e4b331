// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Settings
//!
//! Settings are strings in a key/value [`ConfigStore`]; [`Settings`] is the typed, validated
//! view used to build an [`EngineConfig`]. Missing keys take their defaults, present keys
//! must parse.
//!
//! | Key | Values | Default |
//! | --- | ------ | ------- |
//! | `framerate` | `30`, `29.97`, `25`, `24.98`, `24`, `23.98` | `30` |
//! | `dropframe` | `Yes`, `No` | `No` |
//! | `tc_start` | `HH:MM:SS:FF` or `HHMMSSFF` | `00000000` |
//! | `userbits` | `Text`, `Digits`, `Date` | `Text` |
//! | `ub_ascii` | four characters | `PICO` |
//! | `ub_bcd` | eight hex digits | `00000000` |
//! | `ub_date` | `Y74-M01-D01+0000` | `Y74-M01-D01+0000` |
//! | `flashframe` | `Off`, a frame number, or a timecode to flash once | `11` |
//! | `calibrate` | `Off`/`No`, `Once`, `Always` | `No` |
//! | `monitor` | `Yes`, `No` | `No` |
//! | `period` | control period in seconds, to the millisecond, at most 300 | `10` |
//! | `jam_frames` | frames to validate before locking | `64` |
//! | `jam_offset` | frames added on lock | `2` |
//! | `calibration.<fmt>` | learned calibration value | none |
//!
//! `<fmt>` is the rate with two decimals, plus `-DF` for drop-frame: `calibration.29.97-DF`.

use core::fmt::Write as _;
use core::str::FromStr;

use heapless::{FnvIndexMap, String};

use crate::clock::{clamp_calval, DEFAULT_PERIOD_MS, MAX_PERIOD_MS};
use crate::control::{CalibrateMode, CalibrationPlan, Learned};
use crate::engine::{EngineConfig, FlashFrame, JamConfig, RxSource, StartMode};
use crate::error::ConfigError;
use crate::timecode::{FrameRate, Timecode, UserFormat};

pub const KEY_LEN: usize = 32;
pub const VALUE_LEN: usize = 24;

/// String key/value persistence.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<&str>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// RAM-backed store, also used to stage values read from flash.
#[derive(Default)]
pub struct MemoryStore {
    map: FnvIndexMap<String<KEY_LEN>, String<VALUE_LEN>, 32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(key, value)` pairs.
    pub fn with(pairs: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let mut store = Self::new();
        for (k, v) in pairs {
            store.set(k, v)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn bounded<const N: usize>(s: &str) -> Result<String<N>, ConfigError> {
    let mut out = String::new();
    out.push_str(s).map_err(|_| ConfigError::Full)?;
    Ok(out)
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<&str> {
        let key: String<KEY_LEN> = bounded(key).ok()?;
        self.map.get(&key).map(|v| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = bounded(key)?;
        let value = bounded(value)?;
        self.map
            .insert(key, value)
            .map(|_| ())
            .map_err(|_| ConfigError::Full)
    }
}

/// Key under which the learned value for a format is stored.
pub fn calibration_key(rate: FrameRate, drop_frame: bool) -> String<KEY_LEN> {
    let mut key = String::new();
    // "calibration.29.97-DF" fits
    let _ = write!(
        key,
        "calibration.{:.2}{}",
        rate.fps(),
        if drop_frame { "-DF" } else { "" }
    );
    key
}

/// Validated settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Starting value with rate, drop-frame and user bits applied.
    pub timecode: Timecode,
    pub flash: FlashFrame,
    pub calibrate: CalibrateMode,
    pub monitor: bool,
    pub period_ms: u32,
    pub jam: JamConfig,
    /// Learned value for this format, if any.
    pub calval: Option<f32>,
}

fn yes_no(v: &str) -> Result<bool, ConfigError> {
    match v {
        "Yes" => Ok(true),
        "No" => Ok(false),
        _ => Err(ConfigError::Invalid),
    }
}

fn number<N: FromStr>(v: &str) -> Result<N, ConfigError> {
    v.trim().parse().map_err(|_| ConfigError::Invalid)
}

/// Seconds with up to three decimals, as exact milliseconds.
fn parse_period(v: &str) -> Result<u32, ConfigError> {
    let (whole, frac) = v.trim().split_once('.').unwrap_or((v.trim(), ""));
    if frac.len() > 3 || !frac.bytes().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Invalid);
    }
    let mut ms = number::<u32>(whole)?
        .checked_mul(1000)
        .ok_or(ConfigError::Invalid)?;
    let mut scale = 100;
    for c in frac.bytes() {
        ms = ms.saturating_add((c - b'0') as u32 * scale);
        scale /= 10;
    }
    if !(1000..=MAX_PERIOD_MS).contains(&ms) {
        return Err(ConfigError::Invalid);
    }
    Ok(ms)
}

fn write_period(out: &mut String<VALUE_LEN>, period_ms: u32) -> core::fmt::Result {
    match period_ms % 1000 {
        0 => write!(out, "{}", period_ms / 1000),
        ms => write!(out, "{}.{:03}", period_ms / 1000, ms),
    }
}

impl Settings {
    pub fn load<S: ConfigStore>(store: &S) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &'static str| store.get(key).unwrap_or(default);

        let rate: FrameRate = get("framerate", "30").parse()?;
        let drop_frame = yes_no(get("dropframe", "No"))?;

        let mut timecode = Timecode::new(rate);
        timecode.set_fps_df(rate, drop_frame)?;

        // tc_start only supplies the time; drop-frame comes from `dropframe`
        let start: Timecode = get("tc_start", "00000000").parse()?;
        timecode.set_time(start.hours(), start.minutes(), start.seconds(), start.frames())?;

        match get("userbits", "Text") {
            "Text" => timecode.set_user_ascii(get("ub_ascii", "PICO"))?,
            "Digits" => timecode.set_user_bcd_hex(get("ub_bcd", "00000000")),
            "Date" => timecode.set_user_date(get("ub_date", "Y74-M01-D01+0000"))?,
            _ => return Err(ConfigError::Invalid),
        }

        let flash = match get("flashframe", "11") {
            "Off" => FlashFrame::Off,
            v if v.len() > 2 => {
                let at: Timecode = v.parse()?;
                let mut tc = timecode;
                tc.set_time(at.hours(), at.minutes(), at.seconds(), at.frames())?;
                FlashFrame::At(tc.to_raw())
            }
            v => {
                let f: u8 = number(v)?;
                if f >= rate.nominal() {
                    return Err(ConfigError::Invalid);
                }
                FlashFrame::Frame(f)
            }
        };

        let calibrate = match get("calibrate", "No") {
            "Off" | "No" => CalibrateMode::Off,
            "Once" => CalibrateMode::Once,
            "Always" => CalibrateMode::Always,
            _ => return Err(ConfigError::Invalid),
        };

        let monitor = yes_no(get("monitor", "No"))?;

        let period_ms = parse_period(get("period", "10"))?;

        let jam = JamConfig {
            frames: number(get("jam_frames", "64"))?,
            offset: number(get("jam_offset", "2"))?,
        };
        if jam.frames == 0 {
            return Err(ConfigError::Invalid);
        }

        let calval = match store.get(&calibration_key(rate, drop_frame)) {
            Some(v) => Some(clamp_calval(number(v)?)),
            None => None,
        };

        Ok(Self {
            timecode,
            flash,
            calibrate,
            monitor,
            period_ms,
            jam,
            calval,
        })
    }

    /// Session configuration for `mode`, applying the stored calibration for this format.
    pub fn engine_config(&self, mode: StartMode) -> EngineConfig {
        EngineConfig {
            timecode: self.timecode,
            mode,
            hold_monitor: self.monitor,
            flash: self.flash,
            jam: self.jam,
            calval: self.calval.unwrap_or(0.0),
            period_ms: self.period_ms,
            calibrate: self.calibrate,
            plan: CalibrationPlan::default(),
            rx_source: RxSource::External,
        }
    }

    /// Persist a learned value and the period it was learned with. `Once` is switched off.
    pub fn store_calibration<S: ConfigStore>(
        &mut self,
        store: &mut S,
        learned: &Learned,
    ) -> Result<(), ConfigError> {
        let mut value: String<VALUE_LEN> = String::new();
        write!(value, "{:.4}", learned.calval).map_err(|_| ConfigError::Full)?;
        store.set(&calibration_key(learned.rate, learned.drop_frame), &value)?;

        value.clear();
        write_period(&mut value, learned.period_ms).map_err(|_| ConfigError::Full)?;
        store.set("period", &value)?;
        self.period_ms = learned.period_ms;

        if self.rate_matches(learned) {
            self.calval = Some(learned.calval);
        }
        if self.calibrate == CalibrateMode::Once {
            store.set("calibrate", "No")?;
            self.calibrate = CalibrateMode::Off;
        }
        Ok(())
    }

    fn rate_matches(&self, learned: &Learned) -> bool {
        self.timecode.rate() == learned.rate && self.timecode.drop_frame() == learned.drop_frame
    }

    pub fn user_format(&self) -> UserFormat {
        self.timecode.user_format()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timecode: Timecode::new(FrameRate::Fps30),
            flash: FlashFrame::Frame(11),
            calibrate: CalibrateMode::Off,
            monitor: false,
            period_ms: DEFAULT_PERIOD_MS,
            jam: JamConfig::default(),
            calval: None,
        }
    }
}
