//! Weather-Accumulation Model
//!
//! Integrates a wetness (or snow) depth and a puddle depth over elapsed game
//! time, blending between the current weather and the weather it is fading
//! from. Host queries (sky, calendar) are passed in as plain data so the
//! model stays a pure function of its inputs.
//!
//! ```rust,ignore
//! use prism::features::weather::{accumulate, Depths, WeatherClass, WETNESS_RATES};
//!
//! let wet = accumulate(&WETNESS_RATES, WeatherClass::Rain, 3600.0, Depths::ZERO);
//! assert_eq!(wet.wetness, prism::features::weather::MAX_WETNESS_DEPTH);
//! ```

use bitflags::bitflags;

// ─── Constants ───────────────────────────────────────────────────────────────

pub const MIN_START_PERCENTAGE: f32 = 0.05;
pub const DEFAULT_TRANSITION_PERCENTAGE: f32 = 1.0;
pub const TRANSITION_DENOMINATOR: f32 = 256.0;
/// Speed at which wetness builds up and dries.
pub const WETNESS_SCALE: f32 = 2.0;
/// Speed at which puddles build up and dry.
pub const PUDDLE_SCALE: f32 = 1.0;
pub const MAX_PUDDLE_DEPTH: f32 = 3.0;
pub const MAX_WETNESS_DEPTH: f32 = 2.0;
pub const MAX_PUDDLE_WETNESS: f32 = 1.0;
pub const MAX_WETNESS: f32 = 1.0;
pub const SECONDS_IN_A_DAY: f64 = 86400.0;
/// Elapsed time beyond which accumulation snaps instead of integrating.
pub const MAX_TIME_DELTA: f64 = SECONDS_IN_A_DAY - 30.0;
pub const MIN_WEATHER_TRANSITION_SPEED: f32 = 0.0;
pub const MAX_WEATHER_TRANSITION_SPEED: f32 = 500.0;
/// Game seconds are scaled by the midpoint of the transition speed range.
pub const WEATHER_TRANSITION_SPEED: f32 =
    MIN_WEATHER_TRANSITION_SPEED + (MAX_WEATHER_TRANSITION_SPEED - MIN_WEATHER_TRANSITION_SPEED) / 2.0;
pub const AVERAGE_RAIN_VOLUME: f32 = 4000.0;
pub const MIN_RAINDROP_CHANCE_MULTIPLIER: f32 = 0.1;
pub const MAX_RAINDROP_CHANCE_MULTIPLIER: f32 = 2.0;

// ─── Host Weather Data ───────────────────────────────────────────────────────

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct WeatherFlags: u8 {
        const PLEASANT = 1 << 0;
        const CLOUDY   = 1 << 1;
        const RAINY    = 1 << 2;
        const SNOW     = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Precipitation {
    pub particle_density: f32,
    pub gravity_velocity: f32,
}

/// One weather record as reported by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherInfo {
    pub form_id: u32,
    pub editor_id: String,
    pub flags: WeatherFlags,
    pub precipitation: Option<Precipitation>,
    /// Raw fade threshold in `[0, 256)`; zero or negative wraps.
    pub precipitation_begin_fade_in: f32,
    pub precipitation_end_fade_out: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherClass {
    Rain,
    Snow,
    Cloudy,
    Clear,
}

impl WeatherInfo {
    /// Rain and snow count only with precipitation data present.
    #[must_use]
    pub fn classify(&self) -> WeatherClass {
        let precipitating = self.precipitation.is_some();
        if precipitating && self.flags.contains(WeatherFlags::RAINY) {
            WeatherClass::Rain
        } else if precipitating && self.flags.contains(WeatherFlags::SNOW) {
            WeatherClass::Snow
        } else if self.flags.contains(WeatherFlags::CLOUDY) {
            WeatherClass::Cloudy
        } else {
            WeatherClass::Clear
        }
    }

    /// Precipitation intensity multiplier; zero without precipitation.
    #[must_use]
    pub fn raindrop_chance(&self) -> f32 {
        self.precipitation.map_or(0.0, |p| {
            (p.particle_density * p.gravity_velocity / AVERAGE_RAIN_VOLUME)
                .clamp(MIN_RAINDROP_CHANCE_MULTIPLIER, MAX_RAINDROP_CHANCE_MULTIPLIER)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SkyMode {
    #[default]
    None,
    Interior,
    SkyDomeOnly,
    Full,
}

/// Sky state for one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkyState {
    pub mode: SkyMode,
    pub current: Option<WeatherInfo>,
    pub last: Option<WeatherInfo>,
    /// Progress of the current weather's fade in, `[0, 1]`.
    pub current_weather_pct: f32,
}

impl SkyState {
    /// Current weather, only when the full sky is simulated.
    #[must_use]
    pub fn active_weather(&self) -> Option<&WeatherInfo> {
        (self.mode == SkyMode::Full).then_some(self.current.as_ref()).flatten()
    }
}

/// Calendar time as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalendarTime {
    /// Zero-based month.
    pub month: u32,
    /// Day of month.
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Fractional game days since the start of the save.
    pub days_passed: f64,
}

impl CalendarTime {
    #[must_use]
    pub fn game_time_seconds(&self) -> f64 {
        self.days_passed * SECONDS_IN_A_DAY
    }

    /// Position in the year as a fraction in `[0, 1)`.
    #[must_use]
    pub fn month_fraction(&self) -> f32 {
        let minutes = f64::from(self.minute) + f64::from(self.second) / 61.0;
        let hours = f64::from(self.hour) + minutes / 60.0;
        let days = f64::from(self.day) + hours / 24.0;
        ((f64::from(self.month) + days / 32.0) / 12.0) as f32
    }
}

// ─── Accumulation ────────────────────────────────────────────────────────────

/// Signed depth change per game second for each weather class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulationRates {
    pub rain: f32,
    pub snow: f32,
    pub cloudy: f32,
    pub clear: f32,
    /// Class whose precipitation drives the current-weather intensity.
    /// Fade-out always keys on the last weather raining, for every table.
    pub precipitation: WeatherClass,
}

impl AccumulationRates {
    #[must_use]
    pub fn rate(&self, class: WeatherClass) -> f32 {
        match class {
            WeatherClass::Rain => self.rain,
            WeatherClass::Snow => self.snow,
            WeatherClass::Cloudy => self.cloudy,
            WeatherClass::Clear => self.clear,
        }
    }
}

/// Surface wetness: rain wets, everything else dries.
pub const WETNESS_RATES: AccumulationRates = AccumulationRates {
    rain: 2.0 / 3600.0,
    snow: -0.489 / 3600.0,
    cloudy: -0.735 / 3600.0,
    clear: -1.518 / 3600.0,
    precipitation: WeatherClass::Rain,
};

/// Snow cover: snow builds, rain melts fastest.
pub const SNOW_COVER_RATES: AccumulationRates = AccumulationRates {
    rain: -2.0 / 3600.0,
    snow: 2.0 / 3600.0,
    cloudy: -0.735 / 3600.0,
    clear: -1.518 / 3600.0,
    precipitation: WeatherClass::Snow,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Depths {
    pub wetness: f32,
    pub puddle: f32,
}

impl Depths {
    pub const ZERO: Depths = Depths {
        wetness: 0.0,
        puddle: 0.0,
    };

    #[must_use]
    pub fn lerp(self, other: Depths, t: f32) -> Depths {
        Depths {
            wetness: self.wetness + (other.wetness - self.wetness) * t,
            puddle: self.puddle + (other.puddle - self.puddle) * t,
        }
    }
}

fn step(depth: f32, delta: f32, max: f32) -> f32 {
    if delta > 0.0 {
        (depth + delta).min(max)
    } else {
        (depth + delta).max(0.0)
    }
}

/// Integrates `seconds` of `class` weather onto `depths`.
#[must_use]
pub fn accumulate(rates: &AccumulationRates, class: WeatherClass, seconds: f32, depths: Depths) -> Depths {
    let rate = rates.rate(class);
    Depths {
        wetness: step(depths.wetness, rate * WETNESS_SCALE * seconds, MAX_WETNESS_DEPTH),
        puddle: step(depths.puddle, rate * PUDDLE_SCALE * seconds, MAX_PUDDLE_DEPTH),
    }
}

/// Blend factor toward the current weather.
///
/// Fading in waits until the current weather passes its precipitation begin
/// threshold; fading out holds the last weather until its precipitation
/// ends.
#[must_use]
pub fn transition_percentage(current_weather_pct: f32, begin_fade: f32, fade_in: bool) -> f32 {
    let begin_fade = if begin_fade > 0.0 {
        begin_fade
    } else {
        begin_fade + TRANSITION_DENOMINATOR
    };
    let start = 1.0 - (TRANSITION_DENOMINATOR - begin_fade) * (1.0 / TRANSITION_DENOMINATOR);

    if fade_in {
        ((current_weather_pct - start) / (1.0 - start)).clamp(0.0, 1.0)
    } else {
        1.0 - ((start - current_weather_pct) / start).clamp(0.0, 1.0)
    }
}

/// Output of one accumulator step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeatherSample {
    /// `min(wetness depth, MAX_WETNESS)`.
    pub amount: f32,
    pub puddle: f32,
    pub transition: f32,
    /// Raindrop chance of the current weather when it precipitates the
    /// tracked class.
    pub current_precipitation: f32,
    pub last_precipitation: f32,
}

/// Persistent per-feature accumulation state.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAccumulator {
    pub depths: Depths,
    pub last_game_time: Option<f64>,
    pub previous_transition: f32,
    pub current_weather_id: u32,
    pub last_weather_id: u32,
    rates: AccumulationRates,
}

impl WeatherAccumulator {
    #[must_use]
    pub fn new(rates: AccumulationRates) -> Self {
        Self {
            depths: Depths::ZERO,
            last_game_time: None,
            previous_transition: 0.0,
            current_weather_id: 0,
            last_weather_id: 0,
            rates,
        }
    }

    #[must_use]
    pub fn rates(&self) -> &AccumulationRates {
        &self.rates
    }

    /// Advances the accumulation to `game_time_seconds`.
    ///
    /// The first sample only seeds the clock. A jump of a day or more snaps
    /// both depths to 0 or their maximum by the sign of a one-second sample
    /// of the current weather.
    pub fn update(&mut self, sky: &SkyState, game_time_seconds: f64) -> WeatherSample {
        let previous_last_id = self.last_weather_id;
        self.current_weather_id = 0;
        self.last_weather_id = 0;

        let mut sample = WeatherSample {
            transition: self.previous_transition,
            ..Default::default()
        };

        let Some(current) = sky.active_weather() else {
            return sample;
        };
        let current_class = current.classify();
        if current_class == self.rates.precipitation {
            sample.current_precipitation = current.raindrop_chance();
        }
        self.current_weather_id = current.form_id;

        let last_time = *self.last_game_time.get_or_insert(game_time_seconds);
        let mut seconds = game_time_seconds - last_time;
        self.last_game_time = Some(game_time_seconds);

        let mut transition = self.previous_transition;

        if seconds.abs() >= MAX_TIME_DELTA {
            seconds = 0.0;
            transition = DEFAULT_TRANSITION_PERCENTAGE;
            let probe = accumulate(&self.rates, current_class, 1.0, Depths::ZERO);
            self.depths = Depths {
                wetness: if probe.wetness > 0.0 { MAX_WETNESS_DEPTH } else { 0.0 },
                puddle: if probe.puddle > 0.0 { MAX_PUDDLE_DEPTH } else { 0.0 },
            };
        }

        let drying_backwards = seconds < 0.0 && (self.depths.wetness > 0.0 || self.depths.puddle > 0.0);
        if seconds > 0.0 || drying_backwards {
            transition = DEFAULT_TRANSITION_PERCENTAGE;
            let scaled = seconds as f32 * WEATHER_TRANSITION_SPEED;
            let current_depths = accumulate(&self.rates, current_class, scaled, self.depths);
            let mut last_depths = self.depths;

            if let Some(last) = &sky.last {
                self.last_weather_id = last.form_id;
                let last_class = last.classify();
                last_depths = accumulate(&self.rates, last_class, scaled, self.depths);
                // Rain holds the blend until its precipitation ends.
                if last_class == WeatherClass::Rain {
                    sample.last_precipitation = last.raindrop_chance();
                    transition = transition_percentage(
                        sky.current_weather_pct,
                        last.precipitation_end_fade_out,
                        false,
                    );
                } else {
                    transition = transition_percentage(
                        sky.current_weather_pct,
                        current.precipitation_begin_fade_in,
                        true,
                    );
                }
            }

            self.depths = last_depths.lerp(current_depths, transition);
        } else {
            self.last_weather_id = previous_last_id;
        }

        sample.amount = self.depths.wetness.min(MAX_WETNESS);
        sample.puddle = self.depths.puddle.min(MAX_PUDDLE_WETNESS);
        sample.transition = transition;
        self.previous_transition = transition;
        sample
    }
}
