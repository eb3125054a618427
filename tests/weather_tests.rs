//! Weather Accumulation Tests
//!
//! Tests for:
//! - accumulate: one-sided clamps for wetness and snow cover tables
//! - WeatherAccumulator: seeding, day-jump snapping, transition blending
//! - transition_percentage: fade-in / fade-out thresholds
//! - CalendarTime: month fraction

use prism::features::weather::{
    AccumulationRates, CalendarTime, Depths, MAX_PUDDLE_DEPTH, MAX_WETNESS_DEPTH, Precipitation,
    SNOW_COVER_RATES, SkyMode, SkyState, WETNESS_RATES, WeatherAccumulator, WeatherClass,
    WeatherFlags, WeatherInfo, accumulate, transition_percentage,
};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn weather(form_id: u32, flags: WeatherFlags) -> WeatherInfo {
    let precipitating = flags.intersects(WeatherFlags::RAINY | WeatherFlags::SNOW);
    WeatherInfo {
        form_id,
        editor_id: format!("Weather{form_id:08X}"),
        flags,
        precipitation: precipitating.then_some(Precipitation {
            particle_density: 100.0,
            gravity_velocity: 10.0,
        }),
        precipitation_begin_fade_in: 128.0,
        precipitation_end_fade_out: 128.0,
    }
}

fn sky(current: WeatherInfo, last: Option<WeatherInfo>, pct: f32) -> SkyState {
    SkyState {
        mode: SkyMode::Full,
        current: Some(current),
        last,
        current_weather_pct: pct,
    }
}

// ============================================================================
// accumulate
// ============================================================================

#[test]
fn clear_hour_from_dry_stays_dry() {
    let depths = accumulate(&WETNESS_RATES, WeatherClass::Clear, 3600.0, Depths::ZERO);
    assert_eq!(depths, Depths::ZERO);
}

#[test]
fn rain_hour_from_dry_clamps_to_max() {
    let depths = accumulate(&WETNESS_RATES, WeatherClass::Rain, 3600.0, Depths::ZERO);
    assert!(approx(depths.wetness, MAX_WETNESS_DEPTH));
    assert!(approx(depths.puddle, 2.0));
    let soaked = accumulate(&WETNESS_RATES, WeatherClass::Rain, 7200.0, Depths::ZERO);
    assert!(approx(soaked.puddle, MAX_PUDDLE_DEPTH));
}

#[test]
fn wetness_rates_are_ordered() {
    let r = WETNESS_RATES;
    assert!(r.rain > r.snow && r.snow > r.cloudy && r.cloudy > r.clear);
    assert!(SNOW_COVER_RATES.rate(WeatherClass::Snow) > 0.0);
    assert!(SNOW_COVER_RATES.rate(WeatherClass::Rain) < SNOW_COVER_RATES.rate(WeatherClass::Clear));
}

#[test]
fn custom_rates_are_honoured() {
    let rates = AccumulationRates {
        rain: 0.0,
        snow: 0.0,
        cloudy: 1.0,
        clear: 0.0,
        precipitation: WeatherClass::Rain,
    };
    let depths = accumulate(&rates, WeatherClass::Cloudy, 0.25, Depths::ZERO);
    assert!(approx(depths.wetness, 0.5));
    assert!(approx(depths.puddle, 0.25));
}

// ============================================================================
// WeatherAccumulator
// ============================================================================

#[test]
fn first_sample_only_seeds() {
    let mut acc = WeatherAccumulator::new(WETNESS_RATES);
    let sample = acc.update(&sky(weather(1, WeatherFlags::RAINY), None, 1.0), 1000.0);
    assert_eq!(sample.amount, 0.0);
    assert_eq!(acc.last_game_time, Some(1000.0));
}

#[test]
fn rain_for_an_hour_saturates() {
    let mut acc = WeatherAccumulator::new(WETNESS_RATES);
    let state = sky(weather(1, WeatherFlags::RAINY), None, 1.0);
    acc.update(&state, 0.0);
    let sample = acc.update(&state, 3600.0);
    assert!(approx(acc.depths.wetness, MAX_WETNESS_DEPTH));
    assert!(approx(sample.amount, 1.0));
    assert!(sample.current_precipitation > 0.0);
}

#[test]
fn day_jump_snaps_never_partial() {
    for (flags, expected) in [
        (WeatherFlags::RAINY, MAX_WETNESS_DEPTH),
        (WeatherFlags::PLEASANT, 0.0),
        (WeatherFlags::CLOUDY, 0.0),
    ] {
        let mut acc = WeatherAccumulator::new(WETNESS_RATES);
        acc.depths = Depths {
            wetness: 0.7,
            puddle: 0.3,
        };
        let state = sky(weather(1, flags), None, 1.0);
        acc.update(&state, 0.0);
        let sample = acc.update(&state, 90_000.0);

        assert_eq!(acc.depths.wetness, expected, "{flags:?}");
        assert!(approx(sample.transition, 1.0));
    }
}

#[test]
fn backwards_jump_of_a_day_also_snaps() {
    let mut acc = WeatherAccumulator::new(SNOW_COVER_RATES);
    let state = sky(weather(2, WeatherFlags::SNOW), None, 1.0);
    acc.update(&state, 200_000.0);
    acc.update(&state, 100_000.0);
    assert_eq!(acc.depths.wetness, MAX_WETNESS_DEPTH);
    assert_eq!(acc.depths.puddle, MAX_PUDDLE_DEPTH);
}

#[test]
fn no_active_weather_keeps_depths() {
    let mut acc = WeatherAccumulator::new(WETNESS_RATES);
    acc.depths.wetness = 0.5;
    let interior = SkyState {
        mode: SkyMode::Interior,
        current: Some(weather(1, WeatherFlags::RAINY)),
        ..Default::default()
    };
    let sample = acc.update(&interior, 50.0);
    assert_eq!(acc.depths.wetness, 0.5);
    assert_eq!(sample.amount, 0.0);
    assert_eq!(acc.last_game_time, None);
}

#[test]
fn transition_blends_last_weather() {
    let mut acc = WeatherAccumulator::new(WETNESS_RATES);
    let state = sky(
        weather(2, WeatherFlags::PLEASANT),
        Some(weather(1, WeatherFlags::RAINY)),
        0.25,
    );
    acc.update(&state, 0.0);
    let sample = acc.update(&state, 1.0);

    // the last weather rained: fade out holds it until its threshold
    assert!(approx(sample.transition, transition_percentage(0.25, 128.0, false)));
    assert!(sample.last_precipitation > 0.0);
    assert_eq!(sample.current_precipitation, 0.0);
    assert_eq!(acc.last_weather_id, 1);
    assert_eq!(acc.current_weather_id, 2);
}

#[test]
fn snow_cover_fade_out_keys_on_rain() {
    let clear = weather(3, WeatherFlags::PLEASANT);

    let mut after_rain = WeatherAccumulator::new(SNOW_COVER_RATES);
    let state = sky(clear.clone(), Some(weather(1, WeatherFlags::RAINY)), 0.25);
    after_rain.update(&state, 0.0);
    let sample = after_rain.update(&state, 1.0);
    assert!(approx(sample.transition, transition_percentage(0.25, 128.0, false)));
    assert!(sample.last_precipitation > 0.0);

    // last snowfall fades in on the current weather instead
    let mut after_snow = WeatherAccumulator::new(SNOW_COVER_RATES);
    let state = sky(clear, Some(weather(2, WeatherFlags::SNOW)), 0.25);
    after_snow.update(&state, 0.0);
    let sample = after_snow.update(&state, 1.0);
    assert!(approx(sample.transition, transition_percentage(0.25, 128.0, true)));
    assert_eq!(sample.last_precipitation, 0.0);
}

// ============================================================================
// transition_percentage / calendar
// ============================================================================

#[test]
fn fade_thresholds() {
    // begin_fade 128 -> start 0.5
    assert!(approx(transition_percentage(0.25, 128.0, true), 0.0));
    assert!(approx(transition_percentage(0.75, 128.0, true), 0.5));
    assert!(approx(transition_percentage(0.25, 128.0, false), 0.5));
    assert!(approx(transition_percentage(1.0, 128.0, false), 1.0));
    // non-positive thresholds wrap
    assert!(approx(
        transition_percentage(0.75, -128.0, true),
        transition_percentage(0.75, 128.0, true)
    ));
}

#[test]
fn month_fraction_spans_the_year() {
    let start = CalendarTime::default();
    assert_eq!(start.month_fraction(), 0.0);
    let late = CalendarTime {
        month: 11,
        day: 31,
        hour: 23,
        ..Default::default()
    };
    assert!(late.month_fraction() < 1.0);
    assert!(late.month_fraction() > 0.99);
    let day_two = CalendarTime {
        days_passed: 2.0,
        ..Default::default()
    };
    assert_eq!(day_two.game_time_seconds(), 172_800.0);
}
