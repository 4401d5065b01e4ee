use std::f64::consts::PI;

use gardenlink_api::models::{OutputMode, PzemReading};
use rand::Rng;
use time::macros::format_description;
use time::{OffsetDateTime, Time};

use crate::state::MockState;

const MAX_SUNLIGHT_LUX: f64 = 500.0;
const MAX_MOONLIGHT_LUX: f64 = 5.0;

const SUNRISE_START: f64 = 0.23;
const SUNRISE_END: f64 = 0.25;
const SUNSET_START: f64 = 0.73;
const SUNSET_END: f64 = 0.75;

/// Outdoor light level over a day, `day_fraction` in `[0, 1)`.
pub fn simulated_lux(day_fraction: f64) -> f64 {
    if (SUNRISE_START..=SUNSET_END).contains(&day_fraction) {
        if day_fraction <= SUNRISE_END {
            let progress = (day_fraction - SUNRISE_START) / (SUNRISE_END - SUNRISE_START);
            (progress * PI / 2.0).sin() * MAX_SUNLIGHT_LUX
        } else if day_fraction >= SUNSET_START {
            let progress = (day_fraction - SUNSET_START) / (SUNSET_END - SUNSET_START);
            (progress * PI / 2.0).cos() * MAX_SUNLIGHT_LUX
        } else {
            MAX_SUNLIGHT_LUX
        }
    } else {
        // Moonlight peaks at midnight
        let radians = day_fraction * 2.0 * PI;
        (radians + PI).cos().max(0.0) * (MAX_MOONLIGHT_LUX - 0.01) + 0.01
    }
}

/// Household load in watts: a base load with morning and evening peaks.
pub fn simulated_load(day_fraction: f64) -> f64 {
    let morning = (-((day_fraction - 0.30) / 0.05).powi(2)).exp() * 900.0;
    let evening = (-((day_fraction - 0.80) / 0.07).powi(2)).exp() * 1400.0;
    (150.0 + morning + evening).round()
}

pub fn simulated_reading<R: Rng>(
    rng: &mut R,
    pzem_id: &str,
    day_fraction: f64,
    energy: f64,
    now: OffsetDateTime,
) -> PzemReading {
    let voltage = 220.0 + rng.random_range(-4.0..4.0);
    let power = (simulated_load(day_fraction) * rng.random_range(0.9..1.1)).max(0.0);
    let power_factor: f64 = rng.random_range(0.85..0.99);

    PzemReading {
        pzem_id: pzem_id.to_string(),
        voltage,
        current: power / (voltage * power_factor),
        power,
        energy,
        frequency: 50.0 + rng.random_range(-0.1..0.1),
        power_factor,
        created_at: now,
    }
}

/// Whether `now` lies in the daily window `[on, off)`. Windows may wrap midnight.
pub fn within_schedule(on: &str, off: &str, now: Time) -> Option<bool> {
    let format = format_description!("[hour]:[minute]");
    let on = Time::parse(on, &format).ok()?;
    let off = Time::parse(off, &format).ok()?;

    Some(if on <= off {
        on <= now && now < off
    } else {
        now >= on || now < off
    })
}

/// Advances the simulation by one tick of `elapsed_hours`: records a reading
/// per meter and drives the automatic outputs.
pub async fn step(state: &MockState, day_fraction: f64, elapsed_hours: f64, now: OffsetDateTime) {
    let mut store = state.store.write().await;

    let readings: Vec<_> = {
        let mut rng = rand::rng();
        store
            .meters
            .keys()
            .map(|id| {
                let energy = store
                    .readings
                    .get(id)
                    .and_then(|readings| readings.back())
                    .map(|reading| reading.energy + reading.power * elapsed_hours / 1000.0)
                    .unwrap_or(0.0);
                simulated_reading(&mut rng, id, day_fraction, energy, now)
            })
            .collect()
    };
    for reading in readings {
        tracing::debug!(pzem_id = %reading.pzem_id, power = reading.power, "simulated reading");
        state.publish_reading(&reading);
        store.record_reading(reading);
    }

    let lux = simulated_lux(day_fraction);
    let sun_threshold = state.sun_threshold_lux;
    let mut changed = false;
    for output in store.outputs.values_mut() {
        let target = match output.mode {
            OutputMode::Manual => None,
            OutputMode::AutoSun => Some(lux < sun_threshold),
            OutputMode::AutoDatetime => match (&output.turn_on_time, &output.turn_off_time) {
                (Some(on), Some(off)) => within_schedule(on, off, now.time()),
                _ => None,
            },
        };
        if let Some(target) = target {
            changed |= output.switch(target, now);
        }
    }

    if changed {
        state.publish_outputs(&store);
        state.log(&mut store, "Automatic outputs updated");
    }
}

#[cfg(test)]
mod tests {
    use time::macros::time;

    use super::*;

    #[test]
    fn test_lux_follows_the_sun() {
        assert!(simulated_lux(0.5) > 400.0);
        assert!(simulated_lux(0.0) < 10.0);
        assert!(simulated_lux(0.24) > 0.0 && simulated_lux(0.24) < MAX_SUNLIGHT_LUX);
    }

    #[test]
    fn test_load_peaks_in_the_evening() {
        assert!(simulated_load(0.80) > simulated_load(0.30));
        assert!(simulated_load(0.30) > simulated_load(0.05));
    }

    #[test]
    fn test_schedule_window() {
        assert_eq!(within_schedule("06:00", "06:30", time!(6:15)), Some(true));
        assert_eq!(within_schedule("06:00", "06:30", time!(6:30)), Some(false));
        assert_eq!(within_schedule("22:00", "02:00", time!(1:00)), Some(true));
        assert_eq!(within_schedule("22:00", "02:00", time!(12:00)), Some(false));
        assert_eq!(within_schedule("6pm", "02:00", time!(12:00)), None);
    }
}
