use std::f64::consts::PI;
use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone, Timelike};
use rand::Rng;

use crate::reading::{SensorReading, Status};

/// Locations handed out to synthetic readings, indexed by `id % 4`.
pub const LOCATIONS: [&str; 4] = ["Room A", "Room B", "Outdoor", "Warehouse"];

pub const TIME_FORMAT: &str = "%H:%M:%S";

const ALERT_PROBABILITY: f64 = 0.15;

/// A source of uniformly distributed noise.
pub trait Noise {
    /// Draws a value in `[low, high)`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

/// Adapts any `rand` generator into a [`Noise`] source.
#[derive(Debug)]
pub struct RandomNoise<R>(pub R);

impl<R: Rng> Noise for RandomNoise<R> {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + self.0.random::<f64>() * (high - low)
    }
}

/// `sin(hour / 24 * π)`: zero at midnight, peaking at noon.
pub fn phase_factor(hour: u32) -> f64 {
    (f64::from(hour) / 24.0 * PI).sin()
}

pub fn location(id: u32) -> &'static str {
    LOCATIONS[(id % 4) as usize]
}

pub fn synthesize<Tz, N>(id: u32, now: DateTime<Tz>, noise: &mut N) -> SensorReading
where
    Tz: TimeZone,
    Tz::Offset: Display,
    N: Noise + ?Sized,
{
    let factor = phase_factor(now.hour());

    let temperature = 22.0 + factor * 8.0 + noise.uniform(-1.0, 1.0);
    let humidity = 50.0 + factor * 15.0 + noise.uniform(-2.5, 2.5);
    let status = if noise.uniform(0.0, 1.0) > ALERT_PROBABILITY {
        Status::Ok
    } else {
        Status::Alert
    };
    // Not clamped: large ids drive the battery below zero.
    let battery = 85.0 - f64::from(id) * 3.0 + noise.uniform(0.0, 10.0);
    let co2 = 400.0 + noise.uniform(0.0, 200.0);

    SensorReading {
        id,
        temperature: format!("{temperature:.1}"),
        humidity: format!("{humidity:.1}"),
        location: location(id).to_string(),
        status,
        last_updated: now.format(TIME_FORMAT).to_string(),
        battery: format!("{battery:.0}"),
        co2: format!("{co2:.0}"),
    }
}

/// Synthesizes a reading for the current local time with thread-local randomness.
pub fn synthesize_now(id: u32) -> SensorReading {
    synthesize(id, Local::now(), &mut RandomNoise(rand::rng()))
}
