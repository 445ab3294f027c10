use std::fmt::Write as _;

use crate::poller::PollerState;

pub const FAULT_BANNER: &str = "Connection failed - using simulated data";

/// Comfort ranges shown next to the live values.
pub const TEMPERATURE_RANGE: &str = "18-26°C";
pub const HUMIDITY_RANGE: &str = "40-60%";

pub fn render(state: &PollerState) -> String {
    let mut out = String::new();

    if state.fault.is_some() {
        let _ = writeln!(out, "!! {FAULT_BANNER}");
    }

    let Some(reading) = &state.reading else {
        let _ = writeln!(out, "S#{} | Loading sensors...", state.selected);
        return out;
    };

    let _ = writeln!(out, "S#{} | {}", state.selected, reading.location);
    let _ = writeln!(out, "  Sensor #{}", reading.id);
    let _ = writeln!(
        out,
        "  Temperature: {}°C (range {TEMPERATURE_RANGE})",
        reading.temperature
    );
    let _ = writeln!(
        out,
        "  Humidity:    {}% (range {HUMIDITY_RANGE})",
        reading.humidity
    );
    let _ = writeln!(out, "  CO2:         {} ppm", reading.co2);
    let _ = writeln!(out, "  Battery:     {}%", reading.battery);
    let _ = writeln!(out, "  Status:      {}", reading.status);
    let _ = writeln!(out, "  Measured at: {}", reading.last_updated);
    if let Some(at) = &state.last_update {
        let _ = writeln!(out, "Updated: {at}");
    }
    if state.in_flight {
        let _ = writeln!(out, "(refreshing...)");
    }

    out
}
