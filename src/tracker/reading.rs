use crate::{prelude::*, quantity::energy::KilowattHours};

/// Parse a raw host sensor state into a cumulative meter reading.
///
/// Anything that is not a finite non-negative number means there is no reading this tick.
pub fn parse_reading(state: &str) -> Option<KilowattHours> {
    let state = state.trim();
    if state.is_empty() || state.eq_ignore_ascii_case("unavailable") || state.eq_ignore_ascii_case("unknown") {
        debug!(state, "sensor is unavailable");
        return None;
    }
    match state.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(KilowattHours::from(value)),
        Ok(value) => {
            warn!(value, "ignoring an out-of-range reading");
            None
        }
        Err(error) => {
            warn!(state, %error, "ignoring a non-numeric reading");
            None
        }
    }
}

/// Parse a `<import> [<export>]` line into both readings.
pub fn parse_tick(line: &str) -> (Option<KilowattHours>, Option<KilowattHours>) {
    let mut states = line.split_whitespace();
    let import = states.next().and_then(parse_reading);
    let export = states.next().and_then(parse_reading);
    (import, export)
}
