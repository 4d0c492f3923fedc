//! Human-readable duration strings ("10s", "250ms", "1m30s").

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: &'static str,
}

/// Parse a sequence of `<number><unit>` pairs. Units: ns, us, ms, s, m, h.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let fail = |reason| DurationError {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(fail("empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| fail("missing unit"))?;
        if digits == 0 {
            return Err(fail("expected number"));
        }
        let value: f64 = rest[..digits].parse().map_err(|_| fail("bad number"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(fail("unknown unit")),
        };
        rest = &rest[unit_len..];

        total += Duration::from_nanos((value * nanos_per_unit) as u64);
    }

    Ok(total)
}
