//! Human‑friendly size and duration values.
//!
//! Sizes accept plain numbers or strings such as `"15MB"` and `"4MiB"`.
//! Durations accept plain numbers (seconds) or strings such as `"250ms"`,
//! `"30s"`, `"5m"`, `"24h"` and `"7d"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum UnitValue {
    Num(u64),
    Str(String),
}

fn split_unit(s: &str) -> (String, String) {
    let mut num_part = String::new();
    let mut unit_part = String::new();
    for c in s.trim().chars() {
        if c.is_ascii_digit() || c == '.' {
            num_part.push(c);
        } else if !c.is_whitespace() {
            unit_part.push(c);
        }
    }
    (num_part, unit_part.to_lowercase())
}

/// Parse a size string into bytes. Decimal units are powers of 1000 and
/// binary units powers of 1024.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let (num_part, unit_part) = split_unit(s);
    let number: f64 = num_part
        .parse()
        .map_err(|_| format!("invalid size '{}'", s))?;
    let multiplier = match unit_part.as_str() {
        "" | "b" => 1.0,
        "kb" => 1_000.0,
        "mb" => 1_000_000.0,
        "gb" => 1_000_000_000.0,
        "kib" => 1024.0,
        "mib" => 1024.0 * 1024.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(format!("unknown size unit '{}'", unit_part)),
    };
    let bytes = number * multiplier;
    if bytes > usize::MAX as f64 {
        return Err(format!("size '{}' is out of range", s));
    }
    Ok(bytes as usize)
}

/// Parse a duration string. A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let (num_part, unit_part) = split_unit(s);
    let number: f64 = num_part
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;
    let seconds = match unit_part.as_str() {
        "ms" => number / 1000.0,
        "" | "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        "d" => number * 86_400.0,
        _ => return Err(format!("unknown duration unit '{}'", unit_part)),
    };
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("duration '{}': {}", s, e))
}

/// Custom deserializer for byte sizes.
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match UnitValue::deserialize(deserializer)? {
        UnitValue::Num(n) => Ok(n as usize),
        UnitValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

/// `#[serde(with = "units::duration")]` support for [`Duration`] fields.
pub mod duration {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match UnitValue::deserialize(deserializer)? {
            UnitValue::Num(n) => Ok(Duration::from_secs(n)),
            UnitValue::Str(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }
}
