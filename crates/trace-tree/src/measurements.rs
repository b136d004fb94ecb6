//! Web and mobile vitals collected from transaction measurements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use trace_tree_protocol::Measurement;

use crate::error::TreeError;

pub const WEB_VITALS: &[&str] = &[
    "ttfb",
    "fp",
    "fcp",
    "lcp",
    "cls",
    "fid",
    "inp",
    "ttfb.requestTime",
];

pub const MOBILE_VITALS: &[&str] = &[
    "app_start_cold",
    "app_start_warm",
    "time_to_initial_display",
    "time_to_full_display",
    "frames_total",
    "frames_slow",
    "frames_frozen",
    "frames_slow_rate",
    "frames_frozen_rate",
    "stall_count",
    "stall_total_time",
    "stall_longest_time",
    "stall_percentage",
];

/// Point-in-time vitals drawn as indicators on the timeline
const RENDERABLE_MEASUREMENTS: &[&str] = &[
    "ttfb",
    "fp",
    "fcp",
    "lcp",
    "time_to_full_display",
    "time_to_initial_display",
];

const DEFAULT_UNIT: &str = "millisecond";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VitalType {
    Web,
    Mobile,
}

impl fmt::Display for VitalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VitalType::Web => f.write_str("web"),
            VitalType::Mobile => f.write_str("mobile"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectedVital {
    pub key: String,
    pub measurement: Measurement,
}

/// A vital placed on the timeline at an absolute timestamp
#[derive(Clone, Debug, PartialEq)]
pub struct Indicator {
    /// Seconds since UNIX epoch
    pub start: f64,
    pub duration: f64,
    pub label: String,
    pub measurement: Measurement,
    /// Value exceeds the vital's threshold
    pub poor: bool,
    /// Measurement key
    pub kind: String,
}

#[derive(Debug, Default)]
pub struct CollectedMeasurements {
    pub vitals: Vec<CollectedVital>,
    pub indicators: Vec<Indicator>,
    pub vital_types: BTreeSet<VitalType>,
}

fn threshold(key: &str) -> Option<f64> {
    match key {
        "ttfb" => Some(600.0),
        "fp" | "fcp" => Some(3000.0),
        "lcp" => Some(4000.0),
        "time_to_initial_display" => Some(2000.0),
        _ => None,
    }
}

fn label(key: &str) -> String {
    match key {
        "time_to_full_display" => "TTFD".to_string(),
        "time_to_initial_display" => "TTID".to_string(),
        _ => key.to_uppercase(),
    }
}

/// Convert a measurement offset from `start` (seconds) into an absolute timestamp
pub fn measurement_to_timestamp(start: f64, value: f64, unit: &str) -> Result<f64, TreeError> {
    match unit {
        "second" => Ok(start + value),
        "millisecond" => Ok(start + value / 1e3),
        "nanosecond" => Ok(start + value / 1e9),
        other => Err(TreeError::UnsupportedMeasurementUnit(other.to_string())),
    }
}

/// Pick the known vitals out of a transaction's measurements
pub fn collect_measurements(
    start: f64,
    measurements: &BTreeMap<String, Measurement>,
) -> Result<CollectedMeasurements, TreeError> {
    let mut collected = CollectedMeasurements::default();

    for &key in WEB_VITALS.iter().chain(MOBILE_VITALS) {
        let Some(measurement) = measurements.get(key) else {
            continue;
        };
        let Some(value) = measurement.value else {
            continue;
        };

        if WEB_VITALS.contains(&key) {
            collected.vital_types.insert(VitalType::Web);
        }
        if MOBILE_VITALS.contains(&key) {
            collected.vital_types.insert(VitalType::Mobile);
        }

        collected.vitals.push(CollectedVital {
            key: key.to_string(),
            measurement: measurement.clone(),
        });

        if !RENDERABLE_MEASUREMENTS.contains(&key) {
            continue;
        }

        let unit = measurement.unit.as_deref().unwrap_or(DEFAULT_UNIT);
        collected.indicators.push(Indicator {
            start: measurement_to_timestamp(start, value, unit)?,
            duration: 0.0,
            label: label(key),
            measurement: measurement.clone(),
            poor: threshold(key).is_some_and(|limit| value > limit),
            kind: key.to_string(),
        });
    }

    Ok(collected)
}
