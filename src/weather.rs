//! Station readings and the selection of what ends up on the panel
//!
//! Readings come from a snapshot document written by an external fetcher. A
//! snapshot lists stations, their current dashboard values, and for each module
//! the temperature history over some recent period.

use std::path::Path;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Source;

/// One named thermometer, either a station base or a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub humidity: Option<u8>,
}

/// Everything shown for one configured station.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub station: Reading,
    pub modules: Vec<Reading>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub stations: Vec<Station>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    pub name: String,
    /// Unix seconds of the dashboard values
    pub timestamp: i64,
    pub temperature: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub humidity: Option<u8>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Module {
    pub name: String,
    /// Unix seconds the module was last heard from
    pub last_seen: i64,
    pub humidity: Option<u8>,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub temperature: Option<f64>,
}

impl Snapshot {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("could not parse station snapshot")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read station snapshot {}", path.display()))?;
        Self::parse(&raw)
    }
}

fn unix(secs: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp {} is out of range", secs))
}

fn station_reading(station: &Station) -> anyhow::Result<Reading> {
    Ok(Reading {
        name: station.name.clone(),
        timestamp: unix(station.timestamp)?,
        temperature: station.temperature,
        min_temp: station.min_temp,
        max_temp: station.max_temp,
        humidity: station.humidity,
    })
}

/// Min/max over the module's samples inside `[since, now]`, current value from
/// the last of them. `None` when there is nothing to show.
fn module_reading(
    module: &Module,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Reading>> {
    let (from, to) = (since.timestamp(), now.timestamp());
    let window: Vec<&Sample> = module
        .samples
        .iter()
        .filter(|s| (from..=to).contains(&s.timestamp))
        .collect();

    let Some(last) = window.last() else {
        log::warn!("no samples for module {} in the time window", module.name);
        return Ok(None);
    };
    let Some(temperature) = last.temperature else {
        log::warn!("latest sample of module {} has no temperature", module.name);
        return Ok(None);
    };

    let mut min_temp = temperature;
    let mut max_temp = temperature;
    for t in window.iter().filter_map(|s| s.temperature) {
        min_temp = min_temp.min(t);
        max_temp = max_temp.max(t);
    }

    Ok(Some(Reading {
        name: module.name.clone(),
        timestamp: unix(module.last_seen)?,
        temperature: Some(temperature),
        min_temp: Some(min_temp),
        max_temp: Some(max_temp),
        humidity: module.humidity,
    }))
}

/// Pick the configured stations and modules out of `snapshot`.
///
/// One [`Measurement`] is produced per station matching a source by name.
/// Modules are matched by name with surrounding whitespace ignored on both
/// sides.
pub fn collect_measurements(
    snapshot: &Snapshot,
    sources: &[Source],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Measurement>> {
    if sources.is_empty() {
        bail!("no measurements to fetch");
    }
    log::debug!("snapshot lists {} stations", snapshot.stations.len());

    let mut measurements = Vec::new();
    let mut found = 0;
    for station in &snapshot.stations {
        for source in sources.iter().filter(|s| s.station_name == station.name) {
            log::info!("found station {}", station.name);
            let mut measurement = Measurement {
                station: station_reading(station)?,
                modules: Vec::new(),
            };

            for module in &station.modules {
                let wanted = source
                    .module_names
                    .iter()
                    .any(|name| name.trim() == module.name.trim());
                if !wanted {
                    continue;
                }
                if let Some(reading) = module_reading(module, since, now)? {
                    measurement.modules.push(reading);
                    found += 1;
                }
            }
            measurements.push(measurement);
        }
    }
    log::info!("collected {} module readings", found);

    Ok(measurements)
}
