//! Phycotank sensor readings: load a tagged CSV and derive per-tank or averaged series.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const DEFAULT_METRICS: [&str; 6] = ["pH", "temperature_C", "flow_rate_lph", "energy_consumption_kWh", "lux", "mag_field_T"];
pub const AGGREGATE_LABEL: &str = "Aggregate";

const TIMESTAMP_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("could not open {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("no readings for tank '{0}'")]
    UnknownTank(String),
}

#[derive(Clone, Debug)]
pub struct SeriesConfig {
    pub timestamp_column: String,
    pub tag_column: String,
    pub metrics: Vec<String>,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        SeriesConfig {
            timestamp_column: "timestamp".to_string(),
            tag_column: "phycotank_id".to_string(),
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub tag: String,
    pub values: Vec<Option<f64>>,
}

/// All parsed readings; `values` line up with `metrics`.
#[derive(Clone, Debug)]
pub struct ReadingTable {
    pub metrics: Vec<String>,
    readings: Vec<Reading>,
    skipped: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Series {
    pub label: String,
    pub metrics: Vec<String>,
    pub points: Vec<SeriesPoint>,
}

impl ReadingTable {
    pub fn readings(&self) -> &[Reading] { &self.readings }

    /// Rows dropped because their timestamp could not be parsed.
    pub fn skipped(&self) -> usize { self.skipped }

    pub fn tank_ids(&self) -> Vec<String> {
        self.readings.iter().map(|r| r.tag.clone()).collect::<BTreeSet<_>>().into_iter().collect()
    }

    fn metric_indices(&self, metrics: &[String]) -> Result<Vec<usize>, SeriesError> {
        if metrics.is_empty() { return Ok((0..self.metrics.len()).collect()); }
        metrics.iter().map(|m| self.metrics.iter().position(|k| k == m).ok_or_else(|| SeriesError::MissingColumn(m.clone()))).collect()
    }

    fn names(&self, idx: &[usize]) -> Vec<String> { idx.iter().map(|&i| self.metrics[i].clone()).collect() }

    /// Per-timestamp mean across all tanks, ascending by time. Missing values are left out of the mean.
    pub fn aggregate(&self, metrics: &[String]) -> Result<Series, SeriesError> {
        let idx = self.metric_indices(metrics)?;
        let mut groups: BTreeMap<NaiveDateTime, Vec<(f64, usize)>> = BTreeMap::new();
        for r in &self.readings {
            let acc = groups.entry(r.timestamp).or_insert_with(|| vec![(0.0, 0); idx.len()]);
            for (slot, &i) in acc.iter_mut().zip(&idx) {
                if let Some(v) = r.values[i] { slot.0 += v; slot.1 += 1; }
            }
        }
        let points = groups.into_iter().map(|(timestamp, acc)| SeriesPoint {
            timestamp,
            values: acc.into_iter().map(|(sum, n)| if n == 0 { None } else { Some(sum / n as f64) }).collect(),
        }).collect();
        Ok(Series { label: AGGREGATE_LABEL.to_string(), metrics: self.names(&idx), points })
    }

    pub fn tank_series(&self, tank: &str, metrics: &[String]) -> Result<Series, SeriesError> {
        let idx = self.metric_indices(metrics)?;
        let mut points: Vec<SeriesPoint> = self.readings.iter().filter(|r| r.tag == tank)
            .map(|r| SeriesPoint { timestamp: r.timestamp, values: idx.iter().map(|&i| r.values[i]).collect() })
            .collect();
        if points.is_empty() { return Err(SeriesError::UnknownTank(tank.to_string())); }
        points.sort_by_key(|p| p.timestamp);
        Ok(Series { label: tank.to_string(), metrics: self.names(&idx), points })
    }
}

impl Series {
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), SeriesError> {
        let mut wtr = csv::Writer::from_writer(out);
        let mut header = vec!["timestamp".to_string()];
        header.extend(self.metrics.iter().cloned());
        wtr.write_record(&header)?;
        for p in &self.points {
            let mut row = vec![p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
            row.extend(p.values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            wtr.write_record(&row)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// Display label: underscores become spaces, each word capitalised.
pub fn metric_label(name: &str) -> String {
    name.split('_').filter(|w| !w.is_empty()).map(|w| {
        let mut chars = w.chars();
        match chars.next() { Some(f) => f.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(), None => String::new() }
    }).collect::<Vec<String>>().join(" ")
}

pub fn load_readings(path: &Path, cfg: &SeriesConfig) -> Result<ReadingTable, SeriesError> {
    let file = std::fs::File::open(path).map_err(|e| SeriesError::Io { path: path.to_path_buf(), source: e })?;
    read_readings(file, cfg)
}

pub fn read_readings<R: Read>(reader: R, cfg: &SeriesConfig) -> Result<ReadingTable, SeriesError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| h == name).ok_or_else(|| SeriesError::MissingColumn(name.to_string()));
    let ts_col = find(cfg.timestamp_column.as_str())?;
    let tag_col = find(cfg.tag_column.as_str())?;
    let metric_cols: Vec<usize> = cfg.metrics.iter().map(|m| find(m.as_str())).collect::<Result<_, _>>()?;

    let mut readings = Vec::new();
    let mut skipped = 0;
    for rec in rdr.records() {
        let rec = rec?;
        let Some(timestamp) = rec.get(ts_col).and_then(parse_timestamp) else { skipped += 1; continue };
        let tag = rec.get(tag_col).unwrap_or_default().to_string();
        let values = metric_cols.iter().map(|&c| rec.get(c).and_then(|s| s.parse::<f64>().ok()).filter(|v| v.is_finite())).collect();
        readings.push(Reading { timestamp, tag, values });
    }
    if skipped > 0 { log::warn!("Skipped {} row(s) with unparseable '{}' values", skipped, cfg.timestamp_column); }
    log::debug!("Loaded {} reading(s) across {} metric(s)", readings.len(), cfg.metrics.len());
    Ok(ReadingTable { metrics: cfg.metrics.clone(), readings, skipped })
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.naive_utc()); }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) { return Some(dt); }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
}
