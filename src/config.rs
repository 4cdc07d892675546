use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::report::{self, Orientation};
use crate::tanks::SeriesConfig;

pub const DEFAULT_CONFIG_FILE: &str = "cdrdash.toml";
pub const DEFAULT_LAB_DIR: &str = "data/lab_results";
pub const DEFAULT_LAB_FILE: &str = "data/lab_results/TP_EXAMPLE.xlsx";
pub const DEFAULT_TANKS_CSV: &str = "phycotank_array_dummy_data_filled.csv";

/// Zone for the report's Generated stamp: `local`, `utc`, or an IANA name such as `Europe/London`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeZone {
    Local,
    Utc,
    Named(Tz),
}

impl Default for TimeZone {
    fn default() -> Self { TimeZone::Named(chrono_tz::Europe::London) }
}

impl FromStr for TimeZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TimeZone::Local),
            "utc" => Ok(TimeZone::Utc),
            _ => s.trim().parse::<Tz>().map(TimeZone::Named).map_err(|e| format!("unknown time zone '{}': {}", s.trim(), e)),
        }
    }
}

impl std::fmt::Display for TimeZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeZone::Local => f.write_str("local"),
            TimeZone::Utc => f.write_str("utc"),
            TimeZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub progress: Option<bool>,
    pub force_color: Option<bool>,
    pub lab: Option<LabConfig>,
    pub tanks: Option<TanksConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabConfig {
    pub dir: Option<String>,
    pub default_file: Option<String>,
    pub title: Option<String>,
    pub row_cap: Option<usize>,
    pub orientation: Option<Orientation>,
    pub footer: Option<String>,
    pub logo: Option<String>,
    pub rules: Option<String>,
    pub numeric_share: Option<f64>,
    pub strict_encoding: Option<bool>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TanksConfig {
    pub csv: Option<String>,
    pub timestamp_column: Option<String>,
    pub tag_column: Option<String>,
    pub metrics: Option<Vec<String>>,
}

/// Lab pipeline settings after defaults and the config file are merged. CLI flags are applied last, in main.
#[derive(Clone, Debug)]
pub struct LabSettings {
    pub dir: PathBuf,
    pub default_file: PathBuf,
    pub title: String,
    pub row_cap: usize,
    pub orientation: Orientation,
    pub footer: String,
    pub logo: Option<PathBuf>,
    pub rules: Option<String>,
    pub numeric_share: f64,
    pub strict_encoding: bool,
    pub time_zone: TimeZone,
}

impl Default for LabSettings {
    fn default() -> Self {
        LabSettings {
            dir: PathBuf::from(DEFAULT_LAB_DIR),
            default_file: PathBuf::from(DEFAULT_LAB_FILE),
            title: report::DEFAULT_TITLE.to_string(),
            row_cap: report::DEFAULT_ROW_CAP,
            orientation: Orientation::Portrait,
            footer: report::DEFAULT_FOOTER.to_string(),
            logo: Some(PathBuf::from(report::DEFAULT_LOGO)),
            rules: None,
            numeric_share: 1.0,
            strict_encoding: false,
            time_zone: TimeZone::default(),
        }
    }
}

impl LabSettings {
    pub fn apply(&mut self, cfg: LabConfig) {
        if let Some(v) = cfg.dir { self.dir = PathBuf::from(v); }
        if let Some(v) = cfg.default_file { self.default_file = PathBuf::from(v); }
        if let Some(v) = cfg.title { self.title = v; }
        if let Some(v) = cfg.row_cap { self.row_cap = v; }
        if let Some(v) = cfg.orientation { self.orientation = v; }
        if let Some(v) = cfg.footer { self.footer = v; }
        if let Some(v) = cfg.logo { self.logo = if v.trim().is_empty() { None } else { Some(PathBuf::from(v)) }; }
        if let Some(v) = cfg.rules { self.rules = Some(v); }
        if let Some(v) = cfg.numeric_share {
            if (0.0..=1.0).contains(&v) { self.numeric_share = v; } else { log::warn!("Ignoring numeric_share {} (must be within 0..=1)", v); }
        }
        if let Some(v) = cfg.strict_encoding { self.strict_encoding = v; }
        if let Some(v) = cfg.time_zone {
            match v.parse() { Ok(tz) => self.time_zone = tz, Err(e) => log::warn!("Ignoring time_zone: {}", e) }
        }
    }
}

#[derive(Clone, Debug)]
pub struct TankSettings {
    pub csv: PathBuf,
    pub series: SeriesConfig,
}

impl Default for TankSettings {
    fn default() -> Self { TankSettings { csv: PathBuf::from(DEFAULT_TANKS_CSV), series: SeriesConfig::default() } }
}

impl TankSettings {
    pub fn apply(&mut self, cfg: TanksConfig) {
        if let Some(v) = cfg.csv { self.csv = PathBuf::from(v); }
        if let Some(v) = cfg.timestamp_column { self.series.timestamp_column = v; }
        if let Some(v) = cfg.tag_column { self.series.tag_column = v; }
        if let Some(v) = cfg.metrics && !v.is_empty() { self.series.metrics = v; }
    }
}

/// Explicit path, then `CDRDASH_CONFIG`, then `cdrdash.toml` in the working directory.
/// Only an explicitly named file that cannot be read is worth a warning.
pub fn load_config(path_opt: Option<&str>) -> Option<AppConfig> {
    let explicit = path_opt.map(|s| s.to_string()).or_else(|| std::env::var("CDRDASH_CONFIG").ok());
    let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            if explicit.is_some() { log::warn!("Failed to read config {}: {}", path, e); }
            return None;
        }
    };
    match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => { log::debug!("Loaded config from {}", path); Some(cfg) }
        Err(e) => { log::warn!("Failed to parse config {}: {}", path, e); None }
    }
}

#[cfg(test)]
mod tests_config {
    use super::*;

    const SAMPLE: &str = r#"
progress = true

[lab]
dir = "lab"
row_cap = 25
orientation = "landscape"
logo = ""
numeric_share = 0.8
time_zone = "utc"

[tanks]
csv = "tanks.csv"
metrics = ["pH", "lux"]
"#;

    #[test]
    fn file_values_override_defaults() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.progress, Some(true));
        let mut lab = LabSettings::default();
        lab.apply(cfg.lab.unwrap());
        assert_eq!(lab.dir, PathBuf::from("lab"));
        assert_eq!(lab.row_cap, 25);
        assert_eq!(lab.orientation, Orientation::Landscape);
        assert!(lab.logo.is_none());
        assert_eq!(lab.numeric_share, 0.8);
        assert_eq!(lab.time_zone, TimeZone::Utc);
        assert_eq!(lab.title, report::DEFAULT_TITLE);
        let mut tanks = TankSettings::default();
        tanks.apply(cfg.tanks.unwrap());
        assert_eq!(tanks.csv, PathBuf::from("tanks.csv"));
        assert_eq!(tanks.series.metrics, vec!["pH".to_string(), "lux".to_string()]);
        assert_eq!(tanks.series.tag_column, "phycotank_id");
    }

    #[test]
    fn time_zone_names() {
        assert_eq!(LabSettings::default().time_zone, TimeZone::Named(chrono_tz::Europe::London));
        assert_eq!("UTC".parse::<TimeZone>(), Ok(TimeZone::Utc));
        assert_eq!("Local".parse::<TimeZone>(), Ok(TimeZone::Local));
        assert_eq!("America/New_York".parse::<TimeZone>(), Ok(TimeZone::Named(chrono_tz::America::New_York)));
        assert_eq!(TimeZone::default().to_string(), "Europe/London");
        assert!("Mars/Olympus".parse::<TimeZone>().is_err());
        let mut lab = LabSettings::default();
        lab.apply(LabConfig { time_zone: Some("Mars/Olympus".into()), ..Default::default() });
        assert_eq!(lab.time_zone, TimeZone::default());
    }

    #[test]
    fn out_of_range_share_is_ignored() {
        let mut lab = LabSettings::default();
        lab.apply(LabConfig { numeric_share: Some(1.5), ..Default::default() });
        assert_eq!(lab.numeric_share, 1.0);
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cdrdash.toml");
        std::fs::write(&p, SAMPLE).unwrap();
        assert!(load_config(Some(p.to_str().unwrap())).is_some_and(|c| c.lab.is_some()));
        std::fs::write(&p, "[lab\nbroken").unwrap();
        assert!(load_config(Some(p.to_str().unwrap())).is_none());
    }
}
