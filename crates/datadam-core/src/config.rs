//! Run configuration loaded from TOML and overridden by command line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_OP_WEIGHT;
use crate::error::{Error, Result};
use crate::model::OpKind;

/// Full configuration of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DamConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Operations per second.
    pub rate: u32,
    /// Rate limiter burst size.
    pub burst: u32,
    /// Total run time, `0` runs until interrupted.
    pub duration: String,
    /// Number of regular dispatcher lanes.
    pub concurrent: usize,
    pub batch_size: usize,
    /// Idle time after which a lane executes a partial batch.
    pub flush_interval: String,
    /// Weights aligned to insert, update, delete, ddl.
    pub op_weight: Vec<u32>,
    pub schemas: Vec<String>,
    pub db_config: DbConfig,
}

impl Default for DamConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            rate: 5,
            burst: 10,
            duration: "10s".to_string(),
            concurrent: 10,
            batch_size: 100,
            flush_interval: "1m".to_string(),
            op_weight: DEFAULT_OP_WEIGHT.to_vec(),
            schemas: Vec::new(),
            db_config: DbConfig::default(),
        }
    }
}

/// Database selection and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DbConfig {
    /// Registered backend name (e.g. `mysql`).
    pub kind: String,
    pub verbose: bool,
    pub mysql: MySqlConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            kind: "mysql".to_string(),
            verbose: false,
            mysql: MySqlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
        }
    }
}

impl DamConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| Error::Config(format!("parse config: {err}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("read {}: {err}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Check the configuration, filling in the default weight vector when
    /// none was given.
    pub fn validate(&mut self) -> Result<()> {
        if self.op_weight.is_empty() {
            self.op_weight = DEFAULT_OP_WEIGHT.to_vec();
        }
        if self.op_weight.len() != OpKind::ALL.len() {
            return Err(Error::Config(format!(
                "op-weight needs {} entries (insert, update, delete, ddl), got {}",
                OpKind::ALL.len(),
                self.op_weight.len()
            )));
        }
        if self.op_weight.iter().all(|weight| *weight == 0) {
            return Err(Error::Config("op-weight must not be all zero".to_string()));
        }
        if self.rate == 0 {
            return Err(Error::Config("rate must be at least 1".to_string()));
        }
        if self.burst == 0 {
            return Err(Error::Config("burst must be at least 1".to_string()));
        }
        if self.concurrent == 0 {
            return Err(Error::Config("concurrent must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch-size must be at least 1".to_string()));
        }
        if self.schemas.is_empty() {
            return Err(Error::Config("at least one schema is required".to_string()));
        }
        self.run_duration()?;
        if self.flush_interval()?.is_zero() {
            return Err(Error::Config("flush-interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Run time limit, `None` when the run is unbounded.
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        let duration = parse_duration(&self.duration)?;
        Ok((!duration.is_zero()).then_some(duration))
    }

    pub fn flush_interval(&self) -> Result<Duration> {
        parse_duration(&self.flush_interval)
    }

    /// JSON rendering with the database password masked.
    pub fn redacted_json(&self) -> String {
        let mut copy = self.clone();
        if !copy.db_config.mysql.password.is_empty() {
            copy.db_config.mysql.password = "***".to_string();
        }
        serde_json::to_string(&copy).unwrap_or_else(|err| format!("<config: {err}>"))
    }
}

/// Parse durations such as `10s`, `1m30s`, `250ms` or `0`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    let invalid = || Error::Config(format!("invalid duration '{raw}'"));
    if input.is_empty() {
        return Err(invalid());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        if num_end == 0 {
            return Err(invalid());
        }
        let (num, tail) = rest.split_at(num_end);
        let value: f64 = num.parse().map_err(|_| invalid())?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let millis = match unit {
            "ms" => 1.0,
            "s" => 1000.0,
            "m" => 60.0 * 1000.0,
            "h" => 60.0 * 60.0 * 1000.0,
            _ => return Err(invalid()),
        };
        total += Duration::from_secs_f64(value * millis / 1000.0);
        rest = tail;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn loads_kebab_case_toml() {
        let mut config = DamConfig::from_toml_str(
            r#"
            rate = 50
            duration = "0"
            concurrent = 4
            op-weight = [1, 0, 0, 0]
            schemas = ["dam"]

            [db-config]
            kind = "mysql"

            [db-config.mysql]
            host = "db"
            port = 3307
            password = "secret"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.rate, 50);
        assert_eq!(config.burst, 10);
        assert_eq!(config.run_duration().unwrap(), None);
        assert_eq!(config.op_weight, vec![1, 0, 0, 0]);
        assert_eq!(config.db_config.mysql.port, 3307);
        assert!(!config.redacted_json().contains("secret"));
    }

    #[test]
    fn rejects_bad_weight_vectors() {
        let mut config = DamConfig {
            schemas: vec!["dam".to_string()],
            op_weight: vec![1, 2],
            ..DamConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.op_weight = vec![0, 0, 0, 0];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.op_weight = Vec::new();
        config.validate().unwrap();
        assert_eq!(config.op_weight, DEFAULT_OP_WEIGHT.to_vec());
    }

    #[test]
    fn requires_schemas() {
        let mut config = DamConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
