use std::fs;
use std::path::PathBuf;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::GastoreError;
use crate::report::{DEFAULT_DELIMITER, OutputFormat};
use crate::split::{self, DEFAULT_DATE_FORMAT};

pub const CONFIG_FILE: &str = "gastore.json";

/// On-disk config: every field optional, defaults applied during resolution.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub folder_uri: Option<String>,
    #[serde(default)]
    pub non_golden_folder_uri: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub only_golden: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub sampling_level: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub week_start: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub folder_uri: Option<String>,
    pub non_golden_folder_uri: Option<String>,
    pub format: OutputFormat,
    pub delimiter: char,
    pub only_golden: bool,
    pub max_retries: u32,
    pub page_size: Option<u32>,
    pub sampling_level: Option<String>,
    pub date_format: String,
    pub week_start: Weekday,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            folder_uri: None,
            non_golden_folder_uri: None,
            format: OutputFormat::Csv,
            delimiter: DEFAULT_DELIMITER,
            only_golden: true,
            max_retries: 5,
            page_size: None,
            sampling_level: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            week_start: Weekday::Mon,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GastoreError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(GastoreError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GastoreError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GastoreError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GastoreError> {
        let defaults = ResolvedConfig::default();

        let format = match config.format {
            Some(value) => value.parse()?,
            None => defaults.format,
        };
        let week_start = match config.week_start {
            Some(value) => split::parse_week_start(&value)?,
            None => defaults.week_start,
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            folder_uri: config.folder_uri,
            non_golden_folder_uri: config.non_golden_folder_uri,
            format,
            delimiter: config.delimiter.unwrap_or(defaults.delimiter),
            only_golden: config.only_golden.unwrap_or(defaults.only_golden),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            page_size: config.page_size,
            sampling_level: config.sampling_level,
            date_format: config.date_format.unwrap_or(defaults.date_format),
            week_start,
        })
    }
}
