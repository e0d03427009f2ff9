use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ExportError, Result};
use crate::exporter::ExportOptions;
use crate::filter::FilterEngine;
use crate::models::{DateRange, MessageFilter};
use crate::paths::{FilenameOption, OutputStructure, PathLayout};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub include: MessageFilter,
    #[serde(default)]
    pub exclude: MessageFilter,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output_structure: OutputStructure,
    #[serde(default = "default_filename")]
    pub filename: Vec<FilenameOption>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub save_attachments: bool,
    #[serde(default)]
    pub save_body: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_structure: OutputStructure::default(),
            filename: default_filename(),
            timezone: default_timezone(),
            period_days: default_period_days(),
            start: None,
            end: None,
            dry_run: false,
            save_attachments: false,
            save_body: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            max_concurrent_requests: default_max_concurrent(),
            page_size: default_page_size(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("export")
}

fn default_filename() -> Vec<FilenameOption> {
    vec![
        FilenameOption::Date,
        FilenameOption::Time,
        FilenameOption::Subject,
    ]
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_period_days() -> u32 {
    30
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_max_concurrent() -> usize {
    40
}

fn default_page_size() -> u32 {
    100
}

impl Config {
    /// Read the config file, falling back to defaults when it is absent.
    ///
    /// Only parsing happens here; callers overlay command-line flags and then
    /// call [`Config::validate`].
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ExportError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExportError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ExportError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.export.period_days == 0 {
            return Err(ExportError::ConfigError(
                "export.period_days must be at least 1".to_string(),
            ));
        }

        if let (Some(start), Some(end)) = (self.export.start, self.export.end) {
            if start > end {
                return Err(ExportError::ConfigError(format!(
                    "export.start ({}) must not be after export.end ({})",
                    start, end
                )));
            }
        }

        self.layout()?.validate()?;

        // Max 50 concurrent requests keeps us under the per-user quota
        if self.api.max_concurrent_requests == 0 {
            return Err(ExportError::ConfigError(
                "api.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.api.max_concurrent_requests > 50 {
            return Err(ExportError::ConfigError(
                "api.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }

        if self.api.page_size == 0 || self.api.page_size > 500 {
            return Err(ExportError::ConfigError(
                "api.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.api.user_id.trim().is_empty() {
            return Err(ExportError::ConfigError(
                "api.user_id cannot be empty".to_string(),
            ));
        }

        FilterEngine::new(&self.include, &self.exclude)?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.export.timezone.parse::<Tz>().map_err(|e| {
            ExportError::ConfigError(format!(
                "Invalid export.timezone '{}': {}",
                self.export.timezone, e
            ))
        })
    }

    pub fn layout(&self) -> Result<PathLayout> {
        Ok(PathLayout {
            output_dir: self.export.output_dir.clone(),
            structure: self.export.output_structure,
            filename: self.export.filename.clone(),
            timezone: self.timezone()?,
        })
    }

    /// Explicit `start`/`end` where given; otherwise `end` defaults to
    /// `today` and `start` to `period_days` before `end`.
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        let end = self.export.end.unwrap_or(today);
        match self.export.start {
            Some(start) => DateRange::from_dates(start, end),
            None => DateRange::trailing_days(end, self.export.period_days),
        }
    }

    pub fn export_options(&self, today: NaiveDate) -> Result<ExportOptions> {
        Ok(ExportOptions {
            layout: self.layout()?,
            range: self.date_range(today),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            dry_run: self.export.dry_run,
            save_attachments: self.export.save_attachments,
            save_body: self.export.save_body,
        })
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
