use crate::domain::model::DatasetKind;
use crate::domain::period::{DateRange, ReportingPeriods};
use crate::domain::ports::ConfigProvider;
use crate::domain::services::report::ReportOptions;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
/// 預設區間長度上限（約十年）
pub const MAX_WINDOW_DAYS: u32 = 3650;
pub const DEFAULT_BUNDLE_NAME: &str = "dashboard_report.zip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub report: ReportSection,
    pub source: SourceConfig,
    #[serde(default)]
    pub periods: PeriodConfig,
    /// `[attribution]` `[sales]` `[traffic]` `[email]` `[funnel]` `[ads]` `[[peaks]]`
    #[serde(flatten)]
    pub options: ReportOptions,
    #[serde(default)]
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub description: Option<String>,
}

/// 輸入檔案，路徑相對於 `input_path`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_path: String,
    pub sales: String,
    pub sessions: Option<String>,
    pub ads: Option<String>,
    pub ad_annotations: Option<String>,
    pub email_campaigns: Option<String>,
    pub contacts: Option<String>,
    pub leads: Option<String>,
}

impl SourceConfig {
    pub fn file(&self, kind: DatasetKind) -> Option<&str> {
        match kind {
            DatasetKind::Sales => Some(self.sales.as_str()),
            DatasetKind::Sessions => self.sessions.as_deref(),
            DatasetKind::Ads => self.ads.as_deref(),
            DatasetKind::AdAnnotations => self.ad_annotations.as_deref(),
            DatasetKind::EmailCampaigns => self.email_campaigns.as_deref(),
            DatasetKind::Contacts => self.contacts.as_deref(),
            DatasetKind::Leads => self.leads.as_deref(),
        }
    }

    pub fn configured_files(&self) -> Vec<&str> {
        DatasetKind::ALL
            .iter()
            .filter_map(|kind| self.file(*kind))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    pub current: Option<DateRange>,
    pub benchmark: Option<DateRange>,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            current: None,
            benchmark: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    pub compression: Option<CompressionConfig>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            compression: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    #[serde(default = "default_bundle_name")]
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// `compact`（預設）或 `json`
    pub log_format: Option<String>,
    pub system_stats: Option<bool>,
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_output_path() -> String {
    "./output".to_string()
}

fn default_bundle_name() -> String {
    DEFAULT_BUNDLE_NAME.to_string()
}

impl ReportConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})，找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("report.title", &self.report.title)?;
        validation::validate_path("source.input_path", &self.source.input_path)?;
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_file_extensions(
            "source",
            &self.source.configured_files(),
            &["csv"],
        )?;

        validation::validate_range(
            "periods.window_days",
            self.periods.window_days,
            1,
            MAX_WINDOW_DAYS,
        )?;
        if let Some(current) = &self.periods.current {
            validation::validate_date_range("periods.current", current)?;
        }
        if let Some(benchmark) = &self.periods.benchmark {
            validation::validate_date_range("periods.benchmark", benchmark)?;
        }

        let options = &self.options;
        validation::validate_range("ads.cutoff_ratio", options.ads.cutoff_ratio, 0.0, 1.0)?;
        validation::validate_positive_number("ads.top_n", options.ads.top_n, 1)?;
        validation::validate_range(
            "traffic.min_path_share",
            options.traffic.min_path_share,
            0.0,
            1.0,
        )?;
        validation::validate_non_empty_string(
            "traffic.checkout_marker",
            &options.traffic.checkout_marker,
        )?;
        validation::validate_non_empty_string(
            "attribution.sales_team_marker",
            &options.attribution.sales_team_marker,
        )?;
        if options.funnel.scks.is_empty() {
            return Err(EtlError::ConfigValidationError {
                field: "funnel.scks".to_string(),
                message: "At least one funnel SCK is required".to_string(),
            });
        }

        for (index, peak) in options.peaks.iter().enumerate() {
            validation::validate_non_empty_string(&format!("peaks[{}].name", index), &peak.name)?;
            if peak.range().is_none() {
                return Err(EtlError::InvalidConfigValueError {
                    field: format!("peaks[{}]", index),
                    value: format!("{} - {}", peak.start, peak.end),
                    reason: "Start date must not be after end date".to_string(),
                });
            }
        }

        if let Some(compression) = &self.load.compression {
            if compression.enabled {
                validation::validate_file_extensions(
                    "load.compression.filename",
                    &[compression.filename.as_str()],
                    &["zip"],
                )?;
            }
        }

        if let Some(format) = self.log_format() {
            if !matches!(format, "compact" | "json") {
                return Err(EtlError::InvalidConfigValueError {
                    field: "monitoring.log_format".to_string(),
                    value: format.to_string(),
                    reason: "Supported formats: compact, json".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn input_path(&self) -> &str {
        &self.source.input_path
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().is_some_and(|m| m.enabled)
    }

    pub fn system_stats_enabled(&self) -> bool {
        self.monitoring
            .as_ref()
            .is_some_and(|m| m.enabled && m.system_stats.unwrap_or(true))
    }

    pub fn log_format(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_format.as_deref())
    }
}

impl ConfigProvider for ReportConfig {
    fn report_title(&self) -> &str {
        &self.report.title
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn source_file(&self, kind: DatasetKind) -> Option<&str> {
        self.source.file(kind)
    }

    fn resolve_periods(&self, anchor: NaiveDate) -> Result<ReportingPeriods> {
        ReportingPeriods::resolve(
            anchor,
            self.periods.window_days,
            self.periods.current,
            self.periods.benchmark,
        )
    }

    fn report_options(&self) -> &ReportOptions {
        &self.options
    }

    fn compress_output(&self) -> bool {
        self.load.compression.as_ref().is_some_and(|c| c.enabled)
    }

    fn bundle_name(&self) -> &str {
        self.load
            .compression
            .as_ref()
            .map_or(DEFAULT_BUNDLE_NAME, |c| c.filename.as_str())
    }
}

impl Validate for ReportConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
