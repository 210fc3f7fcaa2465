pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_args::CliConfig;

#[cfg(feature = "cli")]
mod cli_args {
    use super::toml_config::{
        CompressionConfig, LoadConfig, MonitoringConfig, PeriodConfig, ReportConfig,
        ReportSection, SourceConfig,
    };
    use crate::domain::period::DateRange;
    use crate::domain::services::ads::AdsOptions;
    use crate::domain::services::report::ReportOptions;
    use crate::utils::error::{EtlError, Result};
    use crate::utils::validation::Validate;
    use chrono::NaiveDate;
    use clap::Parser;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "marketing-etl")]
    #[command(about = "Builds marketing dashboard reports from exported CSV files")]
    pub struct CliConfig {
        #[arg(long, default_value = "Marketing report")]
        pub title: String,

        #[arg(long, default_value = "./data")]
        pub input_path: String,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        #[arg(long, default_value = "sales.csv", help = "Payment platform export")]
        pub sales: String,

        #[arg(long, help = "Analytics events export")]
        pub sessions: Option<String>,

        #[arg(long, help = "Daily ad set statistics")]
        pub ads: Option<String>,

        #[arg(long, help = "Creative annotations per ad set")]
        pub ad_annotations: Option<String>,

        #[arg(long, help = "Email campaign statistics")]
        pub email_campaigns: Option<String>,

        #[arg(long, help = "Email contacts with tag ids")]
        pub contacts: Option<String>,

        #[arg(long, help = "Free funnel signups")]
        pub leads: Option<String>,

        #[arg(long, default_value = "7", help = "Length of the default reporting window")]
        pub window_days: u32,

        #[arg(long, requires = "current_end")]
        pub current_start: Option<NaiveDate>,

        #[arg(long, requires = "current_start")]
        pub current_end: Option<NaiveDate>,

        #[arg(long, requires = "benchmark_end")]
        pub benchmark_start: Option<NaiveDate>,

        #[arg(long, requires = "benchmark_start")]
        pub benchmark_end: Option<NaiveDate>,

        #[arg(long, help = "Only keep ad campaigns whose name contains this text")]
        pub campaign_filter: Option<String>,

        #[arg(long, help = "Bundle every output into one ZIP file")]
        pub zip: bool,

        #[arg(long, default_value = crate::config::toml_config::DEFAULT_BUNDLE_NAME)]
        pub bundle_name: String,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log CPU and memory usage after each phase")]
        pub monitor: bool,
    }

    impl CliConfig {
        /// 轉換成與 TOML 相同的報表配置
        pub fn to_report_config(&self) -> Result<ReportConfig> {
            let current = Self::range("current", self.current_start, self.current_end)?;
            let benchmark = Self::range("benchmark", self.benchmark_start, self.benchmark_end)?;

            Ok(ReportConfig {
                report: ReportSection {
                    title: self.title.clone(),
                    description: None,
                },
                source: SourceConfig {
                    input_path: self.input_path.clone(),
                    sales: self.sales.clone(),
                    sessions: self.sessions.clone(),
                    ads: self.ads.clone(),
                    ad_annotations: self.ad_annotations.clone(),
                    email_campaigns: self.email_campaigns.clone(),
                    contacts: self.contacts.clone(),
                    leads: self.leads.clone(),
                },
                periods: PeriodConfig {
                    window_days: self.window_days,
                    current,
                    benchmark,
                },
                options: ReportOptions {
                    ads: AdsOptions {
                        campaign_filter: self.campaign_filter.clone(),
                        ..AdsOptions::default()
                    },
                    ..ReportOptions::default()
                },
                load: LoadConfig {
                    output_path: self.output_path.clone(),
                    compression: Some(CompressionConfig {
                        enabled: self.zip,
                        filename: self.bundle_name.clone(),
                    }),
                },
                monitoring: Some(MonitoringConfig {
                    enabled: self.monitor,
                    log_format: None,
                    system_stats: Some(self.monitor),
                }),
            })
        }

        fn range(
            name: &str,
            start: Option<NaiveDate>,
            end: Option<NaiveDate>,
        ) -> Result<Option<DateRange>> {
            match (start, end) {
                (Some(start), Some(end)) => DateRange::new(start, end).map(Some).ok_or_else(|| {
                    EtlError::InvalidConfigValueError {
                        field: format!("{}_start", name),
                        value: format!("{} - {}", start, end),
                        reason: "Start date must not be after end date".to_string(),
                    }
                }),
                (None, None) => Ok(None),
                _ => Err(EtlError::MissingConfigError {
                    field: format!("{}_start/{}_end", name, name),
                }),
            }
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            self.to_report_config()?.validate()
        }
    }

}
