use crate::adapters::csv_source::parse_records;
use crate::adapters::report_writer::{bundle_zip, render_json, render_tables, REPORT_JSON};
use crate::core::{ConfigProvider, Dataset, Pipeline, Storage, TransformResult};
use crate::domain::model::DatasetKind;
use crate::domain::services::report::build_report;
use crate::utils::error::Result;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// 從匯出檔產生儀表板報表的管道
pub struct DashboardPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) input: S,
    pub(crate) output: S,
    pub(crate) config: C,
}

impl<S: Storage, C: ConfigProvider> DashboardPipeline<S, C> {
    pub fn new(input: S, output: S, config: C) -> Self {
        Self {
            input,
            output,
            config,
        }
    }

    async fn read_dataset<T: DeserializeOwned>(&self, kind: DatasetKind) -> Result<Option<Vec<T>>> {
        let Some(file) = self.config.source_file(kind) else {
            debug!("No {} file configured, section skipped", kind);
            return Ok(None);
        };

        let data = self.input.read_file(file).await?;
        let records = parse_records(kind, file, &data)?;
        info!("📄 Loaded {} {} rows from {}", records.len(), kind, file);
        Ok(Some(records))
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for DashboardPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let sales = self
            .read_dataset(DatasetKind::Sales)
            .await?
            .unwrap_or_default();

        Ok(Dataset {
            sales,
            sessions: self.read_dataset(DatasetKind::Sessions).await?,
            ads: self.read_dataset(DatasetKind::Ads).await?,
            ad_annotations: self.read_dataset(DatasetKind::AdAnnotations).await?,
            email_campaigns: self.read_dataset(DatasetKind::EmailCampaigns).await?,
            contacts: self.read_dataset(DatasetKind::Contacts).await?,
            leads: self.read_dataset(DatasetKind::Leads).await?,
        })
    }

    async fn transform(&self, data: Dataset) -> Result<TransformResult> {
        let anchor = match data.anchor_date() {
            Some(anchor) => anchor,
            None => {
                let today = chrono::Local::now().date_naive();
                warn!("⚠️ No dated records found, anchoring periods at {}", today);
                today
            }
        };
        let periods = self.config.resolve_periods(anchor)?;

        let report = build_report(
            self.config.report_title(),
            &data,
            &periods,
            self.config.report_options(),
        )?;
        let tables = render_tables(&report)?;
        let json_output = render_json(&report)?;
        debug!("Rendered {} tables, {} bytes of JSON", tables.len(), json_output.len());

        Ok(TransformResult {
            report,
            tables,
            json_output,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let output_path = self.config.output_path();

        if self.config.compress_output() {
            let bundle_name = self.config.bundle_name();
            let zip_data = bundle_zip(&result.tables, &result.json_output)?;
            debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.output.write_file(bundle_name, &zip_data).await?;
            return Ok(format!("{}/{}", output_path, bundle_name));
        }

        for table in &result.tables {
            self.output
                .write_file(&table.file_name, table.content.as_bytes())
                .await?;
        }
        self.output
            .write_file(REPORT_JSON, result.json_output.as_bytes())
            .await?;
        debug!("Wrote {} files", result.tables.len() + 1);

        Ok(output_path.to_string())
    }
}
