use crate::domain::model::{Dataset, DatasetKind, TransformResult};
use crate::domain::period::ReportingPeriods;
use crate::domain::services::report::ReportOptions;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn report_title(&self) -> &str;
    fn output_path(&self) -> &str;
    /// 輸入檔相對於輸入儲存位置的路徑，未設定的資料集回傳 `None`
    fn source_file(&self, kind: DatasetKind) -> Option<&str>;
    /// Current and benchmark windows, defaulting around `anchor`.
    fn resolve_periods(&self, anchor: NaiveDate) -> Result<ReportingPeriods>;
    fn report_options(&self) -> &ReportOptions;
    fn compress_output(&self) -> bool;
    fn bundle_name(&self) -> &str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
