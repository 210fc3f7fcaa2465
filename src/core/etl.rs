use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;
use tracing::{debug, info};

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        info!("🚀 Starting report ETL process...");
        let started = Instant::now();
        self.monitor.log_stats("start");

        // Extract
        info!("📥 Extracting datasets...");
        let dataset = self.pipeline.extract().await?;
        info!("📥 Extracted {} records", dataset.record_count());
        self.monitor.log_stats("extract");

        // Transform
        info!("🔄 Computing dashboard metrics...");
        let result = self.pipeline.transform(dataset).await?;
        info!(
            "🔄 Rendered {} tables and {} KPI deltas",
            result.tables.len(),
            result.report.kpi_deltas.len()
        );
        self.monitor.log_stats("transform");

        // Load
        info!("💾 Writing report...");
        let output_path = self.pipeline.load(result).await?;
        self.monitor.log_stats("load");

        debug!("ETL finished in {:?}", started.elapsed());
        self.monitor.log_final_stats();
        info!("📁 Output saved to: {}", output_path);

        Ok(output_path)
    }
}
