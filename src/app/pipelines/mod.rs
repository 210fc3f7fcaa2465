pub mod dashboard_pipeline;

pub use dashboard_pipeline::DashboardPipeline;
