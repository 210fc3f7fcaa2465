use clap::Parser;
use marketing_etl::utils::error::ErrorSeverity;
use marketing_etl::utils::{logger, validation::Validate};
use marketing_etl::{CliConfig, DashboardPipeline, EtlEngine, LocalStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting marketing-etl CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = cli.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }
    let config = cli.to_report_config()?;

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 輸入與輸出各自一個本地存儲
    let input = LocalStorage::new(cli.input_path.clone());
    let output = LocalStorage::new(cli.output_path.clone());
    let pipeline = DashboardPipeline::new(input, output, config);

    let engine = EtlEngine::new_with_monitoring(pipeline, cli.monitor);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Report generated successfully!");
            tracing::info!("📁 Output saved to: {}", output_path);
            println!("✅ Report generated successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Report generation failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
