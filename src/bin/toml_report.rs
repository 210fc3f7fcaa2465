use clap::Parser;
use marketing_etl::config::toml_config::{CompressionConfig, ReportConfig};
use marketing_etl::domain::model::DatasetKind;
use marketing_etl::domain::ports::ConfigProvider;
use marketing_etl::utils::error::ErrorSeverity;
use marketing_etl::utils::{logger, validation::Validate};
use marketing_etl::{DashboardPipeline, EtlEngine, LocalStorage};
use std::path::Path;

#[derive(Parser)]
#[command(name = "toml-report")]
#[command(about = "Marketing dashboard report driven by a TOML configuration")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "report-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override output directory from config
    #[arg(long)]
    output: Option<String>,

    /// Override ZIP bundling from config
    #[arg(long)]
    zip: Option<bool>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 載入 TOML 配置
    let mut config = match ReportConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(args.verbose);
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌，格式由配置決定
    logger::init_logger(args.verbose, config.log_format());

    tracing::info!("🚀 Starting TOML-based report tool");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    // 應用命令列覆蓋設定
    if let Some(output) = &args.output {
        config.load.output_path = output.clone();
        tracing::info!("🔧 Output path overridden to: {}", output);
    }
    if let Some(zip) = args.zip {
        let filename = config.bundle_name().to_string();
        config.load.compression = Some(CompressionConfig {
            enabled: zip,
            filename,
        });
        tracing::info!("🔧 ZIP bundling overridden to: {}", zip);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No report will be written");
        perform_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args
        .monitor
        .unwrap_or_else(|| config.system_stats_enabled());

    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let input = LocalStorage::new(config.input_path().to_string());
    let output = LocalStorage::new(config.output_path().to_string());
    let pipeline = DashboardPipeline::new(input, output, config);

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

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

fn display_config_summary(config: &ReportConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Report: {}", config.report.title);
    if let Some(description) = &config.report.description {
        println!("  Description: {}", description);
    }
    println!("  Input: {}", config.input_path());
    println!("  Output: {}", config.output_path());
    println!("  Window: {} days", config.periods.window_days);

    if config.compress_output() {
        println!("  Bundle: {}", config.bundle_name());
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &ReportConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    // 輸入檔案分析
    println!("📄 Input Files:");
    for kind in DatasetKind::ALL {
        match config.source_file(kind) {
            Some(file) => {
                let exists = Path::new(config.input_path()).join(file).is_file();
                let marker = if exists { "✅" } else { "❌ missing" };
                println!("  {:<16} {} {}", kind.name(), file, marker);
            }
            None => println!("  {:<16} (not configured, section skipped)", kind.name()),
        }
    }

    // 期間分析
    println!();
    println!("📅 Periods:");
    match &config.periods.current {
        Some(current) => println!("  Current: {}", current),
        None => println!(
            "  Current: last {} days up to the latest order",
            config.periods.window_days
        ),
    }
    match &config.periods.benchmark {
        Some(benchmark) => println!("  Benchmark: {}", benchmark),
        None => println!("  Benchmark: the window right before the current period"),
    }

    let options = config.report_options();
    if !options.peaks.is_empty() {
        println!();
        println!("📈 Peak Windows:");
        for peak in &options.peaks {
            println!("  {}: {} - {}", peak.name, peak.start, peak.end);
        }
    }

    println!();
    println!("⚙️ Options:");
    if let Some(filter) = &options.ads.campaign_filter {
        println!("  Ads campaign filter: {}", filter);
    }
    println!("  Ads spend cutoff: {:.0}%", options.ads.cutoff_ratio * 100.0);
    println!(
        "  Adset ranking: top {} by {:?}",
        options.ads.top_n, options.ads.ranking_metric
    );
    println!(
        "  Attribution limited to order days: {}",
        options.attribution.restrict_to_order_dates
    );
    println!("  Funnel SCKs: {}", options.funnel.scks.join(", "));

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    if config.compress_output() {
        println!("  Compression: {} (ZIP)", config.bundle_name());
    } else {
        println!("  Compression: disabled, one CSV per table plus report.json");
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
