//! 시장 데이터 수집기 CLI.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ingest_collector::modules::{self, Runtime, SeriesPair};
use ingest_collector::CollectorConfig;
use ingest_core::{init_logging, IngestionMetrics, Interval};

#[derive(Parser)]
#[command(name = "ingest-collector")]
#[command(about = "Market data ingestion collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML 설정 파일 경로
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// DB 대신 메모리 저장소에 기록
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 현물 OHLCV 수집 (단일 시리즈)
    Ohlcv {
        #[arg(long)]
        market: String,
        #[arg(long)]
        instrument: String,
        /// 인터벌 (1m, 1h, 1d)
        #[arg(long, default_value = "1d")]
        interval: Interval,
    },

    /// 현물 OHLCV 수집 (다중 시리즈, 예: "coinbase:BTC-USD,kraken:ETH-USD")
    OhlcvMany {
        #[arg(long)]
        pairs: String,
        #[arg(long, default_value = "1d")]
        interval: Interval,
    },

    /// 거래소 일반 정보 수집
    Exchanges,

    /// 자산 목록 수집
    Assets {
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// 데몬 모드: 주기적으로 OHLCV 수집
    Daemon {
        #[arg(long)]
        pairs: String,
        #[arg(long, default_value = "1h")]
        interval: Interval,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CollectorConfig::load(cli.config.as_deref())
        .context("설정 로드 실패")?
        .with_dry_run(cli.dry_run)
        .with_log_overrides(cli.log_level.clone(), cli.log_format.clone())?;

    init_logging(config.log_config()).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!(dry_run = config.dry_run, "Market Data Collector 시작");

    let rt = Runtime::connect(config).await.context("저장소 연결 실패")?;

    let outcome = run_command(&rt, cli.command).await;

    rt.close().await;
    tracing::info!("Market Data Collector 종료");

    outcome
}

async fn run_command(rt: &Runtime, command: Commands) -> anyhow::Result<()> {
    let mut metrics = IngestionMetrics::new();

    match command {
        Commands::Ohlcv {
            market,
            instrument,
            interval,
        } => {
            let pair = SeriesPair::new(market, instrument);
            let result = modules::collect_series(rt, &pair, interval).await?;
            metrics.record_run(&result);
            metrics.log_summary("OHLCV 수집");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::OhlcvMany { pairs, interval } => {
            let pairs = modules::parse_pairs(&pairs)?;
            let summary = modules::collect_many(rt, &pairs, interval).await?;
            metrics.record_fan_out(&summary);
            metrics.log_summary("OHLCV 다중 수집");
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Exchanges => {
            let result = modules::collect_exchanges(rt).await?;
            metrics.record_run(&result.run);
            metrics.log_summary("거래소 메타데이터");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Assets {
            page_size,
            max_pages,
        } => {
            let result = modules::collect_assets(rt, page_size, max_pages).await?;
            metrics.record_run(&result.run);
            metrics.log_summary("자산 메타데이터");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Daemon { pairs, interval } => {
            let pairs = modules::parse_pairs(&pairs)?;
            run_daemon(rt, &pairs, interval, &mut metrics).await?;
        }
    }

    Ok(())
}

async fn run_daemon(
    rt: &Runtime,
    pairs: &[SeriesPair],
    interval: Interval,
    metrics: &mut IngestionMetrics,
) -> anyhow::Result<()> {
    let daemon = &rt.config().app.daemon;
    tracing::info!(
        series = pairs.len(),
        interval = %interval,
        "=== 데몬 모드 시작 (주기: {}분) ===",
        daemon.interval_minutes
    );

    let mut ticker = tokio::time::interval(daemon.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신, 데몬 종료 중...");
                break;
            }
            _ = ticker.tick() => {
                tracing::info!("=== 수집 실행 시작 ===");

                match modules::collect_many(rt, pairs, interval).await {
                    Ok(summary) => metrics.record_fan_out(&summary),
                    Err(e) => tracing::error!("OHLCV 수집 실패: {}", e),
                }
                metrics.log_summary("데몬 누적");

                tracing::info!(
                    "=== 수집 완료, 다음 실행: {}분 후 ===",
                    daemon.interval_minutes
                );
            }
        }
    }

    Ok(())
}
