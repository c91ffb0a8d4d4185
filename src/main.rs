mod aggregator;
mod alerts;
mod collectors;
mod config;
mod http;
mod metrics;
mod monitor;
mod scheduler;
mod state;

use axum::serve;
use clap::Parser;
use collectors::Collector;
use config::Config;
use metrics::Metrics;
use monitor::Monitor;
use reqwest::Client;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gpu-monitord")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./monitor.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Collect a single snapshot, print it as JSON and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = Config::load_or_default(&cli.config);
    info!(
        listen = %cfg.listen,
        service_url = %cfg.service_url,
        interval_secs = cfg.interval_secs,
        history_size = cfg.history_size,
        "запуск gpu-monitord"
    );

    let metrics = match Metrics::new(&cfg.gpu_device) {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };
    let monitor = Monitor::new(cfg.history_size, cfg.alerts);

    let client = Client::builder()
        .user_agent("gpu-monitord/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let mut aggregator = monitor.aggregator(Collector::new(&cfg, client), metrics.clone());

    if cli.once {
        let snapshot = aggregator.collect().await;
        match serde_json::to_string_pretty(&*snapshot) {
            Ok(text) => println!("{text}"),
            Err(err) => error!(error = %err, "не удалось сериализовать снимок"),
        }
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, %addr, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };
    info!(%addr, "HTTP-сервер запущен");

    let http_task = {
        let app = http::build_router(metrics.clone(), monitor.clone());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let collector_task = tokio::spawn(scheduler::run(aggregator, cfg.interval(), shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");
    let _ = shutdown_tx.send(true);

    let _ = collector_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
