use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

mod analytics;
mod config;
mod engine;
mod error;
mod history;
mod logic;
mod models;
mod rates;
mod routes;
mod utils;

use config::Config;
use engine::ArbitrageEngine;
use history::Frankfurter;
use models::AppState;
use rates::ExchangeRateApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_tracing();
    let cfg = Config::parse();

    let rates = ExchangeRateApi::new(&cfg.rates_url, cfg.fetch_timeout())
        .context("rates client")?;
    let history = Frankfurter::new(&cfg.history_url, cfg.fetch_timeout())
        .context("history client")?;

    let state = AppState {
        engine: ArbitrageEngine::new(Arc::new(rates), cfg.fetch_concurrency),
        history: Arc::new(history),
        min_profit: cfg.min_profit,
    };

    // Router: API routes + static frontend
    let app = routes::router(state, &cfg.static_dir);

    let addr = cfg.addr();
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
