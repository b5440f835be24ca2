use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "fx_triangle_scan", about = "FX triangular arbitrage scanner")]
pub struct Config {
    /// Render sets PORT
    #[arg(long, env = "PORT", default_value_t = 10000)]
    pub port: u16,

    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: String,

    /// Latest-rates endpoint, the currency code is appended as a path segment.
    #[arg(long, env = "RATES_URL", default_value = "https://api.exchangerate-api.com/v4/latest")]
    pub rates_url: String,

    /// Daily time-series endpoint (Frankfurter).
    #[arg(long, env = "HISTORY_URL", default_value = "https://api.frankfurter.app")]
    pub history_url: String,

    /// Rate tables fetched in parallel per detection pass.
    #[arg(long, env = "FETCH_CONCURRENCY", default_value_t = 8)]
    pub fetch_concurrency: usize,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Default profit threshold in percent.
    #[arg(long, env = "MIN_PROFIT", default_value_t = 0.5)]
    pub min_profit: f64,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
