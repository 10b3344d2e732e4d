use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::io::HttpConfig;

#[derive(Parser, Debug)]
#[command(name = "manhuagui")]
#[command(version)]
#[command(about = "Download manga from manhuagui.com", long_about = None)]
#[command(after_help = "Examples:\n  \
  manhuagui https://www.manhuagui.com/comic/1639/            download every volume\n  \
  manhuagui -o ~/manga https://m.manhuagui.com/comic/1639/   download into ~/manga\n  \
  manhuagui -l https://www.manhuagui.com/comic/1639/         list volumes and page URLs\n  \
  manhuagui saved-volume.html                                print page URLs of a saved volume page")]
pub struct Cli {
    /// Book URL (e.g. https://www.manhuagui.com/comic/1639/) or a saved volume page
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output directory (default: current directory)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Use proxy server
    #[arg(short = 'x', long = "proxy", value_name = "HOST")]
    pub proxy: Option<String>,

    /// Display debug messages
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// List volumes and page URLs without downloading
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Retries per request on connection errors, 5xx and 429 responses
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub retries: u32,

    /// Minimum delay between requests in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub delay: u64,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }

    /// Default log filter when `RUST_LOG` is not set
    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            max_retry: self.retries,
            min_interval: Duration::from_millis(self.delay),
            proxy: self.proxy.clone(),
            ..HttpConfig::default()
        }
    }
}
