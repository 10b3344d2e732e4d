mod http;

pub use http::{HttpConfig, HttpFetcher};

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Trait for retrieving pages and images from the site
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch a page and return its body as text
    async fn get_text(&self, url: &str) -> Result<String>;

    /// Download `url` into `path`, sending `referer`, and return the number
    /// of bytes written
    async fn download(&self, url: &str, referer: &str, path: &Path) -> Result<u64>;
}
