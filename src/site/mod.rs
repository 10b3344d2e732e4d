//! manhuagui.com book pages, volume pages and downloading.

pub mod book;
pub mod downloader;

pub use book::{Book, Volume};
pub use downloader::{BookDownloader, DownloadSummary, sanitize_file_name};

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::decode::{self, PageUrl, page_urls};
use crate::io::Fetch;

/// Site root; volume links and the image `Referer` are relative to it
pub const BASE_URL: &str = "https://www.manhuagui.com";
/// Host serving page images
pub const IMAGE_HOST: &str = "https://i.hamreus.com";

static BOOK_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://(www|m)\.manhuagui\.com/comic/(\d+)/").expect("book url pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SiteError {
    #[error("not a manhuagui book url: {0}")]
    InvalidBookUrl(String),
    #[error("failed to parse book page: {0}")]
    Parse(String),
}

/// A book as addressed by its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    pub id: String,
    /// Canonical desktop URL, e.g. `https://www.manhuagui.com/comic/1639/`
    pub url: String,
}

impl BookEntry {
    /// Accept a desktop or mobile book URL. Anything after the book id is
    /// dropped and the mobile host is rewritten to the desktop one.
    pub fn parse(url: &str) -> Result<Self, SiteError> {
        let caps = BOOK_URL_REGEX
            .captures(url)
            .ok_or_else(|| SiteError::InvalidBookUrl(url.to_string()))?;

        let matched = &caps[0];
        let book_url = if caps[1].eq_ignore_ascii_case("m") {
            format!("https://www{}", &matched["https://m".len()..])
        } else {
            matched.to_string()
        };

        Ok(Self {
            id: caps[2].to_string(),
            url: book_url,
        })
    }
}

/// Book and volume lookups over a [`Fetch`] implementation
pub struct Site<F: Fetch> {
    fetcher: Arc<F>,
    base_url: String,
    image_host: String,
}

impl<F: Fetch> Site<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_hosts(fetcher, BASE_URL, IMAGE_HOST)
    }

    /// Use other hosts, e.g. a local mirror
    pub fn with_hosts(
        fetcher: Arc<F>,
        base_url: impl Into<String>,
        image_host: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            image_host: image_host.into(),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch and parse a book page
    pub async fn fetch_book(&self, entry: &BookEntry) -> Result<Book> {
        let html = self.fetcher.get_text(&entry.url).await?;
        Ok(Book::parse(entry, &html, &self.base_url)?)
    }

    /// Fetch a volume page and decode the URLs of its pages.
    ///
    /// Decoder failures surface as [`decode::DecodeError`] inside the
    /// returned error.
    pub async fn fetch_volume(&self, volume: &Volume) -> Result<Vec<PageUrl>> {
        let html = self.fetcher.get_text(&volume.url).await?;
        let manifest = decode::decode_page(&html)?;
        debug!(
            "Volume {} has {} page(s) under {}",
            volume.title,
            manifest.page_count(),
            manifest.path
        );
        Ok(page_urls(&manifest, &self.image_host))
    }
}
