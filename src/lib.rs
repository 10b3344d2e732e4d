//! # manhuagui
//!
//! A downloader for manhuagui.com that decodes the site's packed image
//! manifests without running any JavaScript.
//!
//! Volume pages hide their image list in an obfuscated inline script. This
//! library recognises the two script protocols the site has used, reverses
//! the LZ-string compression and symbol packing, and turns the embedded
//! manifest into signed image URLs.
//!
//! ## Features
//!
//! - LZ-string Base64 codec, both directions
//! - Deobfuscation of `p,a,c,k,e,d` packed scripts
//! - Manifest extraction and page URL construction
//! - Book page scraping, including adult-gated chapter lists
//! - Resumable downloads with retry and request pacing
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use manhuagui::site::{BookEntry, Site};
//! use manhuagui::{HttpConfig, HttpFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new(HttpConfig::default())?);
//!     let site = Site::new(fetcher);
//!
//!     let entry = BookEntry::parse("https://www.manhuagui.com/comic/1639/")?;
//!     let book = site.fetch_book(&entry).await?;
//!     for page in site.fetch_volume(&book.volumes[0]).await? {
//!         println!("{}", page);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod decode;
pub mod io;
pub mod site;

pub use cli::Cli;
pub use decode::{DecodeError, ImageManifest, PageUrl, decode_page};
pub use io::{Fetch, HttpConfig, HttpFetcher};
