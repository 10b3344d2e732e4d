//! Page URL construction.

use std::fmt;

use super::manifest::ImageManifest;

/// Absolute URL of one page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrl {
    /// 1-based page number.
    pub number: usize,
    pub url: String,
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Build one URL per manifest file, page 1 first.
///
/// Each URL is `host + path + file + "?e=" + e + "&m=" + m`, with every
/// piece used verbatim.
pub fn page_urls(manifest: &ImageManifest, host: &str) -> Vec<PageUrl> {
    let query = format!(
        "?e={}&m={}",
        manifest.security.e, manifest.security.m
    );
    manifest
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| PageUrl {
            number: index + 1,
            url: format!("{host}{}{file}{query}", manifest.path),
        })
        .collect()
}
