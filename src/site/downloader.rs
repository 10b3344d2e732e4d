use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::{BookEntry, Site, Volume};
use crate::decode::DecodeError;
use crate::io::Fetch;

/// Outcome of a book download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Volumes whose pages are all on disk
    pub volumes: usize,
    pub pages_written: usize,
    /// Pages already present from an earlier run
    pub pages_skipped: usize,
    /// Titles of volumes whose manifest could not be decoded
    pub failed_volumes: Vec<String>,
}

/// Replace characters that are not allowed in file names and trim the
/// result.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '<' | '>' | '"' | '|' | '?' | '*' => '-',
            c => c,
        })
        .collect::<String>()
        .trim_matches([' ', '.', '-'])
        .to_string()
}

/// Extension of the last path segment of a URL, with its dot
fn url_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[dot..],
        _ => "",
    }
}

/// Directory name for `title`, or `fallback` when nothing usable remains
/// after sanitizing
fn dir_name(title: &str, fallback: &str) -> String {
    let name = sanitize_file_name(title);
    if name.is_empty() {
        sanitize_file_name(fallback)
    } else {
        name
    }
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

/// Book downloader
///
/// Saves `<output>/<book>/cover.<ext>`, `<output>/<book>/README.txt` and
/// one directory of zero-padded pages per volume. Files already on disk are
/// left alone, so an interrupted run can be repeated.
pub struct BookDownloader<F: Fetch> {
    site: Site<F>,
}

impl<F: Fetch> BookDownloader<F> {
    pub fn new(site: Site<F>) -> Self {
        Self { site }
    }

    /// Download the cover, README and every volume of a book
    pub async fn download_book(&self, entry: &BookEntry, output_dir: &Path) -> Result<DownloadSummary> {
        let book = self.site.fetch_book(entry).await?;
        let book_dir = output_dir.join(dir_name(&book.name, &book.id));
        fs::create_dir_all(&book_dir)
            .await
            .with_context(|| format!("Failed to create {}", book_dir.display()))?;

        if let Some(cover) = &book.cover {
            let cover_path = book_dir.join(format!("cover{}", url_extension(cover)));
            if fs::try_exists(&cover_path).await? {
                debug!("Book cover \"{}\" already exists", cover_path.display());
            } else {
                self.site
                    .fetcher()
                    .download(cover, self.site.base_url(), &cover_path)
                    .await?;
            }
        }

        fs::write(book_dir.join("README.txt"), book.readme()).await?;

        if book.volumes.is_empty() {
            error!("Unable to fetch volume info, the book may have been removed");
        } else {
            info!("{} volume(s) fetched", book.volumes.len());
        }

        let mut summary = DownloadSummary::default();
        for volume in &book.volumes {
            match self.download_volume(volume, &book_dir, &mut summary).await {
                Ok(()) => summary.volumes += 1,
                Err(err) => match err.downcast_ref::<DecodeError>() {
                    Some(decode) if !decode.is_format_change() => {
                        warn!("Skipping volume \"{}\": {}", volume.title, decode);
                        summary.failed_volumes.push(volume.title.clone());
                    }
                    // The site changed its script format, later volumes
                    // would fail the same way
                    Some(_) => {
                        return Err(err.context(format!(
                            "Volume page format of \"{}\" is not recognized",
                            volume.title
                        )));
                    }
                    None => return Err(err),
                },
            }
        }

        Ok(summary)
    }

    /// Download the pages of one volume into its own directory
    async fn download_volume(
        &self,
        volume: &Volume,
        book_dir: &Path,
        summary: &mut DownloadSummary,
    ) -> Result<()> {
        let pages = self.site.fetch_volume(volume).await?;

        let volume_dir = book_dir.join(dir_name(&volume.title, &volume.id));
        fs::create_dir_all(&volume_dir).await?;

        let width = digits(volume.page_count.max(pages.len()));
        for page in &pages {
            let file_name = format!("{:0width$}{}", page.number, url_extension(&page.url));
            let page_path = volume_dir.join(file_name);
            if fs::try_exists(&page_path).await? {
                debug!("Page \"{}\" already exists", page_path.display());
                summary.pages_skipped += 1;
                continue;
            }
            self.site
                .fetcher()
                .download(&page.url, self.site.base_url(), &page_path)
                .await?;
            summary.pages_written += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("第01话"), "第01话");
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "a-b-c-d-e-f-g-h-i-j");
        assert_eq!(sanitize_file_name(" ..Title?. "), "Title");
        assert_eq!(sanitize_file_name("-/-"), "");
    }

    #[test]
    fn test_dir_name_falls_back() {
        assert_eq!(dir_name("第01话", "1001"), "第01话");
        assert_eq!(dir_name("???", "1001"), "1001");
        assert_eq!(dir_name(" . ", "1002"), "1002");
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://i.hamreus.com/x/001.jpg.webp?e=1&m=2"), ".webp");
        assert_eq!(url_extension("https://cf.hamreus.com/cpic/h/99.jpg"), ".jpg");
        assert_eq!(url_extension("https://host/dir.d/file"), "");
        assert_eq!(url_extension("https://host/.hidden"), "");
    }

    #[test]
    fn test_digits() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(180), 3);
    }
}
