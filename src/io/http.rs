use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Fetch;
use anyhow::{Result, bail};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Connection settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts after the first one for connection errors, 5xx and 429
    pub max_retry: u32,
    /// Base backoff, multiplied by the retry number
    pub retry_delay: Duration,
    /// Minimum time between the start of two requests
    pub min_interval: Duration,
    /// Proxy for all schemes, e.g. `http://127.0.0.1:8080`
    pub proxy: Option<String>,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retry: 5,
            retry_delay: Duration::from_millis(500),
            min_interval: Duration::ZERO,
            proxy: None,
            accept_language: "zh-CN".to_string(),
        }
    }
}

/// HTTP client for site pages and images
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
    transferred_bytes: AtomicU64,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)?,
        );

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
            config,
            transferred_bytes: AtomicU64::new(0),
            last_request: Mutex::new(None),
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Wait until `min_interval` has passed since the previous request
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_interval {
                tokio::time::sleep(self.config.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Send a GET request, retrying transient failures
    async fn send(&self, url: &str, referer: Option<&str>) -> Result<Response> {
        let mut retry_count = 0;

        loop {
            self.pace().await;

            let mut request = self.client.get(url);
            if let Some(referer) = referer {
                request = request.header(REFERER, referer);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if is_retryable(resp.status()) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retry {
                        bail!("HTTP request for {} failed with status: {}", url, resp.status());
                    }
                    warn!(
                        "Server error {}, retry {}/{}: {}",
                        resp.status(),
                        retry_count,
                        self.config.max_retry,
                        url
                    );
                }
                Ok(resp) => bail!("HTTP request for {} failed with status: {}", url, resp.status()),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count > self.config.max_retry {
                        bail!("Max retries exceeded for {}: {}", url, e);
                    }
                    warn!(
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.config.max_retry, e
                    );
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.config.retry_delay * retry_count).await;
        }
    }

    /// Stream the response body into `partial`, then move it to `path`
    async fn save_body(&self, resp: &mut Response, partial: &Path, path: &Path) -> Result<u64> {
        let mut file = fs::File::create(partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            self.transferred_bytes
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        file.flush().await?;
        drop(file);

        fs::rename(partial, path).await?;
        Ok(written)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        info!("Fetch {}", url);

        let text = self.send(url, None).await?.text().await?;
        self.transferred_bytes
            .fetch_add(text.len() as u64, Ordering::Relaxed);
        Ok(text)
    }

    async fn download(&self, url: &str, referer: &str, path: &Path) -> Result<u64> {
        info!("Download {}, save to {}", url, path.display());

        let mut resp = self.send(url, Some(referer)).await?;

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write into a side file so an interrupted download is not mistaken
        // for a finished page on the next run
        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        match self.save_body(&mut resp, &partial, path).await {
            Ok(written) => Ok(written),
            Err(err) => {
                if let Err(e) = fs::remove_file(&partial).await {
                    debug!("Failed to remove {}: {}", partial.display(), e);
                }
                Err(err)
            }
        }
    }
}
