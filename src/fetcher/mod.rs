//! Tools for fetching data from a URL.
//!
//! This module holds the transport used to download streams, the transfer tracker, the
//! download stage of a job, and the fetchers of the external tools.

use crate::error::{Error, Result};
use crate::model::StreamDescriptor;
use crate::utils::file_system;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub mod deps;
pub mod stage;
pub mod tracker;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Callback receiving `(bytes_remaining, bytes_total)` during a transfer.
/// A total of `0` means the size is unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Writes the bytes of a remote stream to a local path.
pub trait Transport: Send + Sync {
    /// Downloads `stream` to `destination`, calling `on_progress` as bytes arrive, and
    /// returns the path of the written file.
    fn download(
        &self,
        stream: &StreamDescriptor,
        destination: &Path,
        on_progress: ProgressCallback,
    ) -> impl Future<Output = Result<PathBuf>> + Send;
}

/// The fetcher downloads data from a URL, retrying with exponential backoff.
pub struct Fetcher {
    /// The URL from which to download the data.
    url: String,
    /// The number of download attempts in case of failure.
    retry_attempts: usize,
    /// The size to report while the server does not announce one. May be an estimate, so it
    /// is never used to detect truncation.
    expected_size: Option<u64>,
    /// Extra request headers, sent after the default user agent.
    headers: HeaderMap,
    /// Called with the downloaded size and total size.
    #[allow(clippy::type_complexity)]
    progress_callback: Option<Arc<dyn Fn(u64, u64) + Send + Sync>>,
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetcher(url={}, retries={})", self.url, self.retry_attempts)
    }
}

impl Fetcher {
    /// Creates a new fetcher for the given URL.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: url.as_ref().to_string(),
            retry_attempts: 3,
            expected_size: None,
            headers: HeaderMap::new(),
            progress_callback: None,
        }
    }

    /// Configures the number of download attempts in case of failure.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Configures the size reported when the server sends no `Content-Length`.
    pub fn with_expected_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    /// Adds headers to every request. Invalid names or values are skipped.
    pub fn with_headers<'h>(
        mut self,
        headers: impl IntoIterator<Item = (&'h String, &'h String)>,
    ) -> Self {
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    self.headers.insert(name, value);
                }
                _ => log::warn!("Ignoring invalid request header '{}'", name),
            }
        }
        self
    }

    /// Configure a callback for tracking download progress.
    ///
    /// # Arguments
    ///
    /// * `callback` - A function that will be called with the downloaded size and total size.
    ///   The total is `0` while the size is unknown.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Fetches the body of the URL as text.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt if every attempt failed.
    pub async fn fetch_text(&self) -> Result<String> {
        log::debug!("Fetching text from {}", self.url);

        self.retrying(|| self.text_once()).await
    }

    /// Downloads the asset at the URL to the destination, returning the number of bytes written.
    /// Each attempt restarts the file from scratch.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt if every attempt failed.
    pub async fn fetch_asset(&self, destination: impl AsRef<Path> + fmt::Debug) -> Result<u64> {
        log::debug!("Fetching asset from {} to {:?}", self.url, destination);

        file_system::create_parent_dir(&destination)?;

        self.retrying(|| self.fetch_once(destination.as_ref())).await
    }

    async fn retrying<T, F, Fut>(&self, attempt_once: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_once().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 < self.retry_attempts => {
                    log::warn!(
                        "Request to {} failed (attempt {}): {}",
                        self.url,
                        attempt + 1,
                        error
                    );

                    tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt as u32)))
                        .await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send(&self) -> Result<reqwest::Response> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let response = client
            .get(&self.url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .headers(self.headers.clone())
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }

    async fn text_once(&self) -> Result<String> {
        Ok(self.send().await?.text().await?)
    }

    async fn fetch_once(&self, destination: &Path) -> Result<u64> {
        let response = self.send().await?;

        let content_length = response.content_length();
        let total_bytes = content_length.or(self.expected_size).unwrap_or(0);

        let mut dest = file_system::create_file(destination).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded_bytes = 0u64;

        if let Some(callback) = &self.progress_callback {
            callback(0, total_bytes);
        }

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            dest.write_all(&chunk).await?;

            downloaded_bytes += chunk.len() as u64;
            if let Some(callback) = &self.progress_callback {
                callback(downloaded_bytes, total_bytes);
            }
        }

        dest.flush().await?;

        if let Some(expected) = content_length {
            if downloaded_bytes < expected {
                return Err(Error::TransferFailed(format!(
                    "connection closed after {} of {} bytes",
                    downloaded_bytes, expected
                )));
            }
        }

        Ok(downloaded_bytes)
    }
}

/// The HTTP transport, streaming each stream's URL to disk with [`Fetcher`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The number of download attempts per stream.
    pub retry_attempts: usize,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self { retry_attempts: 3 }
    }
}

impl HttpTransport {
    pub fn new(retry_attempts: usize) -> Self {
        Self { retry_attempts }
    }
}

impl Transport for HttpTransport {
    async fn download(
        &self,
        stream: &StreamDescriptor,
        destination: &Path,
        on_progress: ProgressCallback,
    ) -> Result<PathBuf> {
        if stream.url.is_empty() {
            return Err(Error::TransferFailed(format!("{} has no URL", stream)));
        }

        Fetcher::new(&stream.url)
            .with_retry_attempts(self.retry_attempts)
            .with_expected_size(stream.total_size_bytes)
            .with_headers(&stream.http_headers)
            .with_progress_callback(move |downloaded, total| {
                // An unknown total stays 0.
                on_progress(total.saturating_sub(downloaded), total)
            })
            .fetch_asset(destination)
            .await
            .map_err(Error::into_transfer)?;

        Ok(destination.to_path_buf())
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::*;
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::fixtures::video_stream;
    use std::sync::Mutex;

    fn remote_stream(url: &str, size: Option<u64>) -> StreamDescriptor {
        let mut stream = video_stream("136", "720p", "mp4");
        stream.url = url.to_string();
        stream.total_size_bytes = size;
        stream
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<(u64, u64)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let callback: ProgressCallback = Arc::new(move |remaining, total| {
            seen.lock().unwrap().push((remaining, total));
        });
        (callback, calls)
    }

    #[tokio::test]
    async fn reports_remaining_bytes_of_announced_length() {
        let server = TestServer::start(vec![with_length(b"0123456789")]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("video.mp4");
        let (callback, calls) = recorder();

        let written = HttpTransport::new(1)
            .download(&remote_stream(&server.url, None), &destination, callback)
            .await
            .unwrap();

        assert_eq!(written, destination);
        assert_eq!(std::fs::read(&destination).unwrap(), b"0123456789");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.first(), Some(&(10, 10)));
        assert_eq!(calls.last(), Some(&(0, 10)));
        assert!(calls.iter().all(|(_, total)| *total == 10));
    }

    #[tokio::test]
    async fn unknown_size_keeps_total_unknown() {
        let server = TestServer::start(vec![chunked(&[b"hello", b"world"])]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("audio.m4a");
        let (callback, calls) = recorder();

        HttpTransport::new(1)
            .download(&remote_stream(&server.url, None), &destination, callback)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"helloworld");
        assert!(calls.lock().unwrap().iter().all(|call| *call == (0, 0)));
    }

    #[tokio::test]
    async fn estimated_size_does_not_fail_a_shorter_body() {
        let server = TestServer::start(vec![chunked(&[b"hello", b"world"])]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("video.mp4");
        let (callback, calls) = recorder();

        HttpTransport::new(1)
            .download(&remote_stream(&server.url, Some(12)), &destination, callback)
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 10);
        assert_eq!(calls.lock().unwrap().last(), Some(&(2, 12)));
    }

    #[tokio::test]
    async fn truncated_body_is_a_transfer_failure() {
        let server = TestServer::start(vec![truncated(b"01234", 10)]).await;
        let dir = tempfile::tempdir().unwrap();
        let (callback, _) = recorder();

        let error = HttpTransport::new(1)
            .download(
                &remote_stream(&server.url, None),
                &dir.path().join("video.mp4"),
                callback,
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TransferFailed);
    }

    #[tokio::test]
    async fn retries_after_a_failed_attempt() {
        let server = TestServer::start(vec![server_error(), with_length(b"data")]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("video.mp4");
        let (callback, _) = recorder();

        HttpTransport::new(2)
            .download(&remote_stream(&server.url, None), &destination, callback)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"data");
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_attempts_end_in_transfer_failure() {
        let server = TestServer::start(vec![server_error(), server_error()]).await;
        let dir = tempfile::tempdir().unwrap();
        let (callback, _) = recorder();

        let error = HttpTransport::new(2)
            .download(
                &remote_stream(&server.url, None),
                &dir.path().join("video.mp4"),
                callback,
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TransferFailed);
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn stream_without_url_is_a_transfer_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (callback, calls) = recorder();

        let error = HttpTransport::default()
            .download(&remote_stream("", None), &dir.path().join("video.mp4"), callback)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TransferFailed);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sends_the_headers_of_the_stream() {
        let server = TestServer::start(vec![with_length(b"data")]).await;
        let dir = tempfile::tempdir().unwrap();
        let mut stream = remote_stream(&server.url, None);
        stream
            .http_headers
            .insert("Referer".to_string(), "https://www.youtube.com/".to_string());
        let (callback, _) = recorder();

        HttpTransport::new(1)
            .download(&stream, &dir.path().join("video.mp4"), callback)
            .await
            .unwrap();

        let request = server.requests()[0].to_ascii_lowercase();
        assert!(request.contains("referer: https://www.youtube.com/"));
        assert!(request.contains("user-agent: mozilla/5.0"));
    }

    #[tokio::test]
    async fn fetch_text_retries_after_a_failed_attempt() {
        let server = TestServer::start(vec![server_error(), with_length(b"WEBVTT")]).await;

        let text = Fetcher::new(&server.url)
            .with_retry_attempts(2)
            .fetch_text()
            .await
            .unwrap();

        assert_eq!(text, "WEBVTT");
        assert_eq!(server.requests().len(), 2);
    }
}
