use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_DISPOSITION;
use tracing::warn;

use crate::error::{Error, Result};
use crate::ToolSettings;

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename\s*=\s*"?([^";]+)"?"#).unwrap());

/// Fallback when neither header nor URL yields a usable name
const DEFAULT_FILENAME: &str = "memory";

/// Retrieves a remote asset into a directory.
pub trait Fetcher {
    /// Download `url` into `dest_dir`, returning the written file's path
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Blocking HTTP GET with retry.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &ToolSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("memories-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Download {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            max_retries: settings.download_retries.max(1),
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
        })
    }

    /// Retries on transport errors, error statuses and missing
    /// `Content-Disposition` (the export server sometimes omits it). A
    /// header-less response is still used if nothing better arrives.
    fn get(&self, url: &str) -> Result<Response> {
        let mut fallback = None;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                thread::sleep(self.retry_delay);
            }

            match self.client.get(url).send().and_then(Response::error_for_status) {
                Ok(resp) if resp.headers().contains_key(CONTENT_DISPOSITION) => return Ok(resp),
                Ok(resp) => {
                    warn!(
                        "Header not found. Attempt {attempt}/{}. Retrying in {}s...",
                        self.max_retries,
                        self.retry_delay.as_secs()
                    );
                    fallback = Some(resp);
                }
                Err(e) => {
                    warn!("Download attempt {attempt}/{} failed: {e}", self.max_retries);
                    last_error = e.to_string();
                }
            }
        }

        fallback.ok_or_else(|| Error::Download {
            url: url.to_string(),
            reason: last_error,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let resp = self.get(url)?;
        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| filename_from_url(url));

        let body = resp.bytes().map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(filename);
        fs::write(&path, &body)?;
        Ok(path)
    }
}

/// Only the final path component, so the name cannot leave the directory
fn sanitize(name: &str) -> Option<String> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

/// `filename=` parameter of a Content-Disposition value
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let caps = FILENAME_RE.captures(header)?;
    sanitize(caps.get(1)?.as_str())
}

/// Last non-empty path segment of the URL, query excluded
pub fn filename_from_url(url: &str) -> String {
    let name = match reqwest::Url::parse(url) {
        Ok(u) => u
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
        Err(_) => url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .map(str::to_string),
    };

    name.as_deref()
        .and_then(sanitize)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="abc-main.zip""#).as_deref(),
            Some("abc-main.zip")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=clip.mp4").as_deref(),
            Some("clip.mp4")
        );
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/media/photo.jpg?sig=abc"),
            "photo.jpg"
        );
        assert_eq!(filename_from_url("https://example.com/a/b/"), "b");
        assert_eq!(filename_from_url("https://example.com"), DEFAULT_FILENAME);
        assert_eq!(filename_from_url("not a url/file.mp4?x=1"), "file.mp4");
    }
}
