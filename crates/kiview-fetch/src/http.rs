use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{FetchError, Result};

const USER_AGENT_VALUE: &str = concat!("kiview-fetch/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the remote file systems.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    rate_limit_remaining: Mutex<Option<u64>>,
}

impl HttpClient {
    pub fn new(mut headers: HeaderMap, timeout: Duration) -> Result<Self> {
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            rate_limit_remaining: Mutex::new(None),
        })
    }

    /// Remaining request budget reported by the last response, if any.
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.rate_limit_remaining.lock().ok().and_then(|g| *g)
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .or_else(|| response.headers().get("ratelimit-remaining"))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(remaining) = remaining {
            if let Ok(mut slot) = self.rate_limit_remaining.lock() {
                *slot = Some(remaining);
            }
        }
        check_status(url, response).await
    }

    pub async fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(url).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(url.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("{url}: {status}");
    Err(FetchError::Api {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Last path segment of a URL or path.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Lowercased extension without the dot.
pub fn extension(name: &str) -> String {
    match basename(name).rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

pub const KICAD_EXTENSIONS: [&str; 3] = ["kicad_pcb", "kicad_pro", "kicad_sch"];

pub fn is_kicad_file(name: &str) -> bool {
    KICAD_EXTENSIONS.contains(&extension(name).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://x.org/a/b/board.kicad_pcb", "board.kicad_pcb")]
    #[case("dir/", "dir")]
    #[case("plain", "plain")]
    fn test_basename(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(basename(input), expected);
    }

    #[rstest]
    #[case("top.KICAD_SCH", true)]
    #[case("proj.kicad_pro", true)]
    #[case("board.kicad_pcb", true)]
    #[case("fp-lib-table", false)]
    #[case(".kicad_sch", false)]
    #[case("notes.txt", false)]
    fn test_is_kicad_file(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_kicad_file(name), expected);
    }
}
