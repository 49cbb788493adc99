//! GitHub repositories as a file system.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::Deserialize;

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::http::{basename, is_kicad_file, HttpClient};
use crate::remote::{absolute, segments, LinkKind, RemoteFs, RepoLink};

const HTML_BASE_URL: &str = "https://github.com";

/// Parse `github.com/owner/repo/blob|tree/ref/path` links. Raw
/// `raw.githubusercontent.com/owner/repo/ref/path` links parse as blobs.
pub fn parse_url(url: &str, raw_base: &str) -> Option<RepoLink> {
    let parsed = absolute(url, HTML_BASE_URL).ok()?;
    let segs = segments(&parsed);
    if is_raw(&parsed, raw_base) {
        if let [owner, repo, git_ref, path @ ..] = segs.as_slice() {
            return Some(RepoLink {
                owner: owner.to_string(),
                repo: repo.to_string(),
                kind: Some(LinkKind::Blob),
                git_ref: Some(git_ref.to_string()),
                path: path.join("/"),
            });
        }
        return None;
    }
    if segs.len() < 2 {
        return None;
    }
    RepoLink::from_parts(&segs[..2], &segs[2..])
}

fn is_raw(url: &Url, raw_base: &str) -> bool {
    let raw_host = Url::parse(raw_base).ok();
    url.host_str().is_some() && url.host_str() == raw_host.as_ref().and_then(|u| u.host_str())
}

/// Raw download URL for a blob link; raw links pass through.
pub fn raw_url(url: &str, raw_base: &str) -> Result<String> {
    let parsed = absolute(url, HTML_BASE_URL)?;
    if is_raw(&parsed, raw_base) {
        return Ok(parsed.to_string());
    }
    let link = parse_url(url, raw_base).ok_or_else(|| FetchError::Url(url.to_string()))?;
    match (link.kind, &link.git_ref) {
        (Some(LinkKind::Blob), Some(git_ref)) => Ok(format!(
            "{}/{}/{}/{}/{}",
            raw_base.trim_end_matches('/'),
            link.owner,
            link.repo,
            git_ref,
            link.path
        )),
        _ => Err(FetchError::Url(url.to_string())),
    }
}

/// Contents API endpoint for a directory link.
pub fn contents_api_url(link: &RepoLink, api_base: &str) -> Result<String> {
    let raw = format!(
        "{}/repos/{}/{}/contents/{}",
        api_base.trim_end_matches('/'),
        link.owner,
        link.repo,
        link.path
    );
    let mut url = Url::parse(&raw).map_err(|_| FetchError::Url(raw.clone()))?;
    if let Some(git_ref) = &link.git_ref {
        url.query_pairs_mut().append_pair("ref", git_ref);
    }
    Ok(url.to_string())
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

pub fn client(config: &FetchConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
    if let Some(token) = &config.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| FetchError::Url("invalid token".into()))?;
        headers.insert(AUTHORIZATION, value);
    }
    HttpClient::new(headers, config.timeout)
}

pub async fn open(config: &FetchConfig, urls: &[String]) -> Result<RemoteFs> {
    let client = client(config)?;
    let raw_base = config.github_raw_url.as_str();
    let mut files = BTreeMap::new();
    for url in urls {
        let Some(link) = parse_url(url, raw_base) else {
            tracing::warn!("skipping unrecognised GitHub link {url}");
            continue;
        };
        match link.kind {
            Some(LinkKind::Blob) => {
                let raw = raw_url(url, raw_base)?;
                files.insert(basename(&raw).to_string(), raw);
            }
            Some(LinkKind::Tree) => {
                let api = contents_api_url(&link, &config.github_api_url)?;
                let listing: Vec<ContentEntry> = client.json(&api).await?;
                for entry in listing {
                    let Some(download) = entry.download_url else { continue };
                    if entry.kind == "file" && is_kicad_file(&entry.name) {
                        files.insert(entry.name, download);
                    }
                }
            }
            None => tracing::warn!("GitHub link {url} names neither a file nor a directory"),
        }
    }
    tracing::info!("GitHub file system with {} files", files.len());
    Ok(RemoteFs::new(client, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_GITHUB_API_URL, DEFAULT_GITHUB_RAW_URL};

    #[test]
    fn test_blob_to_raw() {
        let url = "https://github.com/theacodes/kicanvas/blob/main/debug/board.kicad_pcb";
        assert_eq!(
            raw_url(url, DEFAULT_GITHUB_RAW_URL).unwrap(),
            "https://raw.githubusercontent.com/theacodes/kicanvas/main/debug/board.kicad_pcb"
        );
    }

    #[test]
    fn test_raw_link_passes_through() {
        let url = "https://raw.githubusercontent.com/o/r/v2/hw/top.kicad_sch";
        assert_eq!(raw_url(url, DEFAULT_GITHUB_RAW_URL).unwrap(), url);
        let link = parse_url(url, DEFAULT_GITHUB_RAW_URL).unwrap();
        assert_eq!(link.kind, Some(LinkKind::Blob));
        assert_eq!(link.git_ref.as_deref(), Some("v2"));
        assert_eq!(link.path, "hw/top.kicad_sch");
    }

    #[test]
    fn test_tree_listing_url() {
        let link = parse_url("https://github.com/o/r/tree/dev/hw", DEFAULT_GITHUB_RAW_URL).unwrap();
        assert_eq!(link.kind, Some(LinkKind::Tree));
        assert_eq!(
            contents_api_url(&link, DEFAULT_GITHUB_API_URL).unwrap(),
            "https://api.github.com/repos/o/r/contents/hw?ref=dev"
        );
    }

    #[test]
    fn test_rejects_short_paths() {
        assert!(parse_url("https://github.com/o", DEFAULT_GITHUB_RAW_URL).is_none());
        assert!(raw_url("https://github.com/o/r", DEFAULT_GITHUB_RAW_URL).is_err());
    }
}
