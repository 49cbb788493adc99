//! GitLab repositories as a file system.
//!
//! Handles links such as
//! `https://gitlab.com/group/project/-/blob/main/hw/board.kicad_pcb` (one
//! file) and `https://gitlab.com/group/project/-/tree/main/hw` (every KiCad
//! file in a directory).

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use serde::Deserialize;

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::http::{basename, is_kicad_file, HttpClient};
use crate::remote::{absolute, segments, LinkKind, RemoteFs, RepoLink};

const ACCEPT_VALUE: &str = "application/vnd.gitlab+json";
const API_VERSION: &str = "v4";

/// Parse a user-facing GitLab link. Both the `/-/blob/` form and the older
/// form without `-` are accepted.
pub fn parse_url(url: &str, base: &str) -> Option<RepoLink> {
    let url = absolute(url, base).ok()?;
    let segs = segments(&url);
    let split = segs
        .iter()
        .position(|s| *s == "-")
        .map(|i| (i, i + 1))
        .or_else(|| {
            segs.iter()
                .skip(2)
                .position(|s| *s == "blob" || *s == "tree")
                .map(|i| (i + 2, i + 2))
        })
        .unwrap_or((segs.len(), segs.len()));
    RepoLink::from_parts(&segs[..split.0], &segs[split.1..])
}

/// Raw download URL for a blob link.
pub fn raw_url(url: &str, base: &str) -> Result<String> {
    let absolute_url = absolute(url, base)?;
    if segments(&absolute_url).windows(2).any(|w| w == ["-", "raw"]) {
        return Ok(absolute_url.to_string());
    }
    let link = parse_url(url, base).ok_or_else(|| FetchError::Url(url.to_string()))?;
    match (link.kind, link.git_ref) {
        (Some(LinkKind::Blob), Some(git_ref)) => Ok(raw_file_url(
            &origin(&absolute_url),
            &link.owner,
            &link.repo,
            &git_ref,
            &link.path,
        )),
        _ => Err(FetchError::Url(url.to_string())),
    }
}

fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn raw_file_url(origin: &str, owner: &str, repo: &str, git_ref: &str, path: &str) -> String {
    format!("{origin}/{owner}/{repo}/-/raw/{git_ref}/{path}")
}

/// Repository tree listing endpoint for a directory link.
pub fn tree_api_url(link: &RepoLink, base: &str) -> Result<String> {
    let project = format!("{}/{}", link.owner, link.repo).replace('/', "%2F");
    let raw = format!("{}/api/{API_VERSION}/projects/{project}/repository/tree", base.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|_| FetchError::Url(raw.clone()))?;
    {
        let mut query = url.query_pairs_mut();
        if !link.path.is_empty() {
            query.append_pair("path", &link.path);
        }
        if let Some(git_ref) = &link.git_ref {
            query.append_pair("ref", git_ref);
        }
        query.append_pair("per_page", "100");
    }
    Ok(url.to_string())
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

pub fn client(config: &FetchConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    headers.insert("x-gitlab-api-version", HeaderValue::from_static(API_VERSION));
    if let Some(token) = &config.token {
        let value = HeaderValue::from_str(token).map_err(|_| FetchError::Url("invalid token".into()))?;
        headers.insert("private-token", value);
    }
    HttpClient::new(headers, config.timeout)
}

/// Collect the KiCad files named by `urls`. Links that do not parse are
/// skipped.
pub async fn open(config: &FetchConfig, urls: &[String]) -> Result<RemoteFs> {
    let client = client(config)?;
    let base = config.gitlab_url.as_str();
    let mut files = BTreeMap::new();
    for url in urls {
        let Some(link) = parse_url(url, base) else {
            tracing::warn!("skipping unrecognised GitLab link {url}");
            continue;
        };
        match (link.kind, link.git_ref.as_deref()) {
            (Some(LinkKind::Blob), _) => {
                let raw = raw_url(url, base)?;
                files.insert(basename(&raw).to_string(), raw);
            }
            (Some(LinkKind::Tree), Some(git_ref)) => {
                let listing: Vec<TreeEntry> = client.json(&tree_api_url(&link, base)?).await?;
                let site = origin(&absolute(url, base)?);
                for entry in listing {
                    if entry.kind != "blob" || !is_kicad_file(&entry.name) {
                        continue;
                    }
                    let raw = raw_file_url(&site, &link.owner, &link.repo, git_ref, &entry.path);
                    files.insert(entry.name, raw);
                }
            }
            _ => tracing::warn!("GitLab link {url} names neither a file nor a directory"),
        }
    }
    tracing::info!("GitLab file system with {} files", files.len());
    Ok(RemoteFs::new(client, files))
}
