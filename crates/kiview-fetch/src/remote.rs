//! Pieces shared by the GitLab and GitHub file systems.

use std::collections::BTreeMap;

use reqwest::Url;

use crate::error::{FetchError, Result};
use crate::http::HttpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A single file.
    Blob,
    /// A directory.
    Tree,
}

/// A user-facing repository link, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLink {
    /// Namespace; may contain `/` for nested groups.
    pub owner: String,
    pub repo: String,
    pub kind: Option<LinkKind>,
    pub git_ref: Option<String>,
    pub path: String,
}

impl RepoLink {
    /// Split `project` segments followed by `blob|tree / ref / path...`.
    pub(crate) fn from_parts(project: &[&str], rest: &[&str]) -> Option<Self> {
        let (repo, owner) = project.split_last()?;
        if owner.is_empty() {
            return None;
        }
        let mut link = RepoLink {
            owner: owner.join("/"),
            repo: repo.to_string(),
            kind: None,
            git_ref: None,
            path: String::new(),
        };
        if let [kind, git_ref, path @ ..] = rest {
            link.kind = match *kind {
                "blob" => Some(LinkKind::Blob),
                "tree" => Some(LinkKind::Tree),
                _ => None,
            };
            if link.kind.is_some() {
                link.git_ref = Some(git_ref.to_string());
                link.path = path.join("/");
            }
        }
        Some(link)
    }
}

/// Resolve `url` against `base`, accepting absolute and site-relative links.
pub(crate) fn absolute(url: &str, base: &str) -> Result<Url> {
    let base = Url::parse(base).map_err(|_| FetchError::Url(base.to_string()))?;
    base.join(url).map_err(|_| FetchError::Url(url.to_string()))
}

pub(crate) fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

/// Files of a remote repository, each mapped to a download URL.
#[derive(Debug)]
pub struct RemoteFs {
    client: HttpClient,
    files: BTreeMap<String, String>,
}

impl RemoteFs {
    pub fn new(client: HttpClient, files: BTreeMap<String, String>) -> Self {
        Self { client, files }
    }

    pub fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn url(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let url = self
            .files
            .get(name)
            .ok_or_else(|| FetchError::NotFound(name.to_string()))?;
        self.client.bytes(url).await
    }

    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.client.rate_limit_remaining()
    }
}
