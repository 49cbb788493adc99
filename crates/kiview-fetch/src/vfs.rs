//! Virtual file systems that supply document bytes by file name.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::http::basename;
use crate::remote::RemoteFs;
use crate::{github, gitlab};

/// Files in a local directory. Names are relative paths below the root.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let rel = Path::new(name);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FetchError::NotFound(name.to_string()));
        }
        Ok(self.root.join(rel))
    }

    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Files of a zip archive, read into memory up front.
#[derive(Debug, Clone, Default)]
pub struct ZipFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl ZipFs {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
        let mut files = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            files.insert(name, content);
        }
        tracing::debug!("zip archive with {} files", files.len());
        Ok(Self { files })
    }

    pub fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Exact archive path, or else the only entry with that base name.
    fn lookup(&self, name: &str) -> Option<&Vec<u8>> {
        if let Some(data) = self.files.get(name) {
            return Some(data);
        }
        let mut matches = self
            .files
            .iter()
            .filter(|(path, _)| basename(path) == basename(name));
        match (matches.next(), matches.next()) {
            (Some((_, data)), None) => Some(data),
            _ => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.lookup(name)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(name.to_string()))
    }
}

/// Any of the supported file systems.
#[derive(Debug)]
pub enum Vfs {
    Local(LocalFs),
    Zip(ZipFs),
    GitLab(RemoteFs),
    GitHub(RemoteFs),
}

impl Vfs {
    /// Pick a file system for a command-line style source: an http(s) URL,
    /// a `.zip` file, a directory, or a single file (served from its
    /// directory).
    pub async fn open(source: &str, config: &FetchConfig) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let urls = [source.to_string()];
            let host = reqwest::Url::parse(source)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            let github_hosts = [
                host_of(&config.github_raw_url),
                Some("github.com".to_string()),
            ];
            return if github_hosts.iter().flatten().any(|h| *h == host) {
                Ok(Vfs::GitHub(github::open(config, &urls).await?))
            } else {
                Ok(Vfs::GitLab(gitlab::open(config, &urls).await?))
            };
        }
        let path = Path::new(source);
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if is_zip {
            let data = tokio::fs::read(path).await?;
            return Ok(Vfs::Zip(ZipFs::from_bytes(&data)?));
        }
        if path.is_dir() {
            return Ok(Vfs::Local(LocalFs::new(path)));
        }
        if path.is_file() {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            return Ok(Vfs::Local(LocalFs::new(dir)));
        }
        Err(FetchError::NotFound(source.to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        match self {
            Vfs::Local(fs) => fs.list(),
            Vfs::Zip(fs) => fs.list(),
            Vfs::GitLab(fs) | Vfs::GitHub(fs) => fs.list(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        match self {
            Vfs::Local(fs) => fs.has(name),
            Vfs::Zip(fs) => fs.has(name),
            Vfs::GitLab(fs) | Vfs::GitHub(fs) => fs.has(name),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        match self {
            Vfs::Local(fs) => fs.get(name).await,
            Vfs::Zip(fs) => fs.get(name),
            Vfs::GitLab(fs) | Vfs::GitHub(fs) => fs.get(name).await,
        }
    }

    /// First schematic in the listing, else the first board.
    pub fn default_document(&self) -> Option<String> {
        let files = self.list();
        ["kicad_sch", "kicad_pcb"].iter().find_map(|ext| {
            files
                .iter()
                .find(|f| crate::http::extension(f) == *ext)
                .cloned()
        })
    }
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// In-memory zip of `(name, content)` pairs.
    pub(crate) fn make_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_zip_lookup() {
        let data = make_zip(&[
            ("proj/top.kicad_sch", "(kicad_sch)"),
            ("proj/sub/power.kicad_sch", "(kicad_sch (uuid p))"),
            ("a/dup.txt", "1"),
            ("b/dup.txt", "2"),
        ]);
        let fs = ZipFs::from_bytes(&data).unwrap();
        assert_eq!(fs.list().len(), 4);
        assert!(fs.has("proj/top.kicad_sch"));
        assert_eq!(fs.get("power.kicad_sch").unwrap(), b"(kicad_sch (uuid p))");
        assert!(!fs.has("dup.txt"));
        assert!(fs.get("missing.kicad_sch").unwrap_err().is_not_found());
    }

    #[test]
    fn test_zip_rejects_garbage() {
        assert!(matches!(ZipFs::from_bytes(b"not a zip"), Err(FetchError::Zip(_))));
    }

    #[tokio::test]
    async fn test_local_fs() {
        let dir = std::env::temp_dir().join(format!("kiview-fetch-local-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.kicad_pcb"), "(kicad_pcb)").unwrap();
        std::fs::write(dir.join("a.kicad_sch"), "(kicad_sch)").unwrap();

        let vfs = Vfs::open(dir.to_str().unwrap(), &FetchConfig::default()).await.unwrap();
        assert_eq!(vfs.list(), vec!["a.kicad_sch", "b.kicad_pcb"]);
        assert!(vfs.has("a.kicad_sch"));
        assert!(!vfs.has("../a.kicad_sch"));
        assert_eq!(vfs.get("b.kicad_pcb").await.unwrap(), b"(kicad_pcb)");
        assert!(vfs.get("nope.kicad_sch").await.unwrap_err().is_not_found());
        assert!(vfs.get("../etc/passwd").await.unwrap_err().is_not_found());
        assert_eq!(vfs.default_document().as_deref(), Some("a.kicad_sch"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_source() {
        let err = Vfs::open("/definitely/not/here", &FetchConfig::default()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
