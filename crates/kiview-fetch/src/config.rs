use std::time::Duration;

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoints and credentials for remote file systems.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub gitlab_url: String,
    pub github_api_url: String,
    pub github_raw_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            gitlab_url: DEFAULT_GITLAB_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_raw_url: DEFAULT_GITHUB_RAW_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(v) = get("KIVIEW_GITLAB_URL") {
            config.gitlab_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("KIVIEW_GITHUB_API_URL") {
            config.github_api_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("KIVIEW_GITHUB_RAW_URL") {
            config.github_raw_url = v.trim_end_matches('/').to_string();
        }
        config.token = get("KIVIEW_TOKEN");
        if let Some(secs) = get("KIVIEW_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = FetchConfig::from_lookup(|_| None);
        assert_eq!(config, FetchConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("KIVIEW_GITLAB_URL", "https://git.example.org/"),
            ("KIVIEW_TOKEN", "secret"),
            ("KIVIEW_TIMEOUT_SECS", "5"),
            ("KIVIEW_GITHUB_RAW_URL", "  "),
        ]);
        let config = FetchConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.gitlab_url, "https://git.example.org");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.github_raw_url, DEFAULT_GITHUB_RAW_URL);
    }
}
