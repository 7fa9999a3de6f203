use std::collections::BTreeMap;
use std::time::Duration;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use crate::error::{Result, ZapError};
use crate::fetch::AssetDescriptor;

const USER_AGENT_STRING: &str = concat!("zap/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 30;
const API_TIMEOUT_SECS: u64 = 60;

/// A release as listed by the GitHub releases API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// One release entry of a mirror manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRelease {
    pub prerelease: bool,
    pub tag: String,
    pub published_at: String,
    pub assets: BTreeMap<String, AssetDescriptor>,
}

/// The per-app JSON document served by the curated index mirror.
///
/// ```json
/// { "owner": "...", "source": {"type": "...", "url": "..."},
///   "0": {"prerelease": false, "tag": "v2", "published_at": "...",
///         "assets": {"0": {"name": "...", "download": "...", "size": "..."}}} }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexManifest {
    pub owner: String,
    pub source_type: String,
    pub source_url: String,
    /// Releases keyed by their roll number, 0 being the latest.
    pub releases: BTreeMap<u64, IndexRelease>,
}

impl IndexManifest {
    pub fn from_json(body: &str) -> Result<IndexManifest> {
        let value: Value = serde_json::from_str(body)?;
        let object = value
            .as_object()
            .ok_or_else(|| ZapError::Manifest("was expecting a JSON object".to_string()))?;

        let owner = object
            .get("owner")
            .and_then(Value::as_str)
            .ok_or_else(|| ZapError::Manifest("this app does not provide any candidate for installation".to_string()))?;
        let source_field = |field: &str| {
            object
                .get("source")
                .and_then(|s| s.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ZapError::Manifest(format!("this app has no source {field} attribute")))
        };
        let source_type = source_field("type")?;
        let source_url = source_field("url")?;

        let mut releases = BTreeMap::new();
        for (key, value) in object {
            let Ok(roll) = key.parse::<u64>() else {
                continue;
            };
            releases.insert(roll, parse_release(key, value)?);
        }
        debug!("Found {} releases", releases.len());

        Ok(IndexManifest {
            owner: owner.to_string(),
            source_type,
            source_url,
            releases,
        })
    }

    /// Tags in roll order, latest first.
    pub fn tags(&self) -> Vec<String> {
        self.releases.values().map(|r| r.tag.clone()).collect()
    }
}

fn parse_release(key: &str, value: &Value) -> Result<IndexRelease> {
    let string = |v: &Value, field: &str| {
        v.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ZapError::Manifest(format!("release {key} has no '{field}'")))
    };

    let prerelease = value
        .get("prerelease")
        .and_then(Value::as_bool)
        .ok_or_else(|| ZapError::Manifest(format!("release {key} has no 'prerelease'")))?;
    let tag = string(value, "tag")?;
    let published_at = string(value, "published_at")?;

    let mut assets = BTreeMap::new();
    if let Some(map) = value.get("assets").and_then(Value::as_object) {
        for (asset_key, asset) in map {
            assets.insert(
                asset_key.clone(),
                AssetDescriptor {
                    name: string(asset, "name")?,
                    download: string(asset, "download")?,
                    size: string(asset, "size")?,
                },
            );
        }
    }

    Ok(IndexRelease { prerelease, tag, published_at, assets })
}

/// An app listed in the mirror's search catalog.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub maintainer: String,
}

/// Remote metadata the resolver consults.
pub trait ReleaseSource {
    fn github_releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>>;
    fn index_manifest(&self, url: &str) -> Result<IndexManifest>;
}

/// Talks to the GitHub API and the index mirror over HTTP.
pub struct HttpReleaseSource {
    client: Client,
    github_token: Option<String>,
}

impl HttpReleaseSource {
    pub fn new() -> Result<HttpReleaseSource> {
        Ok(HttpReleaseSource {
            client: build_http_client(Some(Duration::from_secs(API_TIMEOUT_SECS)))?,
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// Fetches `<mirror_root>/index.min.json`.
    pub fn catalog(&self, mirror_root: &str) -> Result<Vec<CatalogEntry>> {
        let url = format!("{}/index.min.json", mirror_root.trim_end_matches('/'));
        debug!("Fetching {url}");
        let response = self.client.get(&url).header(ACCEPT, "application/json").send()?.error_for_status()?;
        Ok(response.json()?)
    }
}

impl ReleaseSource for HttpReleaseSource {
    fn github_releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/releases");
        debug!("Fetching releases from {owner}/{repo}");
        let mut request = self.client.get(&url).header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.github_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = request.send()?.error_for_status()?;
        Ok(response.json()?)
    }

    fn index_manifest(&self, url: &str) -> Result<IndexManifest> {
        debug!("Fetching {url}");
        let response = self.client.get(url).header(ACCEPT, "application/json").send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ZapError::NoReleaseFound);
        }
        let body = response.error_for_status()?.text()?;
        IndexManifest::from_json(&body)
    }
}

/// Builds the blocking client used for every request zap makes.
/// `timeout` bounds the whole request, body included.
pub fn build_http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT_STRING)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "owner": "someone",
        "source": {"type": "github", "url": "https://github.com/someone/app"},
        "1": {"prerelease": false, "tag": "v1.0", "published_at": "2020-01-01",
              "assets": {"0": {"name": "app-1.0-x86_64.AppImage", "download": "https://x/1", "size": "10 MB"}}},
        "0": {"prerelease": true, "tag": "v2.0", "published_at": "2021-01-01",
              "assets": {"0": {"name": "app-2.0-x86_64.AppImage", "download": "https://x/2", "size": "11 MB"},
                         "1": {"name": "app-2.0-aarch64.AppImage", "download": "https://x/3", "size": "11 MB"}}}
    }"#;

    #[test]
    fn test_manifest_parses_releases_in_roll_order() {
        let manifest = IndexManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.owner, "someone");
        assert_eq!(manifest.source_type, "github");
        assert_eq!(manifest.tags(), vec!["v2.0", "v1.0"]);

        let latest = &manifest.releases[&0];
        assert_eq!(latest.tag, "v2.0");
        assert!(latest.prerelease);
        assert_eq!(latest.assets.len(), 2);
        assert_eq!(latest.assets["1"].download, "https://x/3");
    }

    #[test]
    fn test_manifest_without_owner() {
        let err = IndexManifest::from_json(r#"{"source": {"type": "a", "url": "b"}}"#).unwrap_err();
        assert!(matches!(err, ZapError::Manifest(_)));
    }

    #[test]
    fn test_manifest_without_source_url() {
        let err = IndexManifest::from_json(r#"{"owner": "o", "source": {"type": "a"}}"#).unwrap_err();
        assert!(matches!(err, ZapError::Manifest(msg) if msg.contains("url")));
    }

    #[test]
    fn test_manifest_with_broken_release() {
        let body = r#"{"owner": "o", "source": {"type": "a", "url": "b"}, "0": {"tag": "v1"}}"#;
        assert!(matches!(IndexManifest::from_json(body), Err(ZapError::Manifest(_))));
    }

    #[test]
    fn test_manifest_without_releases_is_empty() {
        let body = r#"{"owner": "o", "source": {"type": "a", "url": "b"}}"#;
        assert!(IndexManifest::from_json(body).unwrap().releases.is_empty());
    }

    #[test]
    fn test_github_release_deserializes() {
        let body = r#"[{"tag_name": "v1", "assets": [{"name": "a.AppImage", "browser_download_url": "https://x/a", "size": 2500000}]}]"#;
        let releases: Vec<GitHubRelease> = serde_json::from_str(body).unwrap();
        assert_eq!(releases[0].assets[0].size, 2_500_000);
        assert!(!releases[0].prerelease);
    }
}
