use tracing::debug;
use crate::error::{Result, ZapError};
use crate::fetch::AssetDescriptor;
use crate::global::config::Config;
use crate::installer::InstallOptions;
use crate::prompt::{choose, Prompter};
use crate::record::{Source, SourceKind};
use crate::registry::ReleaseSource;
use crate::util::{current_arch_aliases, format_size_mb, has_arch};

const UNKNOWN_SIZE: &str = "(unknown)";

/// The asset to download and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub asset: AssetDescriptor,
    pub source: Source,
}

/// Decides which bundle `options` refers to.
///
/// An explicit `from` locator is used as is. With `from_github` the locator
/// is a repository whose releases are listed; otherwise the app name is
/// looked up in the curated index mirror.
pub fn resolve(
    config: &Config,
    releases: &dyn ReleaseSource,
    prompter: &dyn Prompter,
    options: &InstallOptions,
) -> Result<Resolution> {
    if options.from_github {
        resolve_github(releases, prompter, options)
    } else if !options.from.is_empty() {
        debug!("Using {} as a direct download", options.from);
        Ok(Resolution {
            asset: AssetDescriptor {
                name: options.executable.clone(),
                download: options.from.clone(),
                size: UNKNOWN_SIZE.to_string(),
            },
            source: Source::new(SourceKind::DirectUrl, &options.from, &options.from),
        })
    } else {
        resolve_index(config, releases, prompter, options)
    }
}

fn resolve_github(
    releases: &dyn ReleaseSource,
    prompter: &dyn Prompter,
    options: &InstallOptions,
) -> Result<Resolution> {
    let (owner, repo) = parse_slug(&options.from)?;
    let releases = releases.github_releases(&owner, &repo)?;

    let tags: Vec<String> = releases.iter().map(|r| r.tag_name.clone()).collect();
    let chosen = choose(prompter, options.silent, "release", &tags, 0)?;
    let release = &releases[chosen];
    debug!("Selected release {}", release.tag_name);

    let assets = release
        .assets
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().ends_with(".appimage"))
        .map(|a| AssetDescriptor {
            name: a.name.clone(),
            download: a.browser_download_url.clone(),
            size: format_size_mb(a.size),
        })
        .collect();
    let asset = select_asset(prompter, options, assets)?;

    Ok(Resolution {
        asset,
        source: Source::new(
            SourceKind::GitHub,
            &format!("{owner}/{repo}"),
            &format!("https://github.com/{owner}/{repo}"),
        ),
    })
}

fn resolve_index(
    config: &Config,
    releases: &dyn ReleaseSource,
    prompter: &dyn Prompter,
    options: &InstallOptions,
) -> Result<Resolution> {
    let manifest = releases.index_manifest(&config.manifest_url(&options.name))?;

    let tags = manifest.tags();
    let chosen = choose(prompter, options.silent, "release", &tags, 0)?;
    let release = manifest
        .releases
        .values()
        .nth(chosen)
        .ok_or(ZapError::NoReleaseFound)?;
    debug!("Selected release {}", release.tag);

    let assets = release.assets.values().cloned().collect();
    let asset = select_asset(prompter, options, assets)?;

    Ok(Resolution {
        asset,
        source: Source::new(SourceKind::ZapIndex, &options.name, &manifest.source_url),
    })
}

fn select_asset(
    prompter: &dyn Prompter,
    options: &InstallOptions,
    assets: Vec<AssetDescriptor>,
) -> Result<AssetDescriptor> {
    let candidates = if options.no_filter {
        debug!("Explicitly not filtering");
        assets
    } else {
        filter_assets(assets)
    };
    let names: Vec<String> = candidates.iter().map(|a| a.name.clone()).collect();
    let chosen = choose(prompter, options.silent, "asset", &names, 0)?;
    candidates.into_iter().nth(chosen).ok_or(ZapError::NoReleaseFound)
}

/// Keeps the assets built for the running architecture. If none match, the
/// input is returned untouched.
pub fn filter_assets(assets: Vec<AssetDescriptor>) -> Vec<AssetDescriptor> {
    filter_assets_for(assets, current_arch_aliases())
}

pub fn filter_assets_for(assets: Vec<AssetDescriptor>, aliases: &[&str]) -> Vec<AssetDescriptor> {
    let filtered: Vec<AssetDescriptor> = assets
        .iter()
        .filter(|a| has_arch(&a.name, aliases))
        .cloned()
        .collect();
    if filtered.is_empty() {
        debug!("No asset matches {aliases:?}, keeping all {} candidates", assets.len());
        assets
    } else {
        filtered
    }
}

/// Splits `owner/repo` (or a repository URL) into its two parts.
pub fn parse_slug(from: &str) -> Result<(String, String)> {
    let trimmed = from.trim().trim_end_matches('/').trim_end_matches(".git");
    let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [.., owner, repo] if !owner.ends_with(':') => Ok((owner.to_string(), repo.to_string())),
        _ => Err(ZapError::InvalidSlug(from.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;
    use crate::global::utils::GlobalDirs;
    use crate::prompt::SilentPrompter;
    use crate::registry::{GitHubAsset, GitHubRelease, IndexManifest, IndexRelease};

    struct FakeSource {
        github: Vec<GitHubRelease>,
        manifest: Option<IndexManifest>,
    }

    impl ReleaseSource for FakeSource {
        fn github_releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>> {
            assert_eq!((owner, repo), ("owner", "app"));
            Ok(self.github.clone())
        }
        fn index_manifest(&self, url: &str) -> Result<IndexManifest> {
            assert!(url.contains("/app/"));
            self.manifest.clone().ok_or(ZapError::NoReleaseFound)
        }
    }

    fn config() -> Config {
        let root = Path::new("/tmp/zap-resolver");
        Config::from_dirs(&GlobalDirs {
            home_dir: root.to_path_buf(),
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        })
    }

    fn asset(name: &str) -> AssetDescriptor {
        AssetDescriptor {
            name: name.to_string(),
            download: format!("https://example.com/{name}"),
            size: "1 MB".to_string(),
        }
    }

    fn options(from: &str, github: bool) -> InstallOptions {
        InstallOptions {
            name: "app".to_string(),
            executable: "app".to_string(),
            from: from.to_string(),
            from_github: github,
            silent: true,
            ..InstallOptions::default()
        }
    }

    fn gh_release(tag: &str, names: &[&str]) -> GitHubRelease {
        GitHubRelease {
            tag_name: tag.to_string(),
            prerelease: false,
            assets: names
                .iter()
                .map(|n| GitHubAsset {
                    name: n.to_string(),
                    browser_download_url: format!("https://github.com/dl/{n}"),
                    size: 42_000_000,
                })
                .collect(),
        }
    }

    #[test]
    fn test_direct_url_needs_no_network() {
        let source = FakeSource { github: vec![], manifest: None };
        let res = resolve(&config(), &source, &SilentPrompter, &options("https://example.com/foo.AppImage", false)).unwrap();
        assert_eq!(res.asset.download, "https://example.com/foo.AppImage");
        assert_eq!(res.asset.size, "(unknown)");
        assert_eq!(res.source.identifier, SourceKind::DirectUrl);
        assert_eq!(res.source.meta.slug, "https://example.com/foo.AppImage");
    }

    #[test]
    fn test_github_single_release_and_matching_asset() {
        let names = ["app-x86_64.AppImage", "app-aarch64.AppImage", "app.tar.gz"];
        let source = FakeSource { github: vec![gh_release("v1", &names)], manifest: None };
        let mut opts = options("owner/app", true);
        opts.no_filter = false;

        let res = resolve(&config(), &source, &SilentPrompter, &opts);
        let aliases = current_arch_aliases();
        if has_arch("app-x86_64.AppImage", aliases) || has_arch("app-aarch64.AppImage", aliases) {
            let res = res.unwrap();
            assert!(has_arch(&res.asset.name, aliases));
            assert_eq!(res.asset.size, "42 MB");
            assert_eq!(res.source.identifier, SourceKind::GitHub);
            assert_eq!(res.source.meta.slug, "owner/app");
        } else {
            // neither asset matches this platform: two candidates remain
            assert!(matches!(res, Err(ZapError::SilenceRequested)));
        }
    }

    #[test]
    fn test_github_many_releases_silent() {
        let source = FakeSource {
            github: vec![gh_release("v2", &["a.AppImage"]), gh_release("v1", &["a.AppImage"])],
            manifest: None,
        };
        let err = resolve(&config(), &source, &SilentPrompter, &options("owner/app", true)).unwrap_err();
        assert!(matches!(err, ZapError::SilenceRequested));
    }

    #[test]
    fn test_github_without_releases() {
        let source = FakeSource { github: vec![], manifest: None };
        let err = resolve(&config(), &source, &SilentPrompter, &options("https://github.com/owner/app", true)).unwrap_err();
        assert!(matches!(err, ZapError::NoReleaseFound));
    }

    #[test]
    fn test_index_resolution_records_source() {
        let mut assets = BTreeMap::new();
        assets.insert("0".to_string(), asset("app-1.0.AppImage"));
        let mut releases = BTreeMap::new();
        releases.insert(0, IndexRelease {
            prerelease: false,
            tag: "v1.0".to_string(),
            published_at: "2021-01-01".to_string(),
            assets,
        });
        let manifest = IndexManifest {
            owner: "someone".to_string(),
            source_type: "github".to_string(),
            source_url: "https://github.com/someone/app".to_string(),
            releases,
        };
        let source = FakeSource { github: vec![], manifest: Some(manifest) };

        let res = resolve(&config(), &source, &SilentPrompter, &options("", false)).unwrap();
        assert_eq!(res.asset.name, "app-1.0.AppImage");
        assert_eq!(res.source.identifier, SourceKind::ZapIndex);
        assert_eq!(res.source.meta.slug, "app");
        assert_eq!(res.source.meta.url, "https://github.com/someone/app");
    }

    #[test]
    fn test_filter_never_empties_candidates() {
        let assets = vec![asset("tool-riscv64.AppImage"), asset("tool-s390x.AppImage")];
        let kept = filter_assets_for(assets.clone(), &["x86_64", "amd64"]);
        assert_eq!(kept, assets);
    }

    #[test]
    fn test_filter_keeps_matching() {
        let assets = vec![asset("tool-x86_64.AppImage"), asset("tool-aarch64.AppImage")];
        let kept = filter_assets_for(assets, &["aarch64", "arm64"]);
        assert_eq!(kept, vec![asset("tool-aarch64.AppImage")]);
    }

    #[test]
    fn test_parse_slug() {
        assert_eq!(parse_slug("owner/app").unwrap(), ("owner".to_string(), "app".to_string()));
        assert_eq!(parse_slug("https://github.com/owner/app/").unwrap(), ("owner".to_string(), "app".to_string()));
        assert!(matches!(parse_slug("app"), Err(ZapError::InvalidSlug(_))));
        assert!(matches!(parse_slug("https://app"), Err(ZapError::InvalidSlug(_))));
    }
}
