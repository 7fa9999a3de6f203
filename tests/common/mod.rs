#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use zap::global::utils::GlobalDirs;
use zap::integrate::MenuRegistrar;
use zap::prompt::Prompter;
use zap::registry::{GitHubAsset, GitHubRelease, IndexManifest, ReleaseSource};
use zap::update_info::DeltaUpdater;
use zap::{Config, Context, IntegrationPolicy, Result, ZapError};

/// A throwaway home directory with its own zap layout.
pub struct Sandbox {
    pub dir: TempDir,
    pub config: Config,
}

impl Sandbox {
    pub fn new() -> Sandbox {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("home");
        let mut config = Config::from_dirs(&GlobalDirs {
            home_dir: root.clone(),
            config_dir: root.join(".config"),
            data_dir: root.join(".local/share"),
        });
        config.integrate = IntegrationPolicy::No;
        Sandbox { dir, config }
    }

    /// Writes a file outside the zap layout, to be installed from.
    pub fn fixture(&self, name: &str, content: &[u8]) -> PathBuf {
        let dir = self.dir.path().join("fixtures");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn context(&self, fakes: &Fakes) -> Context {
        Context {
            config: self.config.clone(),
            prompter: Box::new(fakes.prompter.clone()),
            releases: Box::new(fakes.releases.clone()),
            menu: Box::new(fakes.menu.clone()),
            updater: Box::new(fakes.updater.clone()),
        }
    }
}

/// A bundle whose extraction always fails, so nothing gets integrated.
pub const PLAIN_BUNDLE: &[u8] = b"#!/bin/sh\nexit 1\n";

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[derive(Default)]
pub struct Fakes {
    pub prompter: FakePrompter,
    pub releases: FakeReleases,
    pub menu: FakeMenu,
    pub updater: FakeUpdater,
}

/// Takes the default choice and answers every question with yes, unless
/// told to decline or to cancel.
#[derive(Clone, Default)]
pub struct FakePrompter {
    pub decline: Rc<Cell<bool>>,
    pub cancel: Rc<Cell<bool>>,
    pub asked: Rc<RefCell<Vec<String>>>,
}

impl Prompter for FakePrompter {
    fn select(&self, message: &str, items: &[String], default: usize) -> Result<usize> {
        self.asked.borrow_mut().push(message.to_string());
        if self.cancel.get() {
            return Err(ZapError::UserCancelled);
        }
        Ok(default.min(items.len() - 1))
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        self.asked.borrow_mut().push(message.to_string());
        if self.cancel.get() {
            return Err(ZapError::UserCancelled);
        }
        Ok(!self.decline.get())
    }
}

#[derive(Clone, Default)]
pub struct FakeReleases {
    pub github: Rc<RefCell<Vec<GitHubRelease>>>,
    pub manifest: Rc<RefCell<Option<String>>>,
}

impl FakeReleases {
    /// Publishes a release with a single asset, making it the latest.
    pub fn publish(&self, tag: &str, asset_name: &str, bundle: &Path) {
        self.github.borrow_mut().insert(0, GitHubRelease {
            tag_name: tag.to_string(),
            prerelease: false,
            assets: vec![GitHubAsset {
                name: asset_name.to_string(),
                browser_download_url: file_url(bundle),
                size: 2 * 1024 * 1024,
            }],
        });
    }
}

impl ReleaseSource for FakeReleases {
    fn github_releases(&self, _owner: &str, _repo: &str) -> Result<Vec<GitHubRelease>> {
        Ok(self.github.borrow().clone())
    }

    fn index_manifest(&self, _url: &str) -> Result<IndexManifest> {
        match self.manifest.borrow().as_deref() {
            Some(body) => IndexManifest::from_json(body),
            None => Err(ZapError::NoReleaseFound),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeMenu {
    pub installed: Rc<RefCell<Vec<PathBuf>>>,
    pub uninstalled: Rc<RefCell<Vec<PathBuf>>>,
}

impl MenuRegistrar for FakeMenu {
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn install(&self, desktop_file: &Path) -> Result<()> {
        self.installed.borrow_mut().push(desktop_file.to_path_buf());
        Ok(())
    }

    fn uninstall(&self, desktop_file: &Path) -> Result<()> {
        self.uninstalled.borrow_mut().push(desktop_file.to_path_buf());
        Ok(())
    }
}

/// Reports an update for the bundles whose file name is listed, and
/// "downloads" it by writing `payload` over the bundle, or next to it under
/// `rename_to` when that is set.
#[derive(Clone, Default)]
pub struct FakeUpdater {
    pub outdated: Rc<RefCell<HashSet<String>>>,
    pub payload: Rc<RefCell<Vec<u8>>>,
    pub rename_to: Rc<RefCell<Option<String>>>,
}

impl DeltaUpdater for FakeUpdater {
    fn lookup(&self, bundle: &Path) -> Result<bool> {
        let name = bundle.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self.outdated.borrow().contains(&name))
    }

    fn download(&self, bundle: &Path) -> Result<PathBuf> {
        let target = match self.rename_to.borrow().as_deref() {
            Some(name) => bundle.with_file_name(name),
            None => bundle.to_path_buf(),
        };
        std::fs::write(&target, self.payload.borrow().as_slice())?;
        Ok(target)
    }
}
