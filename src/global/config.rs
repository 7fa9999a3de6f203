use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use ini::Ini;
use tracing::{debug, warn};
use crate::error::{Result, ZapError};
use crate::global::utils::{get_global_dirs, GlobalDirs};

pub const CONFIG_VERSION: u32 = 2;
const SECTION: &str = "Zap";
const DEFAULT_MIRROR: &str = "https://g.srev.in/get-appimage/%s/core.json";
const DEFAULT_MIRROR_ROOT: &str = "https://g.srev.in/get-appimage";

/// Whether zap should create desktop menu entries for installed bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationPolicy {
    Yes,
    No,
    #[default]
    Ask,
}

impl FromStr for IntegrationPolicy {
    type Err = ZapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Ok(IntegrationPolicy::Yes),
            "no" | "false" => Ok(IntegrationPolicy::No),
            "ask" | "" => Ok(IntegrationPolicy::Ask),
            other => Err(ZapError::Config(format!(
                "Integrate must be one of yes, no or ask, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for IntegrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrationPolicy::Yes => "yes",
            IntegrationPolicy::No => "no",
            IntegrationPolicy::Ask => "ask",
        };
        f.write_str(s)
    }
}

/// Runtime configuration and the on-disk layout of the local store.
///
/// Constructed once at startup and handed to every component through
/// [`crate::context::Context`].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub version: u32,
    /// Per-app manifest URL, `%s` is replaced with the app name.
    pub mirror: String,
    pub mirror_root: String,
    /// Where bundles are stored.
    pub local_store: PathBuf,
    /// Managed copies of extracted icons.
    pub icon_store: PathBuf,
    /// One `<executable>.json` record per installed app.
    pub index_store: PathBuf,
    /// Private location of rewritten desktop entries.
    pub application_store: PathBuf,
    /// Directory receiving the launchable symlinks.
    pub bin_dir: PathBuf,
    /// Root of the hicolor icon theme the icon symlinks go into.
    pub icon_theme_dir: PathBuf,
    pub custom_icon_theme: bool,
    pub integrate: IntegrationPolicy,
}

impl Config {
    /// Builds the default layout below the given platform directories.
    pub fn from_dirs(dirs: &GlobalDirs) -> Config {
        let local_store = dirs.data_dir.join("zap").join("v2");
        Config {
            version: CONFIG_VERSION,
            mirror: DEFAULT_MIRROR.to_string(),
            mirror_root: DEFAULT_MIRROR_ROOT.to_string(),
            icon_store: local_store.join("icons"),
            index_store: local_store.join("index"),
            application_store: local_store.join("applications"),
            local_store,
            bin_dir: dirs.home_dir.join(".local").join("bin"),
            icon_theme_dir: dirs.data_dir.join("icons").join("hicolor"),
            custom_icon_theme: false,
            integrate: IntegrationPolicy::default(),
        }
    }

    pub fn defaults() -> Result<Config> {
        Ok(Config::from_dirs(&get_global_dirs()?))
    }

    /// Loads the configuration file, falling back to the defaults if it
    /// does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let defaults = Config::defaults()?;
        if !path.exists() {
            debug!("No configuration found at {}. Fall back to defaults", path.display());
            return Ok(defaults);
        }
        debug!("Loading configuration from {}", path.display());
        let ini = Ini::load_from_file(path)?;
        Config::from_ini(&ini, defaults)
    }

    /// Applies the keys present in `ini` on top of `defaults`.
    pub fn from_ini(ini: &Ini, defaults: Config) -> Result<Config> {
        let Some(section) = ini.section(Some(SECTION)) else {
            warn!("Configuration has no [{SECTION}] section, using defaults");
            return Ok(defaults);
        };
        let path_of = |key: &str| section.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let version = match section.get("Version") {
            Some(v) => v.trim().parse::<u32>()
                .map_err(|_| ZapError::Config(format!("Version must be a number, got '{v}'")))?,
            None => defaults.version,
        };
        if version != CONFIG_VERSION {
            warn!("Configuration version {version} differs from the supported version {CONFIG_VERSION}");
        }

        let local_store = path_of("LocalStore");
        let derived = |name: &str, fallback: &PathBuf| match &local_store {
            Some(store) => store.join(name),
            None => fallback.clone(),
        };

        Ok(Config {
            version,
            mirror: section.get("Mirror").filter(|v| !v.is_empty()).map(str::to_string)
                .unwrap_or(defaults.mirror),
            mirror_root: section.get("MirrorRoot").filter(|v| !v.is_empty()).map(str::to_string)
                .unwrap_or(defaults.mirror_root),
            icon_store: path_of("IconStore").unwrap_or_else(|| derived("icons", &defaults.icon_store)),
            index_store: path_of("IndexStore").unwrap_or_else(|| derived("index", &defaults.index_store)),
            application_store: path_of("ApplicationStore")
                .unwrap_or_else(|| derived("applications", &defaults.application_store)),
            local_store: local_store.unwrap_or(defaults.local_store),
            bin_dir: path_of("BinDir").unwrap_or(defaults.bin_dir),
            icon_theme_dir: path_of("IconThemeStore").unwrap_or(defaults.icon_theme_dir),
            custom_icon_theme: match section.get("CustomIconTheme") {
                Some(v) => parse_bool(v)?,
                None => defaults.custom_icon_theme,
            },
            integrate: match section.get("Integrate") {
                Some(v) => v.parse()?,
                None => defaults.integrate,
            },
        })
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(SECTION))
            .set("Version", self.version.to_string())
            .set("Mirror", self.mirror.as_str())
            .set("MirrorRoot", self.mirror_root.as_str())
            .set("LocalStore", self.local_store.to_string_lossy())
            .set("IconStore", self.icon_store.to_string_lossy())
            .set("IndexStore", self.index_store.to_string_lossy())
            .set("ApplicationStore", self.application_store.to_string_lossy())
            .set("BinDir", self.bin_dir.to_string_lossy())
            .set("IconThemeStore", self.icon_theme_dir.to_string_lossy())
            .set("CustomIconTheme", self.custom_icon_theme.to_string())
            .set("Integrate", self.integrate.to_string());
        ini
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Writing configuration to {}", path.display());
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    /// Creates every store directory the lifecycle operations write into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.local_store,
            &self.icon_store,
            &self.index_store,
            &self.application_store,
            &self.bin_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Path of the JSON record for `executable`.
    pub fn index_file(&self, executable: &str) -> PathBuf {
        self.index_store.join(format!("{executable}.json"))
    }

    /// Path of the launchable symlink for `executable`.
    pub fn bin_link(&self, executable: &str) -> PathBuf {
        self.bin_dir.join(executable)
    }

    pub fn manifest_url(&self, name: &str) -> String {
        self.mirror.replace("%s", name)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ZapError::Config(format!("expected a boolean, got '{other}'"))),
    }
}
