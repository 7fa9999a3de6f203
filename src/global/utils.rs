use std::path::PathBuf;
use directories::BaseDirs;
use crate::error::{Result, ZapError};

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV: &str = "ZAP_CONFIG";

/// Platform directories zap derives its defaults from.
#[derive(Debug, Clone)]
pub struct GlobalDirs {
    pub home_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

pub fn get_global_dirs() -> Result<GlobalDirs> {
    let base = BaseDirs::new()
        .ok_or_else(|| ZapError::Config("could not determine the home directory".to_string()))?;

    Ok(GlobalDirs {
        home_dir: base.home_dir().to_path_buf(),
        config_dir: base.config_dir().to_path_buf(),
        data_dir: base.data_dir().to_path_buf(),
    })
}

/// Returns the configuration file path: `$ZAP_CONFIG`, or
/// `<config dir>/zap/v2/config.ini`.
pub fn get_global_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let dirs = get_global_dirs()?;
    Ok(dirs.config_dir.join("zap").join("v2").join("config.ini"))
}

/// Directory for per-user systemd units.
pub fn get_systemd_user_dir() -> Result<PathBuf> {
    let dirs = get_global_dirs()?;
    Ok(dirs.config_dir.join("systemd").join("user"))
}
