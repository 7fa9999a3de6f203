use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use object::read::ReadCache;
use object::{Object, ObjectSection};
use tracing::debug;
use crate::error::{Result, ZapError};
use crate::util::run_command;

/// ELF section AppImages keep their update information in.
pub const UPDATE_INFO_SECTION: &str = ".upd_info";
const APPIMAGEUPDATETOOL: &str = "appimageupdatetool";

/// Reports whether the bundle at `path` embeds a non-empty update
/// information string.
///
/// A missing section means "no". A file that is not a valid ELF object is an
/// error.
pub fn has_embedded_update_info(path: &Path) -> Result<bool> {
    let cache = ReadCache::new(File::open(path)?);
    let elf = object::File::parse(&cache)?;
    let Some(section) = elf.section_by_name(UPDATE_INFO_SECTION) else {
        debug!("{} has no {UPDATE_INFO_SECTION} section", path.display());
        return Ok(false);
    };
    let data = section.data()?;
    Ok(data.iter().position(|&b| b == 0).is_some_and(|end| end > 0))
}

/// Delta updates driven by the bundle's embedded update information.
pub trait DeltaUpdater {
    /// Whether a newer version is available.
    fn lookup(&self, bundle: &Path) -> Result<bool>;
    /// Fetches the newer version and returns where it was written.
    fn download(&self, bundle: &Path) -> Result<PathBuf>;
}

/// Delegates to `appimageupdatetool`.
#[derive(Debug, Default)]
pub struct AppImageUpdateTool;

impl AppImageUpdateTool {
    fn tool() -> Result<PathBuf> {
        which::which(APPIMAGEUPDATETOOL).map_err(|_| ZapError::MissingTool(APPIMAGEUPDATETOOL.to_string()))
    }
}

impl DeltaUpdater for AppImageUpdateTool {
    fn lookup(&self, bundle: &Path) -> Result<bool> {
        let status = Command::new(Self::tool()?)
            .arg("--check-for-update")
            .arg(bundle)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        match status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(ZapError::CommandFailed {
                command: format!("{APPIMAGEUPDATETOOL} --check-for-update {}", bundle.display()),
                status: status.to_string(),
            }),
        }
    }

    fn download(&self, bundle: &Path) -> Result<PathBuf> {
        run_command(Command::new(Self::tool()?).arg("--overwrite").arg(bundle))?;
        Ok(bundle.to_path_buf())
    }
}
