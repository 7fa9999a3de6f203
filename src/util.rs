use std::path::Path;
use std::process::Command;
use tracing::debug;
use crate::error::{Result, ZapError};

/// Substrings that identify an asset built for the given architecture
/// (as reported by `std::env::consts::ARCH`).
pub fn arch_aliases(arch: &str) -> &'static [&'static str] {
    match arch {
        "x86_64" => &["x86_64", "amd64", "x86-64"],
        "x86" => &["i386", "i686"],
        "arm" => &["armhf", "armv7", "arm"],
        "aarch64" => &["aarch64", "arm64"],
        _ => &[],
    }
}

/// Aliases of the architecture this binary was built for.
pub fn current_arch_aliases() -> &'static [&'static str] {
    arch_aliases(std::env::consts::ARCH)
}

/// Checks whether `name` mentions one of the given architecture aliases.
pub fn has_arch(name: &str, aliases: &[&str]) -> bool {
    let name = name.to_ascii_lowercase();
    aliases.iter().any(|alias| name.contains(alias))
}

/// Copies a regular file byte-for-byte.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let meta = std::fs::metadata(src)?;
    if !meta.is_file() {
        return Err(ZapError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", src.display()),
        )));
    }
    Ok(std::fs::copy(src, dst)?)
}

/// Sets the `0755` permission bits.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Removes a file or symlink, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Checks whether `dir` is one of the entries of the `PATH`-style list.
pub fn is_on_path(dir: &Path, path_var: Option<&std::ffi::OsStr>) -> bool {
    let Some(path_var) = path_var else {
        return false;
    };
    std::env::split_paths(path_var).any(|entry| entry == dir)
}

/// Runs `command` to completion, failing on a non-zero exit status.
pub fn run_command(command: &mut Command) -> Result<()> {
    let described = format!("{command:?}");
    debug!("Running {described}");
    let output = command.output()?;
    if output.status.success() {
        return Ok(());
    }
    debug!("{described} wrote: {}", String::from_utf8_lossy(&output.stderr));
    Err(ZapError::CommandFailed {
        command: described,
        status: output.status.to_string(),
    })
}

/// Formats a byte count the way asset sizes are shown to the user.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{} MB", bytes / 1_000_000)
}

/// Returns the final path segment of a URL or `file://` locator.
pub fn locator_file_name(locator: &str) -> Option<&str> {
    let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
