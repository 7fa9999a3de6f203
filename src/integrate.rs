use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use tracing::{debug, warn};
use walkdir::WalkDir;
use crate::error::{Result, ZapError};
use crate::global::config::{Config, IntegrationPolicy};
use crate::prompt::Prompter;
use crate::shims::create_symlink;
use crate::util::{remove_if_exists, run_command};

const SQUASHFS_ROOT: &str = "squashfs-root";
const DIR_ICON: &str = ".DirIcon";
const DESKTOP_PATTERN: &str = "*.desktop";
const DESKTOP_SECTION: &str = "Desktop Entry";
const MAX_LINK_DEPTH: usize = 8;
const XDG_DESKTOP_MENU: &str = "xdg-desktop-menu";

/// Registers desktop entries with the desktop environment.
pub trait MenuRegistrar {
    /// Fails with [`ZapError::MissingTool`] if registration is impossible.
    fn ensure_available(&self) -> Result<()>;
    fn install(&self, desktop_file: &Path) -> Result<()>;
    fn uninstall(&self, desktop_file: &Path) -> Result<()>;
}

/// Uses `xdg-desktop-menu` from xdg-utils.
#[derive(Debug, Default)]
pub struct XdgDesktopMenu;

impl MenuRegistrar for XdgDesktopMenu {
    fn ensure_available(&self) -> Result<()> {
        which::which(XDG_DESKTOP_MENU)
            .map(|path| debug!("Found {}", path.display()))
            .map_err(|_| ZapError::MissingTool(XDG_DESKTOP_MENU.to_string()))
    }

    fn install(&self, desktop_file: &Path) -> Result<()> {
        run_command(Command::new(XDG_DESKTOP_MENU).args(["install", "--novendor"]).arg(desktop_file))
    }

    fn uninstall(&self, desktop_file: &Path) -> Result<()> {
        run_command(Command::new(XDG_DESKTOP_MENU).args(["uninstall", "--novendor"]).arg(desktop_file))
    }
}

/// Artifacts created for an installed bundle. Each is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Integration {
    pub icon_path: Option<PathBuf>,
    pub icon_path_hicolor: Option<PathBuf>,
    pub desktop_file: Option<PathBuf>,
}

/// Extracts the icon and desktop entry of `bundle` and registers them.
///
/// A bundle without an icon or desktop entry is not an error. Icon problems
/// and unreadable desktop entries are only logged. A desktop entry the menu
/// tool refuses is deleted again. If the desktop step fails anyway, for
/// instance because the user cancelled, the installed icon is removed.
pub fn integrate(
    bundle: &Path,
    executable: &str,
    config: &Config,
    prompter: &dyn Prompter,
    menu: &dyn MenuRegistrar,
) -> Result<Integration> {
    let mut integration = Integration::default();

    match install_icon(bundle, executable, config) {
        Ok(Some((icon, hicolor))) => {
            integration.icon_path = Some(icon);
            integration.icon_path_hicolor = hicolor;
        }
        Ok(None) => debug!("{} ships no icon", bundle.display()),
        Err(e) => warn!("Could not install the icon of {executable}: {e}"),
    }

    match install_desktop_entry(bundle, executable, integration.icon_path.as_deref(), config, prompter, menu) {
        Ok(desktop_file) => integration.desktop_file = desktop_file,
        Err(e) => {
            for icon in [&integration.icon_path_hicolor, &integration.icon_path].into_iter().flatten() {
                if let Err(e) = remove_if_exists(icon) {
                    warn!("Could not remove {}: {e}", icon.display());
                }
            }
            return Err(e);
        }
    }
    Ok(integration)
}

/// Runs `<bundle> --appimage-extract <pattern>` inside `workdir`. A failure
/// to run counts as "nothing extracted".
fn extract(bundle: &Path, workdir: &Path, pattern: &str) -> bool {
    debug!("Trying to extract {pattern}");
    let status = Command::new(bundle)
        .arg("--appimage-extract")
        .arg(pattern)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            debug!("{} --appimage-extract {pattern} exited with {status}", bundle.display());
            false
        }
        Err(e) => {
            debug!("{} --appimage-extract {pattern} failed: {e}", bundle.display());
            false
        }
    }
}

/// Extracts `rel` and returns the extracted regular file, following
/// symlinks inside the bundle by extracting their targets in turn.
fn extract_resource(bundle: &Path, workdir: &Path, rel: &str, depth: usize) -> Option<PathBuf> {
    if depth > MAX_LINK_DEPTH {
        warn!("Too many levels of symbolic links while extracting {rel}");
        return None;
    }
    if !extract(bundle, workdir, rel) {
        return None;
    }
    let path = workdir.join(SQUASHFS_ROOT).join(rel);
    let meta = std::fs::symlink_metadata(&path).ok()?;
    if !meta.file_type().is_symlink() {
        return Some(path);
    }

    let target = std::fs::read_link(&path).ok()?;
    let next = link_target_in_bundle(rel, &target)?;
    debug!("{rel} is a symlink to {}, resolving it", target.display());
    extract_resource(bundle, workdir, &next, depth + 1)
}

/// Maps a symlink target found inside the bundle to a path relative to the
/// bundle root.
fn link_target_in_bundle(rel: &str, target: &Path) -> Option<String> {
    let text = target.to_string_lossy();
    if let Some((_, inner)) = text.rsplit_once("squashfs-root/") {
        return Some(inner.to_string());
    }
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        Path::new(rel).parent().unwrap_or(Path::new("")).join(target)
    };

    let mut parts: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop()?;
            }
            _ => {}
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Png { width: u32, height: u32 },
    Svg,
    Other(&'static str),
}

impl IconFormat {
    pub fn detect(data: &[u8]) -> IconFormat {
        let head = String::from_utf8_lossy(&data[..data.len().min(1024)]);
        if head.contains("<svg") {
            return IconFormat::Svg;
        }
        match infer::get(data) {
            Some(kind) if kind.mime_type() == "image/png" => match png_dimensions(data) {
                Some((width, height)) => IconFormat::Png { width, height },
                None => IconFormat::Other("png"),
            },
            Some(kind) => IconFormat::Other(kind.extension()),
            None => IconFormat::Other("png"),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            IconFormat::Png { .. } => "png",
            IconFormat::Svg => "svg",
            IconFormat::Other(ext) => *ext,
        }
    }

    /// Directory of the hicolor theme the icon belongs to.
    pub fn theme_bucket(&self) -> Option<String> {
        match self {
            IconFormat::Png { width, height } => Some(format!("{width}x{height}")),
            IconFormat::Svg => Some("scalable".to_string()),
            IconFormat::Other(_) => None,
        }
    }
}

/// Width and height from the IHDR chunk.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

fn install_icon(bundle: &Path, executable: &str, config: &Config) -> Result<Option<(PathBuf, Option<PathBuf>)>> {
    let workdir = tempfile::Builder::new().prefix("zap").tempdir()?;
    let Some(extracted) = extract_resource(bundle, workdir.path(), DIR_ICON, 0) else {
        return Ok(None);
    };
    let data = std::fs::read(&extracted)?;
    let format = IconFormat::detect(&data);
    debug!("Detected icon format {format:?}");

    let file_name = format!("zap-{executable}.{}", format.extension());
    std::fs::create_dir_all(&config.icon_store)?;
    let icon_path = config.icon_store.join(&file_name);
    std::fs::write(&icon_path, &data)?;
    debug!("Copied {DIR_ICON} -> {}", icon_path.display());

    let Some(bucket) = format.theme_bucket() else {
        debug!("Not linking {} into the icon theme", icon_path.display());
        return Ok(Some((icon_path, None)));
    };
    let theme_dir = config.icon_theme_dir.join(bucket).join("apps");
    std::fs::create_dir_all(&theme_dir)?;
    let hicolor = theme_dir.join(&file_name);
    remove_if_exists(&hicolor)?;
    create_symlink(&icon_path, &hicolor)?;
    debug!("Linked {} -> {}", hicolor.display(), icon_path.display());

    Ok(Some((icon_path, Some(hicolor))))
}

/// Values injected into a bundle's desktop entry.
#[derive(Debug, Clone)]
pub struct DesktopRewrite<'a> {
    pub executable: &'a str,
    /// Managed icon copy, if one was extracted.
    pub icon: Option<&'a Path>,
    pub bin_link: &'a Path,
    pub custom_icon_theme: bool,
}

/// Rewrites a desktop entry to launch the managed binary. Returns `None` if
/// the entry has no `[Desktop Entry]` section or opts out of integration.
pub fn rewrite_desktop_entry(source: &str, rewrite: &DesktopRewrite) -> Result<Option<String>> {
    let mut ini = Ini::load_from_str_opt(
        source,
        ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        },
    )
    .map_err(ini::Error::Parse)?;

    let Some(entry) = ini.section_mut(Some(DESKTOP_SECTION)) else {
        debug!("Desktop file has no [{DESKTOP_SECTION}] section");
        return Ok(None);
    };
    if entry.get("X-AppImage-Integrate").is_some_and(|v| v.trim().eq_ignore_ascii_case("false")) {
        debug!("Bundle asked not to be integrated");
        return Ok(None);
    }

    if let Some(icon) = rewrite.icon.filter(|_| !rewrite.custom_icon_theme) {
        entry.insert("Icon", icon.to_string_lossy());
    }
    entry.insert("X-Zap-Id", rewrite.executable);
    let name = entry.get("Name").unwrap_or(rewrite.executable).to_string();
    if !name.ends_with(" (AppImage)") {
        entry.insert("Name", format!("{name} (AppImage)"));
    }

    let bin = rewrite.bin_link.to_string_lossy();
    for (_, section) in ini.iter_mut() {
        if let Some(exec) = section.get("Exec") {
            let exec = match exec_arguments(exec) {
                Some(args) => format!("{bin} {args}"),
                None => bin.to_string(),
            };
            section.insert("Exec", exec);
        }
        if section.get("TryExec").is_some() {
            section.insert("TryExec", bin.to_string());
        }
    }

    let mut out = Vec::new();
    ini.write_to_opt(
        &mut out,
        WriteOption {
            escape_policy: EscapePolicy::Nothing,
            kv_separator: "=",
            ..Default::default()
        },
    )?;
    String::from_utf8(out)
        .map(Some)
        .map_err(|e| ZapError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Everything after the program in an `Exec` line.
fn exec_arguments(exec: &str) -> Option<&str> {
    let exec = exec.trim_start();
    let rest = match exec.strip_prefix('"') {
        Some(quoted) => quoted.split_once('"')?.1,
        None => exec.split_once(char::is_whitespace)?.1,
    };
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

fn find_desktop_file(bundle: &Path, workdir: &Path) -> Result<Option<PathBuf>> {
    if !extract(bundle, workdir, DESKTOP_PATTERN) {
        return Ok(None);
    }
    let root = workdir.join(SQUASHFS_ROOT);
    if !root.is_dir() {
        return Ok(None);
    }

    let found = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().ends_with(".desktop"));
    let Some(entry) = found else {
        debug!("Couldn't find a single desktop file");
        return Ok(None);
    };
    debug!("Found desktop file {}", entry.path().display());

    if entry.path_is_symlink() {
        let rel = entry.file_name().to_string_lossy().into_owned();
        return Ok(extract_resource(bundle, workdir, &rel, 0));
    }
    Ok(Some(entry.into_path()))
}

/// Extracts the desktop entry of `bundle` and rewrites it for the bin link.
fn read_desktop_entry(bundle: &Path, executable: &str, icon: Option<&Path>, config: &Config) -> Result<Option<String>> {
    let workdir = tempfile::Builder::new().prefix("zap").tempdir()?;
    let Some(extracted) = find_desktop_file(bundle, workdir.path())? else {
        return Ok(None);
    };
    let source = std::fs::read_to_string(&extracted)?;
    let bin_link = config.bin_link(executable);
    let rewrite = DesktopRewrite {
        executable,
        icon,
        bin_link: &bin_link,
        custom_icon_theme: config.custom_icon_theme,
    };
    rewrite_desktop_entry(&source, &rewrite)
}

fn install_desktop_entry(
    bundle: &Path,
    executable: &str,
    icon: Option<&Path>,
    config: &Config,
    prompter: &dyn Prompter,
    menu: &dyn MenuRegistrar,
) -> Result<Option<PathBuf>> {
    if config.integrate == IntegrationPolicy::No {
        debug!("Desktop integration is disabled");
        return Ok(None);
    }

    let rewritten = match read_desktop_entry(bundle, executable, icon, config) {
        Ok(Some(rewritten)) => rewritten,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("Could not read the desktop entry of {executable}: {e}");
            return Ok(None);
        }
    };

    if config.integrate == IntegrationPolicy::Ask
        && !prompter.confirm(&format!("Integrate {executable} with the desktop menu?"))?
    {
        debug!("User declined desktop integration");
        return Ok(None);
    }

    std::fs::create_dir_all(&config.application_store)?;
    let target = config.application_store.join(format!("zap-{executable}.desktop"));
    std::fs::write(&target, rewritten)?;
    debug!("Desktop file written to {}", target.display());

    if let Err(e) = menu.install(&target) {
        warn!("Could not register {} with the desktop menu: {e}", target.display());
        remove_if_exists(&target)?;
        return Ok(None);
    }
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "[Desktop Entry]\nType=Application\nName=Tool\nExec=tool %F\nTryExec=tool\nIcon=tool\n\n[Desktop Action New]\nName=New Window\nExec=tool --new-window\n";

    fn rewrite<'a>(icon: Option<&'a Path>, custom: bool) -> DesktopRewrite<'a> {
        DesktopRewrite {
            executable: "tool",
            icon,
            bin_link: Path::new("/home/u/.local/bin/tool"),
            custom_icon_theme: custom,
        }
    }

    #[test]
    fn test_rewrite_points_entry_at_bin_link() {
        let icon = PathBuf::from("/store/icons/zap-tool.png");
        let out = rewrite_desktop_entry(ENTRY, &rewrite(Some(&icon), false)).unwrap().unwrap();
        let ini = Ini::load_from_str(&out).unwrap();
        let entry = ini.section(Some(DESKTOP_SECTION)).unwrap();
        assert_eq!(entry.get("Exec"), Some("/home/u/.local/bin/tool %F"));
        assert_eq!(entry.get("TryExec"), Some("/home/u/.local/bin/tool"));
        assert_eq!(entry.get("Icon"), Some("/store/icons/zap-tool.png"));
        assert_eq!(entry.get("Name"), Some("Tool (AppImage)"));
        assert_eq!(entry.get("X-Zap-Id"), Some("tool"));

        let action = ini.section(Some("Desktop Action New")).unwrap();
        assert_eq!(action.get("Exec"), Some("/home/u/.local/bin/tool --new-window"));
        assert_eq!(action.get("Name"), Some("New Window"));
    }

    #[test]
    fn test_rewrite_keeps_icon_with_custom_theme() {
        let icon = PathBuf::from("/store/icons/zap-tool.png");
        let out = rewrite_desktop_entry(ENTRY, &rewrite(Some(&icon), true)).unwrap().unwrap();
        let ini = Ini::load_from_str(&out).unwrap();
        assert_eq!(ini.section(Some(DESKTOP_SECTION)).unwrap().get("Icon"), Some("tool"));
    }

    #[test]
    fn test_rewrite_keeps_icon_without_extracted_icon() {
        let out = rewrite_desktop_entry(ENTRY, &rewrite(None, false)).unwrap().unwrap();
        let ini = Ini::load_from_str(&out).unwrap();
        assert_eq!(ini.section(Some(DESKTOP_SECTION)).unwrap().get("Icon"), Some("tool"));
    }

    #[test]
    fn test_rewrite_respects_opt_out() {
        let entry = "[Desktop Entry]\nName=Tool\nExec=tool\nX-AppImage-Integrate=false\n";
        assert_eq!(rewrite_desktop_entry(entry, &rewrite(None, false)).unwrap(), None);
    }

    #[test]
    fn test_rewrite_without_desktop_section() {
        assert_eq!(rewrite_desktop_entry("[Other]\nA=b\n", &rewrite(None, false)).unwrap(), None);
    }

    #[test]
    fn test_rewrite_keeps_quotes_and_backslashes() {
        let entry = "[Desktop Entry]\nName=Tool\nExec=\"/opt/my tool/run\" --flag %f\nComment=Say \"hi\" to C:\\Temp\\n\n";
        let out = rewrite_desktop_entry(entry, &rewrite(None, false)).unwrap().unwrap();
        assert!(out.contains("Exec=/home/u/.local/bin/tool --flag %f\n"));
        assert!(out.contains("Comment=Say \"hi\" to C:\\Temp\\n\n"));
    }

    #[test]
    fn test_exec_arguments() {
        assert_eq!(exec_arguments("tool %U"), Some("%U"));
        assert_eq!(exec_arguments("\"/opt/my tool/run\" --flag %f"), Some("--flag %f"));
        assert_eq!(exec_arguments("tool"), None);
    }

    #[test]
    fn test_link_target_in_bundle() {
        assert_eq!(link_target_in_bundle(".DirIcon", Path::new("usr/share/icons/tool.png")).as_deref(), Some("usr/share/icons/tool.png"));
        assert_eq!(link_target_in_bundle("a/b.desktop", Path::new("../c/d.desktop")).as_deref(), Some("c/d.desktop"));
        assert_eq!(link_target_in_bundle("x", Path::new("/tmp/abc/squashfs-root/tool.svg")).as_deref(), Some("tool.svg"));
        assert_eq!(link_target_in_bundle("x", Path::new("/usr/share/tool.svg")).as_deref(), Some("usr/share/tool.svg"));
        assert_eq!(link_target_in_bundle("x", Path::new("../../escape")), None);
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    #[test]
    fn test_icon_format_detection() {
        let format = IconFormat::detect(&png(256, 128));
        assert_eq!(format, IconFormat::Png { width: 256, height: 128 });
        assert_eq!(format.theme_bucket().as_deref(), Some("256x128"));

        let svg = IconFormat::detect(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>");
        assert_eq!(svg, IconFormat::Svg);
        assert_eq!(svg.theme_bucket().as_deref(), Some("scalable"));
        assert_eq!(svg.extension(), "svg");

        let unknown = IconFormat::detect(b"not an image");
        assert_eq!(unknown.theme_bucket(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_extractor_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!extract(&dir.path().join("nope.AppImage"), dir.path(), DIR_ICON));
        assert_eq!(extract_resource(&dir.path().join("nope.AppImage"), dir.path(), DIR_ICON, 0), None);
    }
}
