use std::path::Path;
use colored::Colorize;
use tracing::{debug, warn};
use crate::context::Context;
use crate::error::{Result, ZapError};
use crate::fetch::{fetch, AssetDescriptor};
use crate::global::config::{Config, IntegrationPolicy};
use crate::integrate::{integrate, Integration, MenuRegistrar};
use crate::record::{list_record_files, AppRecord, SourceKind};
use crate::resolver::{resolve, Resolution};
use crate::shims::{remove_managed_link, replace_link, BinLink};
use crate::update_info::has_embedded_update_info;
use crate::util::{is_on_path, make_executable, remove_if_exists};

/// What to install and how to choose it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// App name, looked up in the index mirror when `from` is empty.
    pub name: String,
    /// Identifier the app is tracked and linked under.
    pub executable: String,
    /// Direct URL, `file://` path, or GitHub repository with `from_github`.
    pub from: String,
    pub from_github: bool,
    pub silent: bool,
    /// Offer every asset instead of only those matching this architecture.
    pub no_filter: bool,
    /// Replace an existing installation instead of reporting it.
    pub update_inplace: bool,
}

impl InstallOptions {
    pub fn validate(&self) -> Result<()> {
        validate_executable(self.executable.trim())?;
        if self.from_github && self.from.is_empty() {
            return Err(ZapError::InvalidOptions("installing from GitHub requires a repository".to_string()));
        }
        if !self.from_github && self.from.is_empty() && self.name.is_empty() {
            return Err(ZapError::InvalidOptions("nothing to install".to_string()));
        }
        Ok(())
    }
}

/// Checks that `executable` can name a record and a file in the bin dir.
pub fn validate_executable(executable: &str) -> Result<()> {
    if executable.is_empty() {
        return Err(ZapError::InvalidOptions("an executable name is required".to_string()));
    }
    if executable.contains('/') || executable == "." || executable == ".." {
        return Err(ZapError::InvalidOptions(format!("'{executable}' is not a valid executable name")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub executable: String,
    /// Use the update information embedded in the bundle when present.
    pub with_delta: bool,
    /// Remove the app and install it again instead of replacing in place.
    pub force_remove: bool,
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(AppRecord),
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(AppRecord),
    UpToDate,
    NotInstalled,
    /// Nothing to update from, and silence forbids asking.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotInstalled,
}

/// Installs an app, or replaces it when `update_inplace` is set.
///
/// Preconditions (menu tool, binary slot not taken by a foreign file) are
/// checked before anything is downloaded. When replacing, the new bundle is
/// fetched into a temporary file and only renamed into place once complete.
/// The new record and bin link are written before anything of the previous
/// installation is deleted, so the app stays launchable throughout and a
/// failure leaves the previous installation as it was.
pub fn install(ctx: &Context, options: &InstallOptions) -> Result<InstallOutcome> {
    options.validate()?;
    let config = &ctx.config;
    let executable = options.executable.trim();

    let index_file = config.index_file(executable);
    debug!("Checking if {} exists", index_file.display());
    let previous = AppRecord::load(&index_file)?;
    if previous.is_some() && !options.update_inplace {
        println!("{} is already installed", executable.yellow());
        return Ok(InstallOutcome::AlreadyInstalled);
    }

    if config.integrate != IntegrationPolicy::No {
        ctx.menu.ensure_available()?;
    }
    config.ensure_dirs()?;
    let bin_link = config.bin_link(executable);
    let bin_state = BinLink::classify(&bin_link, &config.local_store)?;
    debug!("{} is {bin_state:?}", bin_link.display());
    bin_state.ensure_replaceable(&bin_link)?;

    let Resolution { asset, source } = resolve(config, ctx.releases.as_ref(), ctx.prompter.as_ref(), options)?;
    if !options.silent {
        println!("Downloading {} of size {}.", asset.name.green(), asset.size.yellow());
        if !ctx.prompter.confirm("Proceed?")? {
            return Err(ZapError::UserCancelled);
        }
    }

    let target = std::path::absolute(config.local_store.join(asset.file_name()?))?;
    debug!("Target file path {}", target.display());
    match &previous {
        Some(_) => fetch_over(&asset, &target, executable)?,
        None => fetch(&asset, &target, executable)?,
    }

    let integration = match integrate(&target, executable, config, ctx.prompter.as_ref(), ctx.menu.as_ref()) {
        Ok(integration) => integration,
        Err(e) => {
            discard_bundle(previous.as_ref(), &target);
            return Err(e);
        }
    };
    let record = AppRecord {
        filepath: target,
        executable: executable.to_string(),
        icon_path: None,
        icon_path_hicolor: None,
        desktop_file: None,
        source,
    }
    .with_integration(integration);
    if let Err(e) = commit(&record, &index_file, &bin_state, &bin_link) {
        roll_back(ctx.menu.as_ref(), previous.as_ref(), &record, &index_file);
        return Err(e);
    }

    if let Some(old) = &previous {
        remove_integration(ctx.menu.as_ref(), old, &integration_of(&record))?;
        remove_bundle(old, Some(&record.filepath))?;
    }
    warn_if_not_on_path(config, executable);

    debug!("Completed all tasks");
    println!("{} installed successfully", executable.green());
    Ok(InstallOutcome::Installed(record))
}

/// Persists `record` and points the bin link at its bundle.
fn commit(record: &AppRecord, index_file: &Path, bin_state: &BinLink, bin_link: &Path) -> Result<()> {
    record.save(index_file)?;
    replace_link(bin_state, &record.filepath, bin_link)
}

/// Undoes a failed [`commit`]. The previous record is written back, and the
/// new bundle and the artifacts it does not share with `previous` are
/// deleted. Errors here are only logged.
fn roll_back(menu: &dyn MenuRegistrar, previous: Option<&AppRecord>, record: &AppRecord, index_file: &Path) {
    let restored = match previous {
        Some(old) => old.save(index_file),
        None => remove_if_exists(index_file).map(|_| ()),
    };
    if let Err(e) = restored {
        warn!("Could not restore {}: {e}", index_file.display());
    }
    let keep = previous.map(integration_of).unwrap_or_default();
    if let Err(e) = remove_integration(menu, record, &keep) {
        warn!("Could not remove the integration of {}: {e}", record.executable);
    }
    discard_bundle(previous, &record.filepath);
}

/// Deletes a freshly fetched bundle, unless it was written over the
/// previous one.
fn discard_bundle(previous: Option<&AppRecord>, bundle: &Path) {
    if previous.is_some_and(|old| old.filepath == bundle) {
        return;
    }
    debug!("Discarding {}", bundle.display());
    if let Err(e) = remove_if_exists(bundle) {
        warn!("Could not remove {}: {e}", bundle.display());
    }
}

/// Downloads next to `target` and renames the result over it.
fn fetch_over(asset: &AssetDescriptor, target: &Path, label: &str) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".zap-")
        .suffix(".part")
        .tempfile_in(dir)?
        .into_temp_path();
    fetch(asset, &staging, label)?;
    staging.persist(target).map_err(|e| e.error)?;
    make_executable(target)?;
    debug!("Replaced {}", target.display());
    Ok(())
}

fn warn_if_not_on_path(config: &Config, executable: &str) {
    if !is_on_path(&config.bin_dir, std::env::var_os("PATH").as_deref()) {
        warn!(
            "The app {executable} is installed in '{}' which is not on PATH. Consider adding this directory to PATH",
            config.bin_dir.display()
        );
    }
}

/// Updates one installed app.
///
/// Bundles with embedded update information use the delta updater when
/// `with_delta` is set. Otherwise the app is installed again from the source
/// it was originally installed from.
pub fn update(ctx: &Context, options: &UpdateOptions) -> Result<UpdateOutcome> {
    validate_executable(&options.executable)?;
    debug!("Bootstrapping updater for {}", options.executable);
    let index_file = ctx.config.index_file(&options.executable);
    let Some(record) = AppRecord::load(&index_file)? else {
        println!("{} is not installed", options.executable.yellow());
        return Ok(UpdateOutcome::NotInstalled);
    };

    if options.with_delta && has_embedded_update_info(&record.filepath)? {
        return delta_update(ctx, record, &index_file);
    }
    debug!("{} has no usable update information", record.executable);

    let mut install_options = match record.source.identifier {
        SourceKind::GitHub => {
            debug!("Fallback to GitHub releases of {}", record.source.meta.slug);
            InstallOptions {
                name: record.executable.clone(),
                from: record.source.meta.slug.clone(),
                from_github: true,
                ..InstallOptions::default()
            }
        }
        SourceKind::ZapIndex => {
            debug!("Fallback to the index mirror");
            let name = if record.source.meta.slug.is_empty() {
                record.executable.clone()
            } else {
                record.source.meta.slug.clone()
            };
            InstallOptions { name, ..InstallOptions::default() }
        }
        SourceKind::DirectUrl | SourceKind::Unknown => {
            if options.silent {
                warn!("{} has no update information. Skipping", record.executable);
                return Ok(UpdateOutcome::Skipped);
            }
            return Err(ZapError::NoUpdateInformation(record.executable));
        }
    };
    install_options.executable = record.executable.clone();
    install_options.silent = options.silent;

    if options.force_remove {
        remove(ctx, &record.executable)?;
    } else {
        install_options.update_inplace = true;
    }
    match install(ctx, &install_options)? {
        InstallOutcome::Installed(record) => Ok(UpdateOutcome::Updated(record)),
        InstallOutcome::AlreadyInstalled => Ok(UpdateOutcome::UpToDate),
    }
}

fn delta_update(ctx: &Context, record: AppRecord, index_file: &Path) -> Result<UpdateOutcome> {
    let config = &ctx.config;
    debug!("Checking for updates of {}", record.filepath.display());
    if !ctx.updater.lookup(&record.filepath)? {
        return Ok(UpdateOutcome::UpToDate);
    }
    if config.integrate != IntegrationPolicy::No {
        ctx.menu.ensure_available()?;
    }

    debug!("Downloading updates for {}", record.executable);
    let new_path = std::path::absolute(ctx.updater.download(&record.filepath)?)?;
    let integration = match integrate(&new_path, &record.executable, config, ctx.prompter.as_ref(), ctx.menu.as_ref()) {
        Ok(integration) => integration,
        Err(e) => {
            discard_bundle(Some(&record), &new_path);
            return Err(e);
        }
    };
    let updated = AppRecord {
        filepath: new_path,
        ..record.clone()
    }
    .with_integration(integration);
    debug!("Writing to {}", index_file.display());
    updated.save(index_file)?;

    let moved = updated.filepath != record.filepath;
    if moved {
        let bin_link = config.bin_link(&record.executable);
        let state = BinLink::classify(&bin_link, &config.local_store)?;
        match replace_link(&state, &updated.filepath, &bin_link) {
            Ok(()) => {}
            Err(ZapError::BinaryConflict { path, target }) => {
                warn!("Not relinking {}, it points to {}", path.display(), target.display());
            }
            Err(e) => return Err(e),
        }
    }
    remove_integration(ctx.menu.as_ref(), &record, &integration_of(&updated))?;
    if moved {
        remove_if_exists(&record.filepath)?;
    }
    Ok(UpdateOutcome::Updated(updated))
}

/// Updates every installed app, returning the ones that changed.
///
/// A failure for one app is reported and the loop moves on; only a
/// cancellation by the user stops it.
pub fn upgrade(ctx: &Context, silent: bool) -> Result<Vec<String>> {
    let mut updated = Vec::new();
    for app in list(&ctx.config, false)? {
        let tag = format!("[{app}]");
        println!("{}{} Checking for updates", "[update]".blue(), tag.yellow());
        let options = UpdateOptions {
            executable: app.clone(),
            with_delta: true,
            force_remove: false,
            silent,
        };
        match update(ctx, &options) {
            Ok(UpdateOutcome::Updated(_)) => {
                println!("{}{} Updated.", "[update]".blue(), tag.green());
                updated.push(app);
            }
            Ok(UpdateOutcome::UpToDate) => println!("{}{} AppImage is up to date.", "[update]".blue(), tag.green()),
            Ok(UpdateOutcome::Skipped) => println!("{}{} Skipped.", "[update]".blue(), tag.yellow()),
            Ok(UpdateOutcome::NotInstalled) => {}
            Err(ZapError::UserCancelled) => return Err(ZapError::UserCancelled),
            Err(e) => println!("{}{} failed to update, {}", "[update]".blue(), tag.red(), e.to_string().yellow()),
        }
    }
    println!("Done.");
    Ok(updated)
}

/// Removes an app and every artifact its record points to. The record file
/// goes last.
pub fn remove(ctx: &Context, executable: &str) -> Result<RemoveOutcome> {
    validate_executable(executable)?;
    let config = &ctx.config;
    let index_file = config.index_file(executable);
    debug!("Checking if {} exists", index_file.display());
    let Some(record) = AppRecord::load(&index_file)? else {
        println!("{} is not installed", executable.yellow());
        return Ok(RemoveOutcome::NotInstalled);
    };
    if record.desktop_file.is_some() {
        ctx.menu.ensure_available()?;
    }

    remove_integration(ctx.menu.as_ref(), &record, &Integration::default())?;
    remove_managed_link(&config.bin_link(executable), &config.local_store)?;
    remove_bundle(&record, None)?;

    debug!("Removing index file, {}", index_file.display());
    remove_if_exists(&index_file)?;
    println!("{} removed successfully", record.executable.green());
    Ok(RemoveOutcome::Removed)
}

/// Unregisters and deletes the desktop entry, then the icon and its theme
/// link. Paths that `keep` still uses are left alone.
fn remove_integration(menu: &dyn MenuRegistrar, record: &AppRecord, keep: &Integration) -> Result<()> {
    if let Some(desktop) = record.desktop_file.as_ref().filter(|d| keep.desktop_file.as_ref() != Some(*d)) {
        debug!("Removing desktop file, {}", desktop.display());
        if let Err(e) = menu.uninstall(desktop) {
            warn!("Could not unregister {}: {e}", desktop.display());
        }
        remove_if_exists(desktop)?;
    }
    let kept = [&keep.icon_path, &keep.icon_path_hicolor];
    for icon in [&record.icon_path_hicolor, &record.icon_path].into_iter().flatten() {
        if kept.iter().any(|k| k.as_ref() == Some(icon)) {
            continue;
        }
        debug!("Removing icon, {}", icon.display());
        remove_if_exists(icon)?;
    }
    Ok(())
}

fn integration_of(record: &AppRecord) -> Integration {
    Integration {
        icon_path: record.icon_path.clone(),
        icon_path_hicolor: record.icon_path_hicolor.clone(),
        desktop_file: record.desktop_file.clone(),
    }
}

/// Deletes the bundle unless it is `keep`.
fn remove_bundle(record: &AppRecord, keep: Option<&Path>) -> Result<()> {
    if keep.is_some_and(|keep| keep == record.filepath) {
        debug!("Keeping {}, it was replaced in place", record.filepath.display());
        return Ok(());
    }
    debug!("Removing appimage, {}", record.filepath.display());
    remove_if_exists(&record.filepath)?;
    Ok(())
}

/// Installed apps: record file paths in `index_mode`, identifiers otherwise.
pub fn list(config: &Config, index_mode: bool) -> Result<Vec<String>> {
    Ok(list_record_files(&config.index_store)?
        .into_iter()
        .filter_map(|path| {
            if index_mode {
                Some(path.display().to_string())
            } else {
                path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
            }
        })
        .collect())
}

impl AppRecord {
    fn with_integration(mut self, integration: Integration) -> AppRecord {
        self.icon_path = integration.icon_path;
        self.icon_path_hicolor = integration.icon_path_hicolor;
        self.desktop_file = integration.desktop_file;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(executable: &str) -> InstallOptions {
        InstallOptions {
            name: executable.to_string(),
            executable: executable.to_string(),
            ..InstallOptions::default()
        }
    }

    #[test]
    fn test_validate_options() {
        assert!(options("foo").validate().is_ok());
        assert!(matches!(options("").validate(), Err(ZapError::InvalidOptions(_))));
        assert!(matches!(options("../foo").validate(), Err(ZapError::InvalidOptions(_))));

        let mut github = options("foo");
        github.from_github = true;
        assert!(matches!(github.validate(), Err(ZapError::InvalidOptions(_))));
        github.from = "owner/foo".to_string();
        assert!(github.validate().is_ok());
    }

    #[test]
    fn test_validate_executable() {
        assert!(validate_executable("foo-bar.baz").is_ok());
        for name in ["", ".", "..", "a/b", "/foo"] {
            assert!(matches!(validate_executable(name), Err(ZapError::InvalidOptions(_))), "{name}");
        }
    }

    struct NoMenu;

    impl MenuRegistrar for NoMenu {
        fn ensure_available(&self) -> Result<()> {
            Ok(())
        }

        fn install(&self, _desktop_file: &Path) -> Result<()> {
            Ok(())
        }

        fn uninstall(&self, _desktop_file: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_remove_integration_keeps_shared_paths() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("zap-foo.svg");
        let desktop = dir.path().join("zap-foo.desktop");
        std::fs::write(&icon, "").unwrap();
        std::fs::write(&desktop, "").unwrap();
        let record = AppRecord {
            filepath: dir.path().join("foo.AppImage"),
            executable: "foo".to_string(),
            icon_path: Some(icon.clone()),
            icon_path_hicolor: None,
            desktop_file: Some(desktop.clone()),
            source: Default::default(),
        };
        let keep = Integration {
            icon_path: Some(icon.clone()),
            ..Integration::default()
        };

        remove_integration(&NoMenu, &record, &keep).unwrap();
        assert!(icon.exists());
        assert!(!desktop.exists());
        remove_integration(&NoMenu, &record, &Integration::default()).unwrap();
        assert!(!icon.exists());
    }

    #[test]
    fn test_remove_bundle_keeps_replaced_file() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("foo.AppImage");
        std::fs::write(&bundle, "").unwrap();
        let record = AppRecord {
            filepath: bundle.clone(),
            executable: "foo".to_string(),
            icon_path: None,
            icon_path_hicolor: None,
            desktop_file: None,
            source: Default::default(),
        };

        remove_bundle(&record, Some(&bundle)).unwrap();
        assert!(bundle.exists());
        remove_bundle(&record, Some(&dir.path().join("foo-2.AppImage"))).unwrap();
        assert!(!bundle.exists());
    }
}
