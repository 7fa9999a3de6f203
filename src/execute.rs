use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, FuzzySelect, Input, Select};
use semver::Version;
use zap::fetch::{fetch, AssetDescriptor};
use zap::global::utils::get_global_config_path;
use zap::registry::{build_http_client, HttpReleaseSource};
use zap::resolver::parse_slug;
use zap::{daemon, Config, Context, InstallOptions, IntegrationPolicy, UpdateOptions, UpdateOutcome, ZapError};
use crate::cli::{ZapCommand, CLI};

const UPDATE_URL_PREFIX: &str = "https://github.com/srevinsaju/zap/releases/download/continuous";

pub fn execute(cli: CLI) -> Result<()> {
    match cli.command {
        ZapCommand::Install { name, executable, from, github, no_filter, silent, update } => {
            execute_install(name, executable, from, github, no_filter, silent, update)
        }
        ZapCommand::Update { name, executable, with_au, force_remove, silent } => {
            execute_update(name, executable, with_au, force_remove, silent)
        }
        ZapCommand::Remove { name } => {
            execute_remove(&name)
        }
        ZapCommand::Upgrade { silent } => {
            execute_upgrade(silent)
        }
        ZapCommand::List { index, no_color } => {
            execute_list(index, no_color)
        }
        ZapCommand::Search => {
            execute_search()
        }
        ZapCommand::Init => {
            execute_init()
        }
        ZapCommand::Daemon { install } => {
            execute_daemon(install)
        }
        ZapCommand::SelfUpdate { silent } => {
            execute_self_update(silent)
        }
    }
}

fn load_config() -> Result<Config> {
    let path = get_global_config_path()?;
    Ok(Config::load(path)?)
}

pub fn execute_install(
    name: Option<String>,
    executable: Option<String>,
    from: Option<String>,
    github: bool,
    no_filter: bool,
    silent: bool,
    update_inplace: bool,
) -> Result<()> {
    let from = from.unwrap_or_default();
    if github && from.is_empty() {
        bail!("--github needs the repository as --from owner/repo");
    }
    let name = match name {
        Some(name) => name,
        None if github => parse_slug(&from)?.1,
        None => bail!("appname is not provided"),
    };
    let options = InstallOptions {
        executable: executable.unwrap_or_else(|| name.clone()),
        name,
        from,
        from_github: github,
        silent,
        no_filter,
        update_inplace,
    };

    let ctx = Context::new(load_config()?, silent)?;
    zap::install(&ctx, &options)?;
    Ok(())
}

pub fn execute_update(
    name: String,
    executable: Option<String>,
    with_au: bool,
    force_remove: bool,
    silent: bool,
) -> Result<()> {
    let options = UpdateOptions {
        executable: executable.unwrap_or(name),
        with_delta: with_au,
        force_remove,
        silent,
    };
    let ctx = Context::new(load_config()?, silent)?;
    match zap::update(&ctx, &options)? {
        UpdateOutcome::Updated(record) => {
            println!("AppImage saved as {}", record.filepath.display().to_string().green());
            println!("Done.");
        }
        UpdateOutcome::UpToDate => println!("{} already up to date.", "[update]".blue()),
        UpdateOutcome::Skipped | UpdateOutcome::NotInstalled => {}
    }
    Ok(())
}

pub fn execute_remove(name: &str) -> Result<()> {
    let ctx = Context::new(load_config()?, false)?;
    zap::remove(&ctx, name)?;
    Ok(())
}

pub fn execute_upgrade(silent: bool) -> Result<()> {
    let ctx = Context::new(load_config()?, silent)?;
    zap::upgrade(&ctx, silent)?;
    Ok(())
}

pub fn execute_list(index: bool, no_color: bool) -> Result<()> {
    let config = load_config()?;
    for app in zap::list(&config, index)? {
        if no_color {
            println!("{app}");
        } else {
            println!("- {}", app.yellow());
        }
    }
    Ok(())
}

pub fn execute_search() -> Result<()> {
    let config = load_config()?;
    let apps = HttpReleaseSource::new()?.catalog(&config.mirror_root)?;
    if apps.is_empty() {
        bail!("the index at {} lists no apps", config.mirror_root);
    }
    let names: Vec<&str> = apps.iter().map(|app| app.name.as_str()).collect();
    let chosen = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Search")
        .items(&names)
        .default(0)
        .interact_opt()?
        .ok_or(ZapError::UserCancelled)?;

    let app = &apps[chosen];
    println!("{} by {}", app.name.green(), app.maintainer.yellow());
    println!("{}", app.summary);
    println!();
    println!("Install it by");
    println!("{}", format!("zap install {}", app.name.to_lowercase()).green());
    Ok(())
}

pub fn execute_init() -> Result<()> {
    let path = get_global_config_path()?;
    let mut config = Config::load(&path)?;
    let theme = ColorfulTheme::default();

    let auto_update = Confirm::with_theme(&theme)
        .with_prompt("Do you want to enable auto-update?")
        .default(false)
        .interact()?;
    if auto_update {
        let unit = daemon::install_service()?;
        println!("Installed {}", unit.display());
    }

    config.custom_icon_theme = Confirm::with_theme(&theme)
        .with_prompt("Do you use custom icon themes?")
        .default(config.custom_icon_theme)
        .interact()?;

    std::fs::create_dir_all(&config.local_store)?;
    let store: String = Input::with_theme(&theme)
        .with_prompt("Path to store AppImages")
        .default(config.local_store.display().to_string())
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if Path::new(input).is_dir() {
                Ok(())
            } else {
                Err("directory does not exist, or no sufficient permission to open directory")
            }
        })
        .interact_text()?;
    let local_store = PathBuf::from(store);
    if local_store != config.local_store {
        config.icon_store = local_store.join("icons");
        config.index_store = local_store.join("index");
        config.application_store = local_store.join("applications");
        config.local_store = local_store;
    }

    let policies = [IntegrationPolicy::Ask, IntegrationPolicy::Yes, IntegrationPolicy::No];
    let current = policies.iter().position(|p| *p == config.integrate).unwrap_or(0);
    let chosen = Select::with_theme(&theme)
        .with_prompt("Add installed AppImages to the desktop menu?")
        .items(&["ask every time", "always", "never"])
        .default(current)
        .interact()?;
    config.integrate = policies[chosen];

    config.save(&path)?;
    println!("Configuration written to {}", path.display().to_string().green());
    Ok(())
}

pub fn execute_daemon(install: bool) -> Result<()> {
    if install {
        let unit = daemon::install_service()?;
        println!("Installed and started {}", unit.display());
        return Ok(());
    }
    daemon::run(load_config()?)?;
    Ok(())
}

/// Architecture suffix of the published zap binaries.
fn release_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

pub fn execute_self_update(silent: bool) -> Result<()> {
    let exe = std::env::current_exe()?;
    let client = build_http_client(Some(Duration::from_secs(60)))?;
    let metadata = client
        .get(format!("{UPDATE_URL_PREFIX}/zap-release-metadata"))
        .send()?
        .error_for_status()?
        .text()?;
    let latest_text = metadata.trim();
    let latest = Version::parse(latest_text.trim_start_matches('v'))
        .map_err(|e| anyhow!("unexpected release metadata '{latest_text}': {e}"))?;
    let current = Version::parse(env!("CARGO_PKG_VERSION"))?;
    if latest <= current {
        println!("{}", "You are already up-to-date!".green());
        return Ok(());
    }
    println!("Updates found {} -> {}", current.to_string().yellow(), latest.to_string().green());

    if !silent {
        println!("Downloading latest version of zap");
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Proceed?")
            .default(false)
            .interact()?;
        if !proceed {
            return Err(ZapError::UserCancelled.into());
        }
    }

    let file_name = exe
        .file_name()
        .ok_or_else(|| anyhow!("could not determine the name of {}", exe.display()))?;
    let staging = exe.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    let asset = AssetDescriptor {
        name: "zap".to_string(),
        download: format!("{UPDATE_URL_PREFIX}/zap-{}", release_arch()),
        size: "(unknown)".to_string(),
    };
    fetch(&asset, &staging, "zap")?;
    std::fs::rename(&staging, &exe)?;
    println!("zap updated to {}", latest.to_string().green());
    Ok(())
}
