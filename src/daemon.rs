use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, error, info};
use crate::context::Context;
use crate::error::{Result, ZapError};
use crate::global::config::Config;
use crate::global::utils::get_systemd_user_dir;
use crate::installer::upgrade;
use crate::util::run_command;

pub const SERVICE_NAME: &str = "zapd.service";
const ONLINE_CHECK_URL: &str = "https://icanhazip.com/";
const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);
const ONLINE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the next connectivity check.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// SIGINT or SIGTERM. Streams are registered once so a signal received
/// during an upgrade pass is seen at the next wait.
#[cfg(unix)]
struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}

#[cfg(unix)]
impl Shutdown {
    fn new() -> Result<Shutdown> {
        Ok(Shutdown {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => debug!("Received SIGINT"),
            _ = self.terminate.recv() => debug!("Received SIGTERM"),
        }
    }
}

/// Ctrl-C only.
#[cfg(not(unix))]
struct Shutdown;

#[cfg(not(unix))]
impl Shutdown {
    fn new() -> Result<Shutdown> {
        Ok(Shutdown)
    }

    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        debug!("Received Ctrl-C");
    }
}

/// Runs the upgrade loop until interrupted: wait for connectivity, upgrade
/// every app silently, sleep an hour.
pub fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run_loop(config))
}

async fn run_loop(config: Config) -> Result<()> {
    let mut shutdown = Shutdown::new()?;
    let client = reqwest::Client::builder()
        .connect_timeout(ONLINE_CHECK_TIMEOUT)
        .timeout(ONLINE_CHECK_TIMEOUT)
        .build()?;

    let mut pass = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = wait_until_online(&client) => {}
        }

        pass += 1;
        info!("zapd: Checking for updates [{pass}]");
        let pass_config = config.clone();
        let result = tokio::task::spawn_blocking(move || {
            let ctx = Context::new(pass_config, true)?;
            upgrade(&ctx, true)
        })
        .await;
        match result {
            Ok(Ok(apps)) if apps.is_empty() => info!("All apps up-to-date"),
            Ok(Ok(apps)) => info!("Apps have been updated: {}", apps.join(", ")),
            Ok(Err(e)) => error!("Upgrade failed: {e}"),
            Err(e) => error!("Upgrade task did not complete: {e}"),
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(CHECK_INTERVAL) => {}
        }
    }
    info!("zapd: shutting down");
    Ok(())
}

async fn wait_until_online(client: &reqwest::Client) {
    let mut backoff = INITIAL_BACKOFF;
    while client.get(ONLINE_CHECK_URL).send().await.is_err() {
        info!("Not connected to internet, retrying in {} seconds", backoff.as_secs());
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

pub fn service_unit(executable: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=Zap Updater daemon\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={} daemon\n\
         RestartSec=3\n\
         Restart=always\n\
         Environment=LAUNCHED_BY_SYSTEMD=1\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        executable.display()
    )
}

/// Writes the user unit for the running binary and enables it.
pub fn install_service() -> Result<PathBuf> {
    let systemctl = which::which("systemctl").map_err(|_| ZapError::MissingTool("systemctl".to_string()))?;
    let dir = get_systemd_user_dir()?;
    std::fs::create_dir_all(&dir)?;
    let unit = dir.join(SERVICE_NAME);

    let executable = std::env::current_exe()?;
    debug!("Writing {} for {}", unit.display(), executable.display());
    std::fs::write(&unit, service_unit(&executable))?;

    run_command(Command::new(&systemctl).args(["--user", "daemon-reload"]))?;
    run_command(Command::new(&systemctl).args(["--user", "enable", "--now", SERVICE_NAME]))?;
    Ok(unit)
}
