use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// More output: -v for debug, -vv for trace
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    pub(crate) command: ZapCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ZapCommand {
    /// Installs an AppImage
    Install {
        /// Name of the app in the index mirror. Optional with --github
        name: Option<String>,
        /// Name of the symlink in the binary directory. Defaults to the app name
        #[clap(long)]
        executable: Option<String>,
        /// Direct URL or file:// path, or owner/repo with --github
        #[clap(long)]
        from: Option<String>,
        /// Install from the releases of a GitHub repository
        #[clap(long)]
        github: bool,
        /// Offer assets built for other architectures too
        #[clap(long)]
        no_filter: bool,
        /// Never prompt, take the latest release
        #[clap(long)]
        silent: bool,
        /// Replace the app if it is already installed
        #[clap(long)]
        update: bool,
    },
    /// Updates an AppImage
    Update {
        name: String,
        #[clap(long)]
        executable: Option<String>,
        /// Use the update information embedded in the AppImage
        #[clap(long)]
        with_au: bool,
        /// Remove the app before installing the new version
        #[clap(long)]
        force_remove: bool,
        #[clap(long)]
        silent: bool,
    },
    /// Removes an AppImage
    Remove {
        name: String,
    },
    /// Updates all installed AppImages
    Upgrade {
        #[clap(long)]
        silent: bool,
    },
    /// Lists the installed AppImages
    List {
        /// Print the index file of each app
        #[clap(long)]
        index: bool,
        #[clap(long)]
        no_color: bool,
    },
    /// Searches the index mirror
    Search,
    /// Writes the configuration file interactively
    Init,
    /// Runs the background updater
    Daemon {
        /// Install and enable the systemd user service instead
        #[clap(long)]
        install: bool,
    },
    /// Updates zap itself
    SelfUpdate {
        #[clap(long)]
        silent: bool,
    },
}
