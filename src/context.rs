use crate::error::Result;
use crate::global::config::Config;
use crate::integrate::{MenuRegistrar, XdgDesktopMenu};
use crate::prompt::{Prompter, SilentPrompter, TerminalPrompter};
use crate::registry::{HttpReleaseSource, ReleaseSource};
use crate::update_info::{AppImageUpdateTool, DeltaUpdater};

/// Everything a lifecycle operation needs besides its options: the
/// configuration and the external collaborators.
pub struct Context {
    pub config: Config,
    pub prompter: Box<dyn Prompter>,
    pub releases: Box<dyn ReleaseSource>,
    pub menu: Box<dyn MenuRegistrar>,
    pub updater: Box<dyn DeltaUpdater>,
}

impl Context {
    /// Wires up the real collaborators. A silent context never prompts.
    pub fn new(config: Config, silent: bool) -> Result<Context> {
        let prompter: Box<dyn Prompter> = if silent {
            Box::new(SilentPrompter)
        } else {
            Box::new(TerminalPrompter)
        };
        Ok(Context {
            config,
            prompter,
            releases: Box::new(HttpReleaseSource::new()?),
            menu: Box::new(XdgDesktopMenu),
            updater: Box::new(AppImageUpdateTool),
        })
    }
}
