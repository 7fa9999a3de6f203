//! # Zap Core Library
//!
//! This crate contains the core logic of `zap`, a user-level package manager
//! for AppImages. It installs, updates and removes bundles without root
//! privileges, keeping one JSON record per installed app.
//!
//! The `zap` CLI is built on top of it, but the lifecycle operations can be
//! driven from other tools through a [`Context`].
//!
//! ## Modules Overview
//! - [`installer`] – Install, update, upgrade, remove and list (the lifecycle engine)
//! - [`resolver`] – Choosing a bundle from a URL, GitHub releases or the index mirror
//! - [`registry`] – GitHub and index mirror metadata over HTTP
//! - [`fetch`] – Downloading or copying bundles into the local store
//! - [`integrate`] – Icon and desktop entry extraction and menu registration
//! - [`update_info`] – Embedded update information and delta updates
//! - [`shims`] – The launchable symlinks in the binary directory
//! - [`record`] – The persisted per-app records
//! - [`prompt`] – Interactive and silent decision making
//! - [`daemon`] – Background upgrades and the systemd unit
//! - [`global`] – Platform directories and configuration
//! - [`util`] – Shared helpers

pub mod context;
pub mod daemon;
pub mod error;
pub mod fetch;
pub mod global;
pub mod installer;
pub mod integrate;
pub mod prompt;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod shims;
pub mod update_info;
pub mod util;

pub use context::Context;
pub use error::{Result, ZapError};
pub use global::config::{Config, IntegrationPolicy};
pub use installer::{
    install, list, remove, update, upgrade, InstallOptions, InstallOutcome, RemoveOutcome, UpdateOptions,
    UpdateOutcome,
};
pub use record::{AppRecord, Source, SourceKind};
