use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use crate::error::{Result, ZapError};
use crate::registry::build_http_client;
use crate::util::{copy_file, locator_file_name, make_executable, remove_if_exists};

const FILE_SCHEME: &str = "file://";
const DOWNLOAD_TIMEOUT_SECS: u64 = 30 * 60;

/// A single downloadable bundle, as chosen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// Display name.
    pub name: String,
    /// `http(s)://` URL or `file://` path.
    pub download: String,
    /// Human readable size, `(unknown)` when not known.
    pub size: String,
}

impl AssetDescriptor {
    /// File name the bundle is stored under, taken from the locator.
    pub fn file_name(&self) -> Result<String> {
        locator_file_name(&self.download)
            .map(str::to_string)
            .ok_or_else(|| ZapError::InvalidOptions(format!("cannot derive a file name from '{}'", self.download)))
    }
}

/// Retrieves `asset` into `destination` and marks it executable.
///
/// On failure any partially written destination is removed, so the caller
/// sees either a complete file or none.
pub fn fetch(asset: &AssetDescriptor, destination: &Path, label: &str) -> Result<()> {
    let result = if let Some(source) = asset.download.strip_prefix(FILE_SCHEME) {
        debug!("file:// protocol detected, copying {source}");
        copy_file(Path::new(source), destination).map(|_| ())
    } else {
        download(&asset.download, destination, label)
    };

    if let Err(e) = result.and_then(|_| make_executable(destination)) {
        if let Err(cleanup) = remove_if_exists(destination) {
            debug!("Could not remove partial download {}: {cleanup}", destination.display());
        }
        return Err(e);
    }
    debug!("Fetched {} -> {}", asset.download, destination.display());
    Ok(())
}

fn download(url: &str, destination: &Path, label: &str) -> Result<()> {
    debug!("Connecting to {url}");
    let client = build_http_client(Some(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)))?;
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ZapError::AssetUnavailable { url: url.to_string(), status: status.as_u16() });
    }

    let bar = match response.content_length() {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:20.green}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(format!("Downloading {label}"));

    let mut writer = BufWriter::new(File::create(destination)?);
    std::io::copy(&mut bar.wrap_read(response), &mut writer)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    bar.finish_and_clear();
    Ok(())
}
