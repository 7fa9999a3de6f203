use std::io::Write;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use crate::error::Result;

/// How the bundle of an installed app was resolved.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[serde(rename = "direct-url")]
    DirectUrl,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "zap-index")]
    ZapIndex,
    /// Records written without (or with an unrecognised) source.
    #[default]
    #[serde(other, rename = "unknown")]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceMeta {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub crawled_on: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    pub identifier: SourceKind,
    #[serde(default)]
    pub meta: SourceMeta,
}

impl Source {
    pub fn new(identifier: SourceKind, slug: &str, url: &str) -> Source {
        Source {
            identifier,
            meta: SourceMeta {
                slug: slug.to_string(),
                url: url.to_string(),
                crawled_on: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// The persisted description of one installed bundle.
///
/// The record file existing is what makes an app "installed".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub filepath: PathBuf,
    pub executable: String,
    #[serde(default, with = "optional_path")]
    pub icon_path: Option<PathBuf>,
    #[serde(default, with = "optional_path")]
    pub icon_path_hicolor: Option<PathBuf>,
    #[serde(default, with = "optional_path")]
    pub desktop_file: Option<PathBuf>,
    #[serde(default)]
    pub source: Source,
}

impl AppRecord {
    /// Reads the record at `path`. A missing file means "not installed".
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<AppRecord>> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!("Unmarshalling JSON from {}", path.display());
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Writes the record through a temporary file in the same directory, so
    /// a crash never leaves a truncated record behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Wrote JSON index to {}", path.display());
        Ok(())
    }
}

/// Lists the record files in the index directory, sorted by name.
pub fn list_record_files<P: AsRef<Path>>(index_store: P) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(index_store.as_ref()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Older records store absent paths as empty strings.
mod optional_path {
    use std::path::PathBuf;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(path) => serializer.serialize_str(&path.to_string_lossy()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value.filter(|s| !s.is_empty()).map(PathBuf::from))
    }
}
