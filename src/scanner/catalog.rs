//! Client for the external source catalog executable.
//!
//! The catalog is invoked as `<exe> -l <source>` to list a source and
//! `<exe> -g <file>` to resolve the files related to one item. Both print a
//! JSON document on stdout:
//!
//! ```json
//! { "version": "v1.0.0", "file_list": [ { "file_path": "...", ... } ] }
//! ```
//!
//! Older catalogs name the tag `api_version`. Only major version `v1` is
//! accepted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::models::{FileType, MediaDescriptor, SourceProperties};

pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(60);

const SUPPORTED_MAJOR: &str = "v1";

/// One configured source directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub properties: SourceProperties,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(alias = "api_version")]
    version: Option<String>,
    #[serde(default)]
    file_list: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    file_path: PathBuf,
    item_type: FileType,
    file_type: FileType,
    #[serde(default = "first_part")]
    part_num: u32,
    #[serde(default = "first_part")]
    part_count: u32,
    #[serde(default)]
    metadata_file: Option<PathBuf>,
}

fn first_part() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct CatalogErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    executable: PathBuf,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: DEFAULT_CATALOG_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// List every item of one source.
    pub async fn list(
        &self,
        source_index: usize,
        source: &SourceSpec,
    ) -> Result<Vec<MediaDescriptor>, CatalogError> {
        let response = self.invoke("-l", &source.path).await?;
        let items = into_descriptors(response, source_index, source);
        info!(source = ?source.path, count = items.len(), "Listed source");
        Ok(items)
    }

    /// Files related to `file` (sibling segments, sidecars). Relative paths
    /// resolve against `source`.
    pub async fn related(
        &self,
        file: &Path,
        source_index: usize,
        source: &SourceSpec,
    ) -> Result<Vec<MediaDescriptor>, CatalogError> {
        let response = self.invoke("-g", file).await?;
        Ok(into_descriptors(response, source_index, source))
    }

    /// List all sources concurrently. Any catalog failure fails the whole load.
    pub async fn list_sources(
        &self,
        sources: &[SourceSpec],
    ) -> Result<Vec<MediaDescriptor>, CatalogError> {
        let mut tasks = JoinSet::new();
        for (index, source) in sources.iter().cloned().enumerate() {
            let client = self.clone();
            tasks.spawn(async move { (index, client.list(index, &source).await) });
        }

        let mut per_source: Vec<Option<Vec<MediaDescriptor>>> = vec![None; sources.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined?;
            match result {
                Ok(items) => per_source[index] = Some(items),
                Err(e) => {
                    warn!(source = ?sources[index].path, error = %e, "Catalog failed for source");
                    return Err(e);
                }
            }
        }

        Ok(per_source.into_iter().flatten().flatten().collect())
    }

    async fn invoke(&self, verb: &str, arg: &Path) -> Result<CatalogResponse, CatalogError> {
        debug!(executable = ?self.executable, verb, ?arg, "Querying catalog");

        let output = Command::new(&self.executable)
            .arg(verb)
            .arg(arg)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))?
            .map_err(|source| CatalogError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CatalogError::Failed {
                status: output.status.code().unwrap_or(-1),
                message: error_message(&output.stdout, &output.stderr),
            });
        }

        parse_response(&output.stdout)
    }
}

fn parse_response(stdout: &[u8]) -> Result<CatalogResponse, CatalogError> {
    let response: CatalogResponse = serde_json::from_slice(stdout)?;
    let version = response
        .version
        .as_deref()
        .ok_or(CatalogError::MissingVersion)?;
    check_version(version)?;
    Ok(response)
}

fn check_version(version: &str) -> Result<(), CatalogError> {
    let major = version.split('.').next().unwrap_or_default();
    if major != SUPPORTED_MAJOR {
        return Err(CatalogError::IncompatibleVersion {
            found: version.to_string(),
        });
    }
    Ok(())
}

fn error_message(stdout: &[u8], stderr: &[u8]) -> String {
    if let Ok(body) = serde_json::from_slice::<CatalogErrorBody>(stdout) {
        return body.error;
    }
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if stderr.is_empty() {
        "no error message".to_string()
    } else {
        stderr
    }
}

fn into_descriptors(
    response: CatalogResponse,
    source_index: usize,
    source: &SourceSpec,
) -> Vec<MediaDescriptor> {
    response
        .file_list
        .into_iter()
        .map(|entry| MediaDescriptor {
            source_index,
            file_path: source.path.join(&entry.file_path),
            item_type: entry.item_type,
            file_type: entry.file_type,
            part_number: entry.part_num,
            part_count: entry.part_count.max(1),
            metadata_file: entry.metadata_file.map(|m| source.path.join(m)),
            source_properties: source.properties,
        })
        .collect()
}
