//! Media discovery and remote analysis.
//!
//! [`discover`] lists candidate files in a directory without blocking the
//! runtime. [`InferenceClient`] submits a path to an analysis service and
//! returns its JSON record.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, check_status, parse_json};

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    path: &'a str,
}

/// HTTP client for a media-analysis service.
///
/// `POST {endpoint}` with `{"path": "..."}`. A JSON `null` body or a 404
/// means the service has no record for that file.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl InferenceClient {
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoint,
        })
    }

    pub async fn analyze(&self, path: &Path) -> Result<Option<serde_json::Value>, Error> {
        let path = path.to_string_lossy();
        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&AnalyzeRequest { path: &path })
            .send()
            .await?;

        match check_status("inference", resp).await {
            Ok(resp) => {
                let record: serde_json::Value = parse_json(resp).await?;
                debug!(%path, has_record = !record.is_null(), "media analyzed");
                Ok((!record.is_null()).then_some(record))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// List regular files in `dir` whose extension matches one of
/// `extensions` (case-insensitive, without the dot). Sorted by path.
pub async fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discover_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        tokio::fs::create_dir(dir.join("nested.mp4")).await.unwrap();
        tokio::fs::write(dir.join("b.MP4"), b"").await.unwrap();
        tokio::fs::write(dir.join("a.mp4"), b"").await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), b"").await.unwrap();

        let found = discover(dir, &["mp4".to_owned()]).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.mp4", "b.MP4"]);
    }

    #[tokio::test]
    async fn discover_missing_directory_is_io_error() {
        let err = discover(Path::new("/definitely/not/here"), &["mp4".to_owned()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
