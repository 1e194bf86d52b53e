// ── Media directory with asynchronous analysis ──
//
// Each cycle scans the directory, analyzes only files the store does not
// already hold, and returns the previous entries plus the new records.
// Every analysis has its own deadline and the cycle stops starting new
// ones once its budget is spent, so a slow analyzer still makes progress
// cycle by cycle. Files that produced no record are retried after the
// files never tried.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use vigil_api::InferenceClient;

use crate::error::CoreError;
use crate::model::{Domain, Snapshot};
use crate::pump::DomainFetcher;

/// Turns a media file into a structured record.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    /// `Ok(None)` means the analyzer has nothing to say about this file.
    async fn analyze(&self, path: &Path) -> Result<Option<serde_json::Value>, CoreError>;
}

#[async_trait]
impl MediaAnalyzer for InferenceClient {
    async fn analyze(&self, path: &Path) -> Result<Option<serde_json::Value>, CoreError> {
        Ok(InferenceClient::analyze(self, path).await?)
    }
}

/// Media domain: file path → analysis record.
pub struct MediaFetcher {
    directory: PathBuf,
    extensions: Vec<String>,
    analyzer: Arc<dyn MediaAnalyzer>,
    /// Deadline for the scan and for each analysis.
    call_timeout: Duration,
    /// No new analysis starts once a cycle has run this long.
    budget: Duration,
    /// Paths tried without getting a record back.
    deferred: Mutex<BTreeSet<String>>,
}

impl MediaFetcher {
    pub fn new(
        directory: PathBuf,
        extensions: Vec<String>,
        analyzer: Arc<dyn MediaAnalyzer>,
        call_timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            directory,
            extensions,
            analyzer,
            call_timeout,
            budget,
            deferred: Mutex::new(BTreeSet::new()),
        }
    }

    fn deferred(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Analyze one file. `None` when there is nothing to store yet.
    async fn analyze_one(&self, key: &str, path: &Path) -> Option<serde_json::Value> {
        match tokio::time::timeout(self.call_timeout, self.analyzer.analyze(path)).await {
            Ok(Ok(Some(record))) => {
                debug!(path = %key, "media analyzed");
                Some(record)
            }
            Ok(Ok(None)) => {
                debug!(path = %key, "analyzer returned no record");
                None
            }
            Ok(Err(e)) => {
                warn!(path = %key, error = %e, "media analysis failed");
                None
            }
            Err(_) => {
                warn!(
                    path = %key,
                    timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                    "media analysis timed out"
                );
                None
            }
        }
    }
}

#[async_trait]
impl DomainFetcher for MediaFetcher {
    fn domain(&self) -> Domain {
        Domain::Media
    }

    fn deadline(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn fetch(&self, previous: &Snapshot) -> Result<Snapshot, CoreError> {
        let scan = vigil_api::media::discover(&self.directory, &self.extensions);
        let found = tokio::time::timeout(self.call_timeout, scan)
            .await
            .map_err(|_| CoreError::timeout("media scan", self.call_timeout))??;

        let mut next = previous.clone();
        let mut fresh: Vec<(String, PathBuf)> = found
            .into_iter()
            .map(|path| (path.to_string_lossy().into_owned(), path))
            .filter(|(key, _)| !next.contains_key(key))
            .collect();
        {
            // Stable: path order is kept within each group.
            let deferred = self.deferred();
            fresh.sort_by_key(|(key, _)| deferred.contains(key));
        }

        let started = Instant::now();
        let total = fresh.len();
        for (done, (key, path)) in fresh.into_iter().enumerate() {
            if started.elapsed() >= self.budget {
                debug!(left = total - done, "media budget spent, resuming next cycle");
                break;
            }
            let record = self.analyze_one(&key, &path).await;
            let mut deferred = self.deferred();
            match record {
                Some(record) => {
                    deferred.remove(&key);
                    next.insert(key, record);
                }
                None => {
                    deferred.insert(key);
                }
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::pump::run_cycle;
    use crate::store::StateStore;

    /// Labels files by name. `blank*` yields no record, `stuck*` never
    /// answers, everything else takes `delay`.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<PathBuf>>,
        delay: Duration,
    }

    #[async_trait]
    impl MediaAnalyzer for Recording {
        async fn analyze(&self, path: &Path) -> Result<Option<serde_json::Value>, CoreError> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with("stuck") {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.delay).await;
            if name.starts_with("blank") {
                return Ok(None);
            }
            Ok(Some(json!({ "label": name })))
        }
    }

    fn media_dir(names: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        tmp
    }

    fn fetcher(dir: &Path, analyzer: Arc<Recording>, call: u64, budget: u64) -> MediaFetcher {
        MediaFetcher::new(
            dir.to_path_buf(),
            vec!["mp4".into()],
            analyzer,
            Duration::from_secs(call),
            Duration::from_secs(budget),
        )
    }

    #[tokio::test]
    async fn only_new_files_are_analyzed() {
        let tmp = media_dir(&["a.mp4", "b.mp4", "blank.mp4", "notes.txt"]);
        let analyzer = Arc::new(Recording::default());
        let fetcher = fetcher(tmp.path(), analyzer.clone(), 30, 30);

        let known = tmp.path().join("a.mp4").to_string_lossy().into_owned();
        let previous = Snapshot::from([(known.clone(), json!({ "label": "cached" }))]);

        let next = fetcher.fetch(&previous).await.unwrap();

        let seen = analyzer.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![tmp.path().join("b.mp4"), tmp.path().join("blank.mp4")]
        );
        assert_eq!(next.len(), 2);
        assert_eq!(next[&known], json!({ "label": "cached" }));
    }

    #[tokio::test]
    async fn missing_directory_is_a_fetch_error() {
        let fetcher = fetcher(
            Path::new("/no/such/media/dir"),
            Arc::new(Recording::default()),
            30,
            30,
        );

        let err = fetcher.fetch(&Snapshot::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::Fetch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_analysis_progresses_across_cycles() {
        let tmp = media_dir(&["a.mp4", "b.mp4", "c.mp4"]);
        let analyzer = Arc::new(Recording {
            delay: Duration::from_secs(20),
            ..Recording::default()
        });
        let fetcher = fetcher(tmp.path(), analyzer, 30, 30);
        let store = StateStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        // The pump-level timeout is shorter than the work in one cycle.
        let timeout = Duration::from_secs(30);
        run_cycle(&fetcher, &store, &tx, timeout).await.unwrap();
        assert_eq!(store.data(Domain::Media).len(), 2);

        run_cycle(&fetcher, &store, &tx, timeout).await.unwrap();
        assert_eq!(store.data(Domain::Media).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_file_does_not_block_the_rest() {
        let tmp = media_dir(&["stuck.mp4", "video.mp4"]);
        let analyzer = Arc::new(Recording::default());
        let fetcher = fetcher(tmp.path(), analyzer, 10, 5);

        let first = fetcher.fetch(&Snapshot::new()).await.unwrap();
        assert!(first.is_empty());

        let second = fetcher.fetch(&first).await.unwrap();
        let video = tmp.path().join("video.mp4").to_string_lossy().into_owned();
        assert_eq!(second.keys().collect::<Vec<_>>(), vec![&video]);
    }
}
