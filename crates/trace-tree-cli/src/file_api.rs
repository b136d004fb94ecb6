use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};

use trace_tree::{EventDetail, FetchError, TraceApi, TraceSplitResult};

/// Serves canned payloads from a directory:
///
/// - `<root>/<project>/<event id>.json` for transaction events
/// - `<root>/traces/<trace id>.json` for linked traces
///
/// The organization is ignored.
#[derive(Clone, Debug)]
pub struct FileApi {
    root: PathBuf,
}

impl FileApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn read_json<T: DeserializeOwned>(path: PathBuf) -> Result<T, FetchError> {
    let bytes = tokio::fs::read(&path).await.map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
        _ => FetchError::Request(format!("{}: {error}", path.display())),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|error| FetchError::Decode(format!("{}: {error}", path.display())))
}

impl TraceApi for FileApi {
    fn fetch_transaction_spans(
        &self,
        _organization: &str,
        project_slug: &str,
        event_id: &str,
    ) -> BoxFuture<'static, Result<EventDetail, FetchError>> {
        let path = self.root.join(project_slug).join(format!("{event_id}.json"));
        tracing::debug!(path = %path.display(), "reading transaction event");
        read_json(path).boxed()
    }

    fn fetch_trace(
        &self,
        _organization: &str,
        trace_id: &str,
        _query: &str,
    ) -> BoxFuture<'static, Result<TraceSplitResult, FetchError>> {
        let path = self.root.join("traces").join(format!("{trace_id}.json"));
        tracing::debug!(path = %path.display(), "reading linked trace");
        read_json(path).boxed()
    }
}
