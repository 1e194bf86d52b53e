// ── Content feed ──

use std::sync::Arc;

use async_trait::async_trait;
use vigil_api::FeedClient;

use crate::error::CoreError;
use crate::model::{Domain, Snapshot};
use crate::pump::DomainFetcher;

/// A single reference page reduced to text.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Where the text comes from; used as the snapshot key.
    fn source(&self) -> String;

    async fn get_latest(&self) -> Result<String, CoreError>;
}

#[async_trait]
impl FeedSource for FeedClient {
    fn source(&self) -> String {
        FeedClient::source(self).to_string()
    }

    async fn get_latest(&self) -> Result<String, CoreError> {
        Ok(FeedClient::get_latest(self).await?)
    }
}

/// Feed domain: source URL → text.
pub struct FeedFetcher(pub Arc<dyn FeedSource>);

#[async_trait]
impl DomainFetcher for FeedFetcher {
    fn domain(&self) -> Domain {
        Domain::Feed
    }

    async fn fetch(&self, _previous: &Snapshot) -> Result<Snapshot, CoreError> {
        let text = self.0.get_latest().await?;
        Ok(Snapshot::from([(self.0.source(), serde_json::Value::String(text))]))
    }
}
