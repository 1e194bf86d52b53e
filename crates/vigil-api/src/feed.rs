// ── Content feed scraper ──
//
// Fetches a reference page and reduces it to readable text.

use std::time::Duration;

use scraper::{Html, Node};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{BROWSER_USER_AGENT, TransportConfig, check_status};

const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Pulls the latest text from a single reference page.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    source: Url,
}

impl FeedClient {
    /// Build a client with a browser-like agent and a 10 s timeout.
    pub fn new(source: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let transport = transport
            .clone()
            .with_timeout(FEED_TIMEOUT)
            .with_user_agent(BROWSER_USER_AGENT);
        Ok(Self {
            http: transport.build_client()?,
            source,
        })
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    /// Fetch the page and return its visible text.
    pub async fn get_latest(&self) -> Result<String, Error> {
        let resp = self.http.get(self.source.clone()).send().await?;
        let html = check_status("feed", resp).await?.text().await?;
        let text = extract_text(&html);
        debug!(source = %self.source, chars = text.len(), "feed page fetched");
        Ok(text)
    }
}

/// Elements whose text never reaches the reader.
const HIDDEN: [&str; 4] = ["script", "style", "noscript", "template"];

/// Reduce an HTML document to whitespace-normalized visible text.
///
/// Comments and the contents of script-like elements are dropped;
/// entities are decoded by the parser.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }

    collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
