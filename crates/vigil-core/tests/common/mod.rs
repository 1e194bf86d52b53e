#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vigil_api::{Error, PushMessage, PushSession, PushTransport};

/// What the broker has seen, across every session.
#[derive(Default)]
pub struct Ledger {
    pub connects: AtomicUsize,
    /// Clock reading at each `connect`.
    pub connect_times: Mutex<Vec<tokio::time::Instant>>,
    /// Net subscriptions per topic: +1 per subscribe, -1 per unsubscribe.
    pub active: Mutex<BTreeMap<String, i64>>,
    pub published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl Ledger {
    fn bump(&self, topic: &str, by: i64) {
        *self.active.lock().unwrap().entry(topic.to_owned()).or_default() += by;
    }

    pub fn net(&self) -> BTreeMap<String, i64> {
        self.active.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Time between consecutive connects.
    pub fn connect_gaps(&self) -> Vec<Duration> {
        let times = self.connect_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// In-memory broker. Each `connect` opens a fresh session; the test feeds
/// it with [`deliver`](Self::deliver) and ends it with
/// [`go_offline`](Self::go_offline).
#[derive(Default)]
pub struct MockTransport {
    pub ledger: Arc<Ledger>,
    inbox: Mutex<Option<mpsc::UnboundedSender<PushMessage>>>,
    /// Sessions end as soon as they are opened.
    pub drop_sessions: AtomicBool,
    /// Every subscribe is refused.
    pub reject_subscribe: AtomicBool,
}

impl MockTransport {
    pub fn deliver(&self, topic: &str, payload: serde_json::Value) {
        if let Some(tx) = self.inbox.lock().unwrap().as_ref() {
            let _ = tx.send(PushMessage {
                topic: topic.into(),
                payload,
            });
        }
    }

    /// Drop the live session's sender so its `recv` yields `None`.
    pub fn go_offline(&self) {
        self.inbox.lock().unwrap().take();
    }
}

struct MockSession {
    ledger: Arc<Ledger>,
    reject_subscribe: bool,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PushMessage>>,
}

#[async_trait]
impl PushSession for MockSession {
    async fn subscribe(&self, topic: &str) -> Result<(), Error> {
        if self.reject_subscribe {
            return Err(Error::Rejected {
                operation: "subscribe",
                topic: topic.to_owned(),
                reason: "not authorized".into(),
            });
        }
        self.ledger.bump(topic, 1);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        self.ledger.bump(topic, -1);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), Error> {
        self.ledger
            .published
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.clone()));
        Ok(())
    }

    async fn recv(&self) -> Option<PushMessage> {
        self.rx.lock().await.recv().await
    }

    async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self) -> Result<Arc<dyn PushSession>, Error> {
        self.ledger.connects.fetch_add(1, Ordering::SeqCst);
        self.ledger
            .connect_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.drop_sessions.load(Ordering::SeqCst) {
            *self.inbox.lock().unwrap() = Some(tx);
        }
        Ok(Arc::new(MockSession {
            ledger: Arc::clone(&self.ledger),
            reject_subscribe: self.reject_subscribe.load(Ordering::SeqCst),
            rx: tokio::sync::Mutex::new(rx),
        }))
    }

    fn endpoint(&self) -> String {
        "mock://broker".into()
    }
}

/// Poll `cond` every 10ms until it holds, panicking after `limit`.
pub async fn until<F, Fut>(limit: Duration, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !cond().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
