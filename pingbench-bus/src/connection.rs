use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cluster::{lock, ClusterInner, Node, SubEntry};
use crate::subject::{new_inbox, validate_subject};
use crate::{BusError, Result};

/// A message as seen by a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Options applied when attaching to a node.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub name: Option<String>,
    /// Token presented to clusters that require credentials.
    pub credentials: Option<String>,
}

impl ConnectOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_credentials(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(token.into());
        self
    }
}

/// Message counters of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub out_msgs: u64,
    pub out_bytes: u64,
    pub in_msgs: u64,
    pub in_bytes: u64,
}

#[derive(Default)]
struct Counters {
    out_msgs: AtomicU64,
    out_bytes: AtomicU64,
    in_msgs: AtomicU64,
    in_bytes: AtomicU64,
}

impl Counters {
    fn record_out(&self, len: usize) {
        self.out_msgs.fetch_add(1, Ordering::Relaxed);
        self.out_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn record_in(&self, len: usize) {
        self.in_msgs.fetch_add(1, Ordering::Relaxed);
        self.in_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Stats {
        Stats {
            out_msgs: self.out_msgs.load(Ordering::Relaxed),
            out_bytes: self.out_bytes.load(Ordering::Relaxed),
            in_msgs: self.in_msgs.load(Ordering::Relaxed),
            in_bytes: self.in_bytes.load(Ordering::Relaxed),
        }
    }
}

struct ConnInner {
    cluster: Arc<ClusterInner>,
    node: Arc<Node>,
    options: ConnectOptions,
    closed: AtomicBool,
    counters: Arc<Counters>,
    sids: Arc<Mutex<HashSet<u64>>>,
    mux: OnceCell<ResponseMux>,
}

impl ConnInner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for sid in lock(&self.sids).drain() {
            self.node.remove(sid);
        }
        debug!(server_id = %self.node.server_id, "connection closed");
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// A client attached to one node of a [`Cluster`](crate::Cluster).
///
/// Clones share the underlying connection; it is closed when [`Connection::close`]
/// is called or the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("node", &self.inner.node.name)
            .field("server_id", &self.inner.node.server_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(cluster: Arc<ClusterInner>, node: Arc<Node>, options: ConnectOptions) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                cluster,
                node,
                options,
                closed: AtomicBool::new(false),
                counters: Arc::new(Counters::default()),
                sids: Arc::default(),
                mux: OnceCell::new(),
            }),
        }
    }

    /// Identity of the node this connection is attached to.
    pub fn server_id(&self) -> &str {
        &self.inner.node.server_id
    }

    pub fn node_name(&self) -> &str {
        &self.inner.node.name
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.options.name.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Stats {
        self.inner.counters.snapshot()
    }

    /// Subscriptions currently held open through this connection.
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.sids).len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::ConnectionClosed);
        }
        Ok(())
    }

    pub fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.publish_message(subject, None, payload.into()).map(|_| ())
    }

    pub fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        validate_subject(reply, false)?;
        self.publish_message(subject, Some(reply.to_string()), payload.into()).map(|_| ())
    }

    /// Returns how many subscriptions received the message.
    fn publish_message(
        &self,
        subject: &str,
        reply: Option<String>,
        payload: Bytes,
    ) -> Result<usize> {
        self.ensure_open()?;
        validate_subject(subject, false)?;
        self.inner.counters.record_out(payload.len());
        let msg = Message { subject: subject.to_string(), reply, payload };
        Ok(self.inner.cluster.route(&self.inner.node, msg))
    }

    /// Subscribe to `subject`; messages are pulled with [`Subscription::next`].
    pub fn subscribe(&self, subject: &str) -> Result<Subscription> {
        self.ensure_open()?;
        validate_subject(subject, true)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let sid = self.inner.cluster.next_sid();
        self.inner.node.insert(
            sid,
            SubEntry {
                subject: subject.to_string(),
                sender: tx,
                visible_remote_at: Instant::now() + self.inner.cluster.route_delay(),
            },
        );
        lock(&self.inner.sids).insert(sid);
        debug!(subject, sid, node = %self.inner.node.name, "subscribed");
        Ok(Subscription {
            sid,
            subject: subject.to_string(),
            node: Arc::clone(&self.inner.node),
            owner_sids: Arc::clone(&self.inner.sids),
            counters: Arc::clone(&self.inner.counters),
            rx: Some(rx),
            task: None,
        })
    }

    /// Subscribe to `subject` and run `handler` on a background task for every
    /// message. Must be called from within a Tokio runtime.
    pub fn subscribe_with<F>(&self, subject: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let mut sub = self.subscribe(subject)?;
        if let Some(mut rx) = sub.rx.take() {
            let counters = Arc::clone(&sub.counters);
            sub.task = Some(tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    counters.record_in(msg.payload.len());
                    handler(msg);
                }
            }));
        }
        Ok(sub)
    }

    /// Returns once every operation issued so far has been processed by the node.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        tokio::task::yield_now().await;
        self.ensure_open()
    }

    /// Publish `payload` with a unique reply subject and wait for the first reply.
    /// Fails with [`BusError::NoResponders`] at once when no subscription
    /// visible from this node matches `subject`.
    pub async fn request(
        &self,
        subject: &str,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message> {
        let mux = self.response_mux().await?;
        let (token, rx) = mux.register();
        let reply = format!("{}.{}", mux.prefix, token);
        match self.publish_message(subject, Some(reply), payload.into()) {
            Ok(0) => {
                mux.cancel(&token);
                return Err(BusError::NoResponders(subject.to_string()));
            }
            Ok(_) => {}
            Err(e) => {
                mux.cancel(&token);
                return Err(e);
            }
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(BusError::ConnectionClosed),
            Err(_) => {
                mux.cancel(&token);
                Err(BusError::Timeout(timeout))
            }
        }
    }

    /// Register the reply subscription that [`request`](Self::request) otherwise
    /// creates on first use. Like any subscription it is visible to other nodes
    /// only after the cluster's route delay.
    pub async fn prepare_requests(&self) -> Result<()> {
        self.response_mux().await.map(|_| ())
    }

    async fn response_mux(&self) -> Result<&ResponseMux> {
        self.inner.mux.get_or_try_init(|| async { ResponseMux::start(self) }).await
    }

    /// Close the connection and drop all of its subscriptions.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// Routes replies arriving on one wildcard inbox subscription back to the
/// request that is waiting for them.
struct ResponseMux {
    prefix: String,
    next_token: AtomicU64,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
    _subscription: Subscription,
}

impl ResponseMux {
    fn start(conn: &Connection) -> Result<Self> {
        let prefix = new_inbox();
        let pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>> = Arc::default();
        let routes = Arc::clone(&pending);
        let token_offset = prefix.len() + 1;
        let subscription = conn.subscribe_with(&format!("{prefix}.*"), move |msg| {
            let Some(token) = msg.subject.get(token_offset..) else {
                return;
            };
            if let Some(waiter) = lock(&routes).remove(token) {
                waiter.send(msg).ok();
            }
        })?;
        Ok(Self { prefix, next_token: AtomicU64::new(0), pending, _subscription: subscription })
    }

    fn register(&self) -> (String, oneshot::Receiver<Message>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(token.clone(), tx);
        (token, rx)
    }

    fn cancel(&self, token: &str) {
        lock(&self.pending).remove(token);
    }
}

/// Interest in a subject. Dropping it unsubscribes.
pub struct Subscription {
    sid: u64,
    subject: String,
    node: Arc<Node>,
    owner_sids: Arc<Mutex<HashSet<u64>>>,
    counters: Arc<Counters>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("sid", &self.sid)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next message, or `None` once the subscription or its connection is closed.
    /// Always `None` for subscriptions created with a handler.
    pub async fn next(&mut self) -> Option<Message> {
        let msg = self.rx.as_mut()?.recv().await?;
        self.counters.record_in(msg.payload.len());
        Some(msg)
    }

    /// Next message if one is already queued.
    pub fn try_next(&mut self) -> Option<Message> {
        let msg = self.rx.as_mut()?.try_recv().ok()?;
        self.counters.record_in(msg.payload.len());
        Some(msg)
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.node.remove(self.sid);
        lock(&self.owner_sids).remove(&self.sid);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
