use pingbench_common::Topology;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::connection::{ConnectOptions, Connection, Message};
use crate::{BusError, Result, URL_SCHEME};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SubEntry {
    pub subject: String,
    pub sender: mpsc::UnboundedSender<Message>,
    /// Publishers attached to other nodes only see this subscription from here on.
    pub visible_remote_at: Instant,
}

pub(crate) struct Node {
    pub name: String,
    pub server_id: String,
    subs: Mutex<HashMap<u64, SubEntry>>,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            server_id: Uuid::new_v4().simple().to_string(),
            subs: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, sid: u64, entry: SubEntry) {
        lock(&self.subs).insert(sid, entry);
    }

    pub fn remove(&self, sid: u64) {
        lock(&self.subs).remove(&sid);
    }

    /// Hands `msg` to every matching subscription; `local` is true when the
    /// publisher is attached to this node.
    fn deliver(&self, msg: &Message, local: bool, now: Instant) -> usize {
        let subs = lock(&self.subs);
        subs.values()
            .filter(|entry| local || now >= entry.visible_remote_at)
            .filter(|entry| crate::subject_matches(&entry.subject, &msg.subject))
            .filter(|entry| entry.sender.send(msg.clone()).is_ok())
            .count()
    }
}

pub(crate) struct ClusterInner {
    nodes: Vec<Arc<Node>>,
    route_delay: Duration,
    credentials: Option<String>,
    next_sid: AtomicU64,
}

impl ClusterInner {
    pub fn next_sid(&self) -> u64 {
        self.next_sid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn route_delay(&self) -> Duration {
        self.route_delay
    }

    /// Delivers `msg` across the cluster and returns how many subscriptions received it.
    pub fn route(&self, origin: &Node, msg: Message) -> usize {
        let now = Instant::now();
        self.nodes
            .iter()
            .map(|node| node.deliver(&msg, node.server_id == origin.server_id, now))
            .sum()
    }
}

/// A set of bus nodes sharing one routing table.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.node_names())
            .field("route_delay", &self.inner.route_delay)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Build a cluster from its topology. Node names must be unique and non-empty.
    pub fn new(topology: &Topology) -> Result<Self> {
        if topology.nodes.is_empty() {
            return Err(BusError::NoServers("topology lists no nodes".to_string()));
        }
        let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(topology.nodes.len());
        for name in &topology.nodes {
            if name.is_empty() || nodes.iter().any(|n| &n.name == name) {
                return Err(BusError::InvalidUrl(format!("{URL_SCHEME}{name}")));
            }
            nodes.push(Arc::new(Node::new(name)));
        }
        Ok(Self {
            inner: Arc::new(ClusterInner {
                nodes,
                route_delay: Duration::from_millis(topology.route_delay_ms),
                credentials: topology.credentials.clone(),
                next_sid: AtomicU64::new(1),
            }),
        })
    }

    /// A one-node cluster without credentials.
    pub fn single(name: &str) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                nodes: vec![Arc::new(Node::new(name))],
                route_delay: Duration::ZERO,
                credentials: None,
                next_sid: AtomicU64::new(1),
            }),
        }
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.inner.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn route_delay(&self) -> Duration {
        self.inner.route_delay
    }

    /// Connect to the first node named in `urls`, a comma-separated list of
    /// `mem://<node>` URLs.
    pub fn connect(&self, urls: &str, options: ConnectOptions) -> Result<Connection> {
        let mut candidates = 0;
        for url in urls.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            candidates += 1;
            let name = url
                .strip_prefix(URL_SCHEME)
                .map(|rest| rest.trim_end_matches('/'))
                .ok_or_else(|| BusError::InvalidUrl(url.to_string()))?;
            let Some(node) = self.inner.nodes.iter().find(|n| n.name == name) else {
                debug!(url, "no such node, trying next server");
                continue;
            };
            if let Some(required) = &self.inner.credentials {
                if options.credentials.as_deref() != Some(required.as_str()) {
                    return Err(BusError::AuthorizationViolation);
                }
            }
            debug!(url, server_id = %node.server_id, "connected");
            return Ok(Connection::new(Arc::clone(&self.inner), Arc::clone(node), options));
        }
        if candidates == 0 {
            return Err(BusError::InvalidUrl(urls.to_string()));
        }
        Err(BusError::NoServers(urls.to_string()))
    }
}
