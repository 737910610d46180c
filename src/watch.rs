//! Typed watch loops
//!
//! One [`WatchLoop`] runs per resource kind. It keeps a read-only cache of
//! every object it has seen, turns raw watcher events into Add, Update and
//! Delete notifications and calls its handler inline, so events of one kind
//! are never handled concurrently. Handler failures are logged and the loop
//! moves on; the next resync redelivers the object.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use kube::api::ListParams;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::error::{BackoffConfig, Error, Result};
use crate::health::HealthState;

/// Verb of a dispatched event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventVerb {
    Add,
    Update,
    Delete,
}

impl fmt::Display for EventVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventVerb::Add => write!(f, "add"),
            EventVerb::Update => write!(f, "update"),
            EventVerb::Delete => write!(f, "delete"),
        }
    }
}

/// Cross-kind event summary sent to the notification sink
///
/// The sink only observes; handlers have already run by the time it sees one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: &'static str,
    pub verb: EventVerb,
    pub namespace: String,
    pub name: String,
}

/// Reacts to the events of one resource kind
#[async_trait]
pub trait ResourceHandler<K: Send + Sync>: Send + Sync {
    async fn on_add(&self, obj: &K) -> Result<()>;

    async fn on_update(&self, _old: &K, _new: &K) -> Result<()> {
        Ok(())
    }

    async fn on_delete(&self, _obj: &K) -> Result<()> {
        Ok(())
    }
}

type ObjectKey = (String, String);

fn object_key<K: ResourceExt>(obj: &K) -> ObjectKey {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Watch loop over one resource kind
pub struct WatchLoop<K, H> {
    kind: &'static str,
    handler: H,
    cache: BTreeMap<ObjectKey, Arc<K>>,
    /// Objects listed since the last `Init`, swapped in on `InitDone`
    relist: Option<BTreeMap<ObjectKey, Arc<K>>>,
    resync_period: Option<Duration>,
    notifications: Option<mpsc::Sender<Notification>>,
    health_state: Option<Arc<HealthState>>,
}

impl<K, H> WatchLoop<K, H>
where
    K: Resource + Clone + fmt::Debug + Send + Sync + 'static,
    H: ResourceHandler<K>,
{
    pub fn new(kind: &'static str, handler: H) -> Self {
        Self {
            kind,
            handler,
            cache: BTreeMap::new(),
            relist: None,
            resync_period: None,
            notifications: None,
            health_state: None,
        }
    }

    /// Redeliver every cached object as an update at this period; zero disables resync
    pub fn with_resync(mut self, period: Duration) -> Self {
        self.resync_period = (!period.is_zero()).then_some(period);
        self
    }

    pub fn with_notifications(mut self, tx: mpsc::Sender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn with_health_state(mut self, state: Arc<HealthState>) -> Self {
        self.health_state = Some(state);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Snapshot of the cached objects
    pub fn cached(&self) -> Vec<Arc<K>> {
        self.cache.values().cloned().collect()
    }

    /// Fold one watcher event into the cache and dispatch the derived verbs
    pub async fn handle_event(&mut self, event: Event<K>) {
        match event {
            Event::Apply(obj) => {
                let obj = Arc::new(obj);
                let previous = self.cache.insert(object_key(obj.as_ref()), obj.clone());
                self.dispatch_applied(previous, obj).await;
            }
            Event::Delete(obj) => {
                let cached = self.cache.remove(&object_key(&obj));
                let obj = cached.unwrap_or_else(|| Arc::new(obj));
                self.dispatch(EventVerb::Delete, &obj, None).await;
            }
            Event::Init => {
                debug!(kind = self.kind, "Relisting");
                self.relist = Some(BTreeMap::new());
            }
            Event::InitApply(obj) => {
                let obj = Arc::new(obj);
                let key = object_key(obj.as_ref());
                self.relist
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key.clone(), obj.clone());
                let previous = self.cache.get(&key).cloned();
                self.dispatch_applied(previous, obj).await;
            }
            Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                let gone: Vec<Arc<K>> = self
                    .cache
                    .iter()
                    .filter(|(key, _)| !listed.contains_key(*key))
                    .map(|(_, obj)| obj.clone())
                    .collect();
                self.cache = listed;
                for obj in gone {
                    self.dispatch(EventVerb::Delete, &obj, None).await;
                }
                debug!(kind = self.kind, cached = self.cache.len(), "Relist complete");
            }
        }
    }

    /// Redeliver every cached object as `Update(obj, obj)`
    pub async fn resync(&self) {
        let objects = self.cached();
        debug!(kind = self.kind, count = objects.len(), "Resync");
        for obj in objects {
            self.dispatch(EventVerb::Update, &obj, Some(&obj)).await;
        }
    }

    async fn dispatch_applied(&self, previous: Option<Arc<K>>, obj: Arc<K>) {
        match previous {
            Some(old) => self.dispatch(EventVerb::Update, &obj, Some(&old)).await,
            None => self.dispatch(EventVerb::Add, &obj, None).await,
        }
    }

    async fn dispatch(&self, verb: EventVerb, obj: &Arc<K>, old: Option<&Arc<K>>) {
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();

        let result = match (verb, old) {
            (EventVerb::Add, _) => self.handler.on_add(obj).await,
            (EventVerb::Update, Some(old)) => self.handler.on_update(old, obj).await,
            (EventVerb::Update, None) => self.handler.on_update(obj, obj).await,
            (EventVerb::Delete, _) => self.handler.on_delete(obj).await,
        };

        if let Some(ref state) = self.health_state {
            state.metrics.record_watch_event(self.kind, verb);
        }

        if let Err(e) = result {
            error!(kind = self.kind, %verb, %namespace, %name, error = %e, "Handler failed");
        }

        if let Some(ref tx) = self.notifications {
            let notification = Notification {
                kind: self.kind,
                verb,
                namespace,
                name,
            };
            if let Err(e) = tx.try_send(notification) {
                debug!(kind = self.kind, error = %e, "Notification dropped");
            }
        }
    }

    /// Drive the loop from `stream` until it ends or `shutdown` fires
    pub async fn run_stream<S>(mut self, stream: S, shutdown: CancellationToken)
    where
        S: Stream<Item = std::result::Result<Event<K>, watcher::Error>> + Send,
    {
        let mut stream = std::pin::pin!(stream);
        let mut ticker = self.resync_period.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(kind = self.kind, "Watch loop stopping");
                    break;
                }
                _ = next_tick(&mut ticker) => {
                    self.resync().await;
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => {
                        warn!(kind = self.kind, error = %e, "Watch stream error");
                    }
                    None => {
                        warn!(kind = self.kind, "Watch stream ended");
                        break;
                    }
                },
            }
        }
    }
}

impl<K, H> WatchLoop<K, H>
where
    K: Resource + Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    H: ResourceHandler<K>,
{
    /// Watch `api` until `shutdown` fires
    ///
    /// Callers probe the watch with [`establish_with_retry`] first; errors after
    /// that are absorbed by the watcher's backoff.
    pub async fn run(self, api: Api<K>, config: watcher::Config, shutdown: CancellationToken) {
        info!(kind = self.kind, "Watch started");
        let stream = watcher::watcher(api, config).default_backoff();
        self.run_stream(stream, shutdown).await;
    }
}

/// Probe that the kind can be listed with the given selectors
pub async fn establish<K>(api: &Api<K>, kind: &str, config: &watcher::Config) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    let mut params = ListParams::default().limit(1);
    if let Some(ref labels) = config.label_selector {
        params = params.labels(labels);
    }
    api.list_metadata(&params)
        .await
        .map(|_| ())
        .map_err(|source| Error::WatchEstablish {
            kind: kind.to_string(),
            source,
        })
}

/// Probe the watch until it succeeds, `attempts` run out or `shutdown` fires
pub async fn establish_with_retry<K>(
    api: &Api<K>,
    kind: &str,
    config: &watcher::Config,
    attempts: u32,
    backoff: &BackoffConfig,
    shutdown: &CancellationToken,
) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match establish(api, kind, config).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = backoff.delay_for_attempt(attempt);
                warn!(kind, attempt = attempt + 1, ?delay, error = %e, "Watch not established, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Consume notifications until every sender is gone or `shutdown` fires
pub async fn run_notification_sink(
    mut rx: mpsc::Receiver<Notification>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(n) => debug!(
                    kind = n.kind,
                    verb = %n.verb,
                    namespace = %n.namespace,
                    name = %n.name,
                    "Event observed"
                ),
                None => break,
            },
        }
    }
}
