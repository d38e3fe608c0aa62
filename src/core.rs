//! The process-wide core context.
//!
//! `FeedCore` owns the item store, the update engine, and the subscription
//! table, and runs the background scheduler that enqueues due refreshes.
//! All global mutable state lives here; everything else receives it
//! explicitly.
//!
//! A refresh flows: scheduler (or caller) → update queue → worker fetch →
//! result drain → parse + merge + store commit on a blocking thread →
//! summary back to the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::CoreConfig;
use crate::db::ItemStore;
use crate::error::{Result, SyndError};
use crate::merge::{apply_max_items, merge_itemset};
use crate::parsing::{self, opml::render_opml_bytes};
use crate::subscription::{Subscription, SubscriptionOptions};
use crate::update::{
    RequestPriority, ResultCode, UpdateRequest, UpdateResult, UpdateService, UpdateState,
};

/// How often the scheduler rechecks subscription deadlines.
const SCHEDULER_TICK: Duration = Duration::from_secs(60);

/// Flags modifying a single refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFlags {
    /// User-initiated: jump the high-priority queue, no retries.
    pub priority_high: bool,
    /// Replace a user-renamed title with the feed's own.
    pub reset_title: bool,
}

/// Outcome of one refresh, delivered after the store is updated.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub node_id: String,
    pub http_status: u16,
    pub return_code: ResultCode,
    /// Server said 304, nothing changed.
    pub not_modified: bool,
    pub available: bool,
    pub new_count: usize,
    pub updated_count: usize,
    pub unread_count: u32,
    pub parse_errors: String,
}

pub(crate) struct CoreInner {
    config: CoreConfig,
    store: ItemStore,
    update: UpdateService,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

/// The central client; create one per process.
///
/// # Examples
///
/// ```no_run
/// # use syndikit::{FeedCore, CoreConfig, UpdateFlags};
/// # #[tokio::main]
/// # async fn main() -> syndikit::Result<()> {
/// let core = FeedCore::new(CoreConfig::default())?;
/// let node_id = core.subscribe("https://example.com/feed.xml", Default::default())?;
/// let summary = core.update(&node_id, UpdateFlags::default()).await?;
/// println!("{} new items", summary.new_count);
/// # Ok(())
/// # }
/// ```
pub struct FeedCore {
    inner: Arc<CoreInner>,
    scheduler: JoinHandle<()>,
}

impl FeedCore {
    /// Opens the item store and spawns the update workers plus the refresh
    /// scheduler. Must run inside a tokio runtime.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.cache_db_path {
            Some(path) => ItemStore::open(path)?,
            None => ItemStore::open(default_db_path()?)?,
        };
        let update = UpdateService::start(&config)?;

        let inner = Arc::new(CoreInner {
            config,
            store,
            update,
            subscriptions: Mutex::new(HashMap::new()),
        });

        let scheduler = tokio::spawn(scheduler_loop(Arc::clone(&inner)));

        Ok(Self { inner, scheduler })
    }

    /// Registers a new subscription and returns its node id. The scheduler
    /// picks it up for an initial refresh on its next tick; call
    /// [`FeedCore::update`] for an immediate one.
    pub fn subscribe(&self, source: &str, options: SubscriptionOptions) -> Result<String> {
        let source = source.trim();
        if source.is_empty() {
            return Err(SyndError::ConfigError("empty subscription source".into()));
        }
        let source = if source.starts_with('|') {
            source.to_string()
        } else {
            crate::uri::sanitize(source)
        };

        let node_id = generate_node_id();
        let subscription = Subscription::new(&node_id, source).with_options(&options);
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .insert(node_id.clone(), subscription);
        tracing::info!("subscribed node {}", node_id);
        Ok(node_id)
    }

    /// Removes a subscription and everything it stored.
    pub fn unsubscribe(&self, node_id: &str) -> Result<()> {
        let removed = self.inner.subscriptions.lock().unwrap().remove(node_id);
        if removed.is_none() {
            return Err(SyndError::UnknownNode(node_id.to_string()));
        }
        self.inner.store.remove_itemset(node_id)?;
        tracing::info!("unsubscribed node {}", node_id);
        Ok(())
    }

    /// Refreshes one subscription and waits for the merged outcome.
    pub async fn update(&self, node_id: &str, flags: UpdateFlags) -> Result<RefreshSummary> {
        let rx = spawn_refresh(&self.inner, node_id, flags)?;
        rx.await
            .map_err(|_| SyndError::UnknownNode(node_id.to_string()))?
    }

    /// Flips the online gate; offline blocks all fetching.
    pub fn set_online(&self, online: bool) {
        self.inner.update.set_online(online);
    }

    pub fn is_online(&self) -> bool {
        self.inner.update.is_online()
    }

    /// A snapshot of a subscription's current state.
    pub fn subscription(&self, node_id: &str) -> Option<Subscription> {
        self.inner.subscriptions.lock().unwrap().get(node_id).cloned()
    }

    /// Updates stored credentials and re-enables scheduled refreshes after
    /// an authentication failure.
    pub fn set_credentials(
        &self,
        node_id: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(node_id)
            .ok_or_else(|| SyndError::UnknownNode(node_id.to_string()))?;
        subscription.options.username = username;
        subscription.options.password = password;
        subscription.auth_failed = false;
        Ok(())
    }

    /// Exports all subscriptions as an OPML document, including the
    /// conditional-GET state attributes.
    pub fn export_opml(&self) -> Result<String> {
        use quick_xml::Writer;
        use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

        let mut buffer = Vec::new();
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
        fn write_err(e: impl std::fmt::Display) -> SyndError {
            SyndError::InvalidResponse(e.to_string())
        }

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;
        let mut opml = BytesStart::new("opml");
        opml.push_attribute(("version", "1.0"));
        writer.write_event(Event::Start(opml)).map_err(write_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("head")))
            .map_err(write_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("title")))
            .map_err(write_err)?;
        writer
            .write_event(Event::Text(BytesText::new("Subscriptions")))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("title")))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("head")))
            .map_err(write_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("body")))
            .map_err(write_err)?;

        let subscriptions = self.inner.subscriptions.lock().unwrap();
        let mut sorted: Vec<&Subscription> = subscriptions.values().collect();
        sorted.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        for subscription in sorted {
            subscription.write_outline(&mut writer)?;
        }
        drop(subscriptions);

        writer
            .write_event(Event::End(BytesEnd::new("body")))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("opml")))
            .map_err(write_err)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// Registers subscriptions from an OPML export, restoring update state.
    /// Returns the node ids in document order.
    pub fn import_opml(&self, data: &[u8]) -> Result<Vec<String>> {
        let doc = crate::xml::parse_document(data);
        let root = doc.root.ok_or(SyndError::UnsupportedFormat)?;
        if !parsing::opml::check(&root) {
            return Err(SyndError::UnsupportedFormat);
        }
        let body = root.find("body").ok_or(SyndError::UnsupportedFormat)?;

        let mut node_ids = Vec::new();
        let mut subscriptions = self.inner.subscriptions.lock().unwrap();
        for el in body.descendants() {
            if el.name == "outline" {
                if let Some(subscription) = Subscription::from_outline(el) {
                    node_ids.push(subscription.node_id.clone());
                    subscriptions.insert(subscription.node_id.clone(), subscription);
                }
            }
        }
        Ok(node_ids)
    }

    pub(crate) fn store(&self) -> &ItemStore {
        &self.inner.store
    }
}

impl Drop for FeedCore {
    fn drop(&mut self) {
        self.scheduler.abort();
    }
}

/// Node ids are short random alphanumeric strings, stable across exports.
pub(crate) fn generate_node_id() -> String {
    (0..7).map(|_| fastrand::alphanumeric()).collect()
}

fn default_db_path() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .ok_or_else(|| SyndError::ConfigError("no cache directory".into()))?
        .join("syndikit");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("syndikit.db"))
}

/// Enqueues a refresh for a node and returns the channel carrying its
/// summary. Fails when the node is unknown or already updating.
fn spawn_refresh(
    inner: &Arc<CoreInner>,
    node_id: &str,
    flags: UpdateFlags,
) -> Result<oneshot::Receiver<Result<RefreshSummary>>> {
    let request = {
        let mut subscriptions = inner.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(node_id)
            .ok_or_else(|| SyndError::UnknownNode(node_id.to_string()))?;
        if subscription.updating {
            return Err(SyndError::UpdateInFlight(node_id.to_string()));
        }
        subscription.updating = true;

        UpdateRequest {
            source: subscription.source.clone(),
            priority: if flags.priority_high {
                RequestPriority::High
            } else {
                RequestPriority::Normal
            },
            filter_cmd: subscription.filter_cmd.clone(),
            update_state: subscription.update_state.clone(),
            options: subscription.options.clone(),
            // Interactive fetches fail fast; scheduled ones may retry.
            allow_retries: !flags.priority_high,
        }
    };

    let (tx, rx) = oneshot::channel();
    let callback_inner = Arc::clone(inner);
    let callback_node = node_id.to_string();

    inner.update.execute(request, move |result| {
        // Parsing and merging are CPU work; keep them off the dispatch task.
        tokio::spawn(async move {
            let summary = tokio::task::spawn_blocking(move || {
                process_update_result(&callback_inner, &callback_node, flags, result)
            })
            .await
            .unwrap_or_else(|e| {
                Err(SyndError::InvalidResponse(format!(
                    "refresh task failed: {e}"
                )))
            });
            let _ = tx.send(summary);
        });
    });

    Ok(rx)
}

/// Applies one fetch result: conditional-GET bookkeeping, parse, merge,
/// store commit, counter recomputation, and subscription status.
fn process_update_result(
    inner: &Arc<CoreInner>,
    node_id: &str,
    flags: UpdateFlags,
    result: UpdateResult,
) -> Result<RefreshSummary> {
    let now = Utc::now().timestamp();

    let source = {
        let mut subscriptions = inner.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(node_id)
            .ok_or_else(|| SyndError::UnknownNode(node_id.to_string()))?;
        subscription.updating = false;
        subscription.update_state = UpdateState {
            last_poll: now,
            last_favicon_poll: subscription.update_state.last_favicon_poll,
            cookies: subscription.update_state.cookies.clone(),
            ..result.update_state.clone()
        };
        // A permanent redirect rewrote the source; keep following it.
        if result.http_status == 200 && result.source != subscription.source {
            tracing::info!("feed moved: {} -> {}", subscription.source, result.source);
            subscription.source = result.source.clone();
        }
        subscription.source.clone()
    };

    let mut summary = RefreshSummary {
        node_id: node_id.to_string(),
        http_status: result.http_status,
        return_code: result.return_code,
        not_modified: result.http_status == 304,
        available: false,
        new_count: 0,
        updated_count: 0,
        unread_count: inner.store.unread_count(node_id).unwrap_or_default(),
        parse_errors: String::new(),
    };

    // Failures short of a body: flag the subscription and surface the code.
    if result.return_code != ResultCode::Ok || summary.not_modified {
        let mut subscriptions = inner.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(node_id)
            .ok_or_else(|| SyndError::UnknownNode(node_id.to_string()))?;
        match result.return_code {
            ResultCode::Ok => {
                subscription.available = true;
                summary.available = true;
            }
            ResultCode::AuthFailed => {
                subscription.auth_failed = true;
                subscription.available = false;
            }
            ResultCode::FilterError => {
                subscription.available = false;
                if let Some(errors) = &result.filter_errors {
                    subscription.parse_errors = errors.clone();
                    summary.parse_errors = errors.clone();
                }
            }
            _ => subscription.available = false,
        }
        return Ok(summary);
    }

    let Some(data) = &result.data else {
        // A 200 without a body is nothing to parse.
        return Ok(summary);
    };

    let parsed = parsing::parse_feed(node_id, &source, data);
    let parse_errors = parsed.errors.join("\n");

    if parsed.format.is_none() {
        let mut subscriptions = inner.subscriptions.lock().unwrap();
        if let Some(subscription) = subscriptions.get_mut(node_id) {
            subscription.available = false;
            subscription.parse_errors = parse_errors.clone();
        }
        summary.parse_errors = parse_errors;
        return Ok(summary);
    }

    // Merge against the stored itemset and commit. A failure to load the
    // existing set fails the whole refresh; single-item write failures only
    // skip that item.
    let existing = inner.store.load_itemset(node_id)?;
    let mut merged = merge_itemset(&existing, parsed.items);
    for item in &mut merged.items {
        let is_new = item.id == 0;
        if is_new || merged.changed_ids.contains(&item.id) {
            if let Err(e) = inner.store.update_item(item) {
                tracing::warn!("skipping item {:?}: {}", item.title, e);
            }
        }
    }
    for removed in apply_max_items(&mut merged.items, inner.config.default_max_items) {
        if let Err(e) = inner.store.remove_item(removed.id) {
            tracing::warn!("could not prune item {}: {}", removed.id, e);
        }
    }

    summary.new_count = merged.new_count;
    summary.updated_count = merged.updated_count;
    summary.unread_count = inner.store.unread_count(node_id).unwrap_or_default();
    summary.available = true;
    summary.parse_errors = parse_errors.clone();

    {
        let mut subscriptions = inner.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(node_id)
            .ok_or_else(|| SyndError::UnknownNode(node_id.to_string()))?;
        subscription.available = true;
        subscription.parse_errors = parse_errors;
        if subscription.title.is_none() || flags.reset_title {
            subscription.title = parsed.feed.title.clone();
        }
        if parsed.feed.html_url.is_some() {
            subscription.html_url = parsed.feed.html_url.clone();
        }
        subscription.metadata = parsed.feed.metadata.clone();
        if let Some(interval) = parsed.default_update_interval {
            subscription.default_update_interval = interval;
        }
    }

    // blogChannel and friends asked for follow-up OPML downloads; run them
    // through the normal queue and inline the rendered lists when they land.
    for pending in parsed.pending_fetches {
        let callback_inner = Arc::clone(inner);
        let callback_node = node_id.to_string();
        let request = UpdateRequest::new(pending.url.clone());
        inner.update.execute(request, move |result| {
            let Some(data) = result.data else { return };
            let Some(list) = render_opml_bytes(&data) else { return };
            let html = format!("<p>{}</p>{}", pending.label, list);
            let mut subscriptions = callback_inner.subscriptions.lock().unwrap();
            if let Some(subscription) = subscriptions.get_mut(&callback_node) {
                subscription.metadata.append("blogChannel", html);
            }
        });
    }

    Ok(summary)
}

/// Wakes periodically and enqueues refreshes for due subscriptions.
async fn scheduler_loop(inner: Arc<CoreInner>) {
    // Staggered start so several processes do not poll in lockstep.
    tokio::time::sleep(Duration::from_millis(fastrand::u64(500..5000))).await;

    loop {
        let now = Utc::now().timestamp();
        let due: Vec<String> = {
            let subscriptions = inner.subscriptions.lock().unwrap();
            subscriptions
                .values()
                .filter(|s| s.poll_due(now, inner.config.default_update_interval))
                .map(|s| s.node_id.clone())
                .collect()
        };

        for node_id in due {
            match spawn_refresh(&inner, &node_id, UpdateFlags::default()) {
                Ok(rx) => {
                    // The summary is nobody's business here; log failures.
                    tokio::spawn(async move {
                        if let Ok(Err(e)) = rx.await {
                            tracing::warn!("scheduled refresh of {} failed: {}", node_id, e);
                        }
                    });
                }
                Err(SyndError::UpdateInFlight(_)) => {}
                Err(e) => tracing::warn!("could not schedule {}: {}", node_id, e),
            }
        }

        tokio::time::sleep(SCHEDULER_TICK).await;
    }
}
