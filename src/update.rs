//! Update request processing: queues, workers, retries, filters.
//!
//! Fetch requests flow through two FIFO queues (high priority for
//! user-initiated fetches, normal for scheduled refreshes) into a small
//! worker pool. The first worker serves the high-priority queue exclusively;
//! the others drain high first and fall back to normal with a short poll so
//! they notice new high-priority work. A process-wide online gate stops all
//! workers from starting fetches while offline.
//!
//! Results are shipped over a channel to a single drain task that invokes
//! the request callback, so callers never need per-callback locking.
//! Transient network failures are requeued with exponential backoff;
//! cancellation nulls the callback and the request is freed at the next
//! dispatch point.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use tokio::process::Command;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::CoreConfig;
use crate::error::{Result, SyndError};
use crate::xml::Element;

/// Base delay before the first retry.
const RETRY_MIN_DELAY: Duration = Duration::from_secs(30);
/// Upper bound for the retry delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(600);
/// How many retries a request gets before the error is surfaced.
const MAX_RETRIES: u32 = 3;
/// How long a non-reserved worker blocks on the normal queue before
/// rechecking the high-priority one.
const NORMAL_QUEUE_POLL: Duration = Duration::from_secs(5);

/// Network-level outcome of a fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Unknown,
    ConnectionFailed,
    SocketError,
    HostNotFound,
    Timeout,
    AuthFailed,
    NotFound,
    FilterError,
    /// Permanent HTTP-level failure (4xx/5xx not covered above).
    HttpError,
}

impl ResultCode {
    /// Whether the failure is worth another attempt.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Unknown
                | Self::ConnectionFailed
                | Self::SocketError
                | Self::HostNotFound
                | Self::Timeout
        )
    }
}

/// Lifecycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Initialized,
    Pending,
    Processing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPriority {
    High,
    Normal,
}

/// Conditional-GET and poll bookkeeping for a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub cookies: Option<String>,
    pub last_poll: i64,
    pub last_favicon_poll: i64,
}

impl UpdateState {
    /// Reads the state attributes from a subscription element of an OPML
    /// export.
    pub fn import(el: &Element) -> Self {
        Self {
            etag: el.attr("etag").map(str::to_string),
            last_modified: el.attr("lastModified").map(str::to_string),
            cookies: None,
            last_poll: el
                .attr("lastPollTime")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_favicon_poll: el
                .attr("lastFaviconPollTime")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// The state attributes for a subscription element of an OPML export.
    pub fn export(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if let Some(etag) = &self.etag {
            attrs.push(("etag", etag.clone()));
        }
        if let Some(last_modified) = &self.last_modified {
            attrs.push(("lastModified", last_modified.clone()));
        }
        if self.last_poll > 0 {
            attrs.push(("lastPollTime", self.last_poll.to_string()));
        }
        if self.last_favicon_poll > 0 {
            attrs.push(("lastFaviconPollTime", self.last_favicon_poll.to_string()));
        }
        attrs
    }

    /// Conditional-GET headers derived from the stored state.
    pub(crate) fn conditional_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(etag) = &self.etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }
        if let Some(last_modified) = &self.last_modified {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }
        if let Some(cookies) = &self.cookies {
            if let Ok(value) = HeaderValue::from_str(cookies) {
                headers.insert(reqwest::header::COOKIE, value);
            }
        }
        headers
    }
}

/// Per-request fetch options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub no_proxy: bool,
}

/// A fetch request. The source is a URL, a `file://`/bare path, or a
/// command starting with `|`.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub source: String,
    pub priority: RequestPriority,
    pub filter_cmd: Option<String>,
    pub update_state: UpdateState,
    pub options: RequestOptions,
    pub allow_retries: bool,
}

impl UpdateRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            priority: RequestPriority::Normal,
            filter_cmd: None,
            update_state: UpdateState::default(),
            options: RequestOptions::default(),
            allow_retries: true,
        }
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// What the callback receives when a request finishes.
#[derive(Debug)]
pub struct UpdateResult {
    /// The request source, rewritten when a permanent redirect moved it.
    pub source: String,
    /// Response body; `None` on 304 or failure.
    pub data: Option<Vec<u8>>,
    pub http_status: u16,
    pub return_code: ResultCode,
    /// Refreshed conditional-GET state to store back on the subscription.
    pub update_state: UpdateState,
    pub content_type: Option<String>,
    /// Captured stderr of a failing filter.
    pub filter_errors: Option<String>,
}

type Callback = Box<dyn FnOnce(UpdateResult) + Send + 'static>;

/// Shared slot holding the callback. Cancelling takes it out; whoever holds
/// the request next observes the empty slot and frees the request. Taking
/// the `FnOnce` out also guarantees no two callbacks ever fire for the same
/// request.
#[derive(Clone)]
pub struct UpdateHandle {
    callback: Arc<Mutex<Option<Callback>>>,
}

impl UpdateHandle {
    /// Best-effort cancellation, safe from any thread. An already-running
    /// fetch completes normally and its result is dropped.
    pub fn cancel(&self) {
        self.callback.lock().unwrap().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.callback.lock().unwrap().is_none()
    }
}

/// One queued fetch.
struct Job {
    request: UpdateRequest,
    callback: Arc<Mutex<Option<Callback>>>,
    state: RequestState,
    retries: u32,
    result: Option<UpdateResult>,
}

#[derive(Default)]
struct Queues {
    high: Mutex<VecDeque<Job>>,
    normal: Mutex<VecDeque<Job>>,
    notify: Notify,
}

impl Queues {
    fn push(&self, mut job: Job) {
        job.state = RequestState::Pending;
        let queue = match job.request.priority {
            RequestPriority::High => &self.high,
            RequestPriority::Normal => &self.normal,
        };
        queue.lock().unwrap().push_back(job);
        self.notify.notify_waiters();
    }

    fn try_pop_high(&self) -> Option<Job> {
        self.high.lock().unwrap().pop_front()
    }

    fn try_pop_normal(&self) -> Option<Job> {
        self.normal.lock().unwrap().pop_front()
    }

    /// Blocks until a high-priority job is available.
    async fn pop_high_only(&self) -> Job {
        loop {
            // Register for wakeups before checking, otherwise a push landing
            // between the check and the await would be missed.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some(job) = self.try_pop_high() {
                return job;
            }
            notified.await;
        }
    }

    /// Pops high first; otherwise blocks on the normal queue with a short
    /// poll so newly arrived high-priority work is seen promptly.
    async fn pop_any(&self) -> Job {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some(job) = self.try_pop_high() {
                return job;
            }
            if let Some(job) = self.try_pop_normal() {
                return job;
            }
            let _ = timeout(NORMAL_QUEUE_POLL, notified).await;
        }
    }
}

/// The update engine: worker pool, online gate, and result dispatch.
pub struct UpdateService {
    queues: Arc<Queues>,
    online_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    drain: JoinHandle<()>,
}

impl UpdateService {
    /// Builds the HTTP client and spawns the workers and the result-drain
    /// task. Must run inside a tokio runtime.
    pub fn start(config: &CoreConfig) -> Result<Self> {
        let clients = build_clients(config)?;
        let queues = Arc::new(Queues::default());
        let (online_tx, online_rx) = watch::channel(true);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::new();
        let count = config.effective_concurrency();
        for i in 0..count {
            // The first worker works exclusively on high-priority requests.
            let reserved = i == 0;
            let queues = Arc::clone(&queues);
            let online_rx = online_rx.clone();
            let clients = clients.clone();
            let results_tx = results_tx.clone();
            workers.push(tokio::spawn(worker_loop(
                queues, online_rx, clients, results_tx, reserved,
            )));
        }

        let drain = tokio::spawn(drain_loop(
            results_rx,
            Arc::clone(&queues),
            config.enable_fetch_retries,
        ));

        Ok(Self {
            queues,
            online_tx,
            workers,
            drain,
        })
    }

    /// Enqueues a request; the callback fires exactly once unless cancelled.
    pub fn execute(
        &self,
        request: UpdateRequest,
        callback: impl FnOnce(UpdateResult) + Send + 'static,
    ) -> UpdateHandle {
        let callback: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(Some(Box::new(callback))));
        let handle = UpdateHandle {
            callback: Arc::clone(&callback),
        };
        self.queues.push(Job {
            request,
            callback,
            state: RequestState::Initialized,
            retries: 0,
            result: None,
        });
        handle
    }

    /// Flips the online gate. Going online wakes all blocked workers.
    pub fn set_online(&self, online: bool) {
        if *self.online_tx.borrow() != online {
            tracing::debug!("changing online mode to {}", if online { "online" } else { "offline" });
            let _ = self.online_tx.send(online);
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

}

impl Drop for UpdateService {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
        self.drain.abort();
    }
}

/// The shared HTTP clients: one honoring the configured proxy, one for
/// requests flagged `no_proxy`.
#[derive(Clone)]
pub(crate) struct FetchClients {
    default: reqwest::Client,
    direct: reqwest::Client,
}

impl FetchClients {
    fn for_request(&self, request: &UpdateRequest) -> &reqwest::Client {
        if request.options.no_proxy {
            &self.direct
        } else {
            &self.default
        }
    }
}

fn build_clients(config: &CoreConfig) -> Result<FetchClients> {
    Ok(FetchClients {
        default: build_client(config, true)?,
        direct: build_client(config, false)?,
    })
}

fn build_client(config: &CoreConfig, use_proxy: bool) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SyndError::ConfigError(format!("Invalid user agent: {e}")))?,
    );

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.network_timeout);
    if !use_proxy {
        builder = builder.no_proxy();
    } else if let Some(proxy) = &config.proxy {
        let mut proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| SyndError::ConfigError(format!("Invalid proxy: {e}")))?;
        if !config.proxy_exceptions.is_empty() {
            proxy = proxy.no_proxy(reqwest::NoProxy::from_string(
                &config.proxy_exceptions.join(","),
            ));
        }
        builder = builder.proxy(proxy);
    }
    // With no configured proxy the system environment applies.
    builder
        .build()
        .map_err(|e| SyndError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

async fn worker_loop(
    queues: Arc<Queues>,
    mut online_rx: watch::Receiver<bool>,
    clients: FetchClients,
    results_tx: mpsc::UnboundedSender<Job>,
    reserved: bool,
) {
    loop {
        let mut job = if reserved {
            queues.pop_high_only().await
        } else {
            queues.pop_any().await
        };
        job.state = RequestState::Processing;

        // Block while offline; the fetch must not start until the gate
        // opens, even when the job arrived while we were already waiting on
        // the queue.
        if online_rx.wait_for(|online| *online).await.is_err() {
            return;
        }

        if job.callback.lock().unwrap().is_none() {
            tracing::debug!("freeing cancelled request ({})", job.request.source);
            continue;
        }

        tracing::debug!("processing received request ({}) state={:?}", job.request.source, job.state);
        let result = execute_request(clients.for_request(&job.request), &job.request).await;
        job.result = Some(result);
        if results_tx.send(job).is_err() {
            return;
        }
    }
}

/// Runs one request to completion: pipe command, local file, or HTTP, then
/// the optional filter pipeline.
pub(crate) async fn execute_request(
    client: &reqwest::Client,
    request: &UpdateRequest,
) -> UpdateResult {
    let mut result = if let Some(cmd) = request.source.strip_prefix('|') {
        execute_command(request, cmd).await
    } else if crate::uri::has_scheme(&request.source) && !request.source.starts_with("file://") {
        execute_http(client, request).await
    } else {
        execute_file(request).await
    };

    if result.data.as_ref().is_some_and(|d| !d.is_empty()) {
        if let Some(filter) = &request.filter_cmd {
            apply_filter(filter, &mut result).await;
        }
    }

    result
}

fn empty_result(request: &UpdateRequest) -> UpdateResult {
    UpdateResult {
        source: request.source.clone(),
        data: None,
        http_status: 0,
        return_code: ResultCode::Ok,
        update_state: request.update_state.clone(),
        content_type: None,
        filter_errors: None,
    }
}

/// `|command` sources: run the command and treat its stdout as the feed.
async fn execute_command(request: &UpdateRequest, cmd: &str) -> UpdateResult {
    let mut result = empty_result(request);
    tracing::debug!("executing command \"{}\"", cmd);

    match Command::new("sh").arg("-c").arg(cmd).kill_on_drop(true).output().await {
        Ok(output) if output.status.success() => {
            result.http_status = 200;
            result.data = Some(output.stdout);
        }
        Ok(_) => {
            result.http_status = 404;
            result.return_code = ResultCode::HttpError;
        }
        Err(e) => {
            tracing::warn!("could not run \"{}\": {}", cmd, e);
            result.http_status = 404;
            result.return_code = ResultCode::HttpError;
        }
    }
    result
}

/// Local file sources, with `file://` prefix and `#anchor` suffixes
/// stripped.
async fn execute_file(request: &UpdateRequest) -> UpdateResult {
    let mut result = empty_result(request);
    let path = request.source.strip_prefix("file://").unwrap_or(&request.source);
    let path = path.split('#').next().unwrap_or(path);

    match tokio::fs::read(path).await {
        Ok(data) if !data.is_empty() => {
            result.http_status = 200;
            result.data = Some(data);
        }
        Ok(_) => {
            // Exists but empty: not readable as a feed.
            result.http_status = 403;
            result.return_code = ResultCode::HttpError;
        }
        Err(_) => {
            result.http_status = 404;
            result.return_code = ResultCode::NotFound;
        }
    }
    result
}

async fn execute_http(client: &reqwest::Client, request: &UpdateRequest) -> UpdateResult {
    let mut result = empty_result(request);

    let mut builder = client
        .get(&request.source)
        .headers(request.update_state.conditional_headers());
    if let Some(username) = &request.options.username {
        builder = builder.basic_auth(username, request.options.password.as_deref());
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            result.return_code = classify_request_error(&e);
            tracing::warn!("request failed for {}: {:?}", request.source, e);
            return result;
        }
    };

    let status = response.status();
    result.http_status = status.as_u16();

    // reqwest follows redirects internally; a changed final URL stands in
    // for the permanent-redirect rewrite.
    let final_url = response.url().to_string();
    if final_url != request.source {
        result.source = final_url;
    }

    result.content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match status {
        StatusCode::OK => {
            result.update_state.etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            result.update_state.last_modified = response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match response.bytes().await {
                Ok(bytes) => result.data = Some(bytes.to_vec()),
                Err(e) => result.return_code = classify_request_error(&e),
            }
        }
        StatusCode::NOT_MODIFIED => {
            // Nothing new; the stored state stays valid.
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            result.return_code = ResultCode::AuthFailed;
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            result.return_code = ResultCode::NotFound;
        }
        _ => {
            result.return_code = ResultCode::HttpError;
        }
    }
    result
}

/// Maps transport-level errors onto the retry taxonomy.
fn classify_request_error(e: &reqwest::Error) -> ResultCode {
    if e.is_timeout() {
        return ResultCode::Timeout;
    }
    if e.is_connect() {
        let message = e.to_string().to_lowercase();
        if message.contains("dns") || message.contains("resolve") {
            return ResultCode::HostNotFound;
        }
        return ResultCode::ConnectionFailed;
    }
    if e.is_body() || e.is_decode() {
        return ResultCode::SocketError;
    }
    ResultCode::Unknown
}

/// Applies the post-fetch filter: XSLT stylesheets (via xsltproc) and
/// arbitrary commands, both fed the body on stdin. A failing filter records
/// its stderr; empty output leaves the body unchanged.
async fn apply_filter(filter: &str, result: &mut UpdateResult) {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;

    let mut command = if filter.ends_with(".xsl") {
        let mut c = Command::new("xsltproc");
        c.arg(filter).arg("-");
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(filter);
        c
    };

    let spawned = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            result.filter_errors = Some(format!("could not run filter \"{filter}\": {e}"));
            result.return_code = ResultCode::FilterError;
            return;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        let data = result.data.clone().unwrap_or_default();
        // Feed the body concurrently so a large document cannot deadlock on
        // full pipes.
        tokio::spawn(async move {
            let _ = stdin.write_all(&data).await;
        });
    }

    match child.wait_with_output().await {
        Ok(output) if output.status.success() => {
            if !output.stdout.is_empty() {
                result.data = Some(output.stdout);
            }
        }
        Ok(output) => {
            result.filter_errors = Some(format!(
                "\"{}\" exited with status {}: {}",
                filter,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr)
            ));
            result.return_code = ResultCode::FilterError;
        }
        Err(e) => {
            result.filter_errors = Some(format!("filter \"{filter}\" failed: {e}"));
            result.return_code = ResultCode::FilterError;
        }
    }
}

/// Delay before retry number `retries + 1`.
pub(crate) fn retry_delay(retries: u32) -> Duration {
    let mut delay = RETRY_MIN_DELAY;
    for _ in 0..retries {
        delay *= 3;
    }
    delay.min(RETRY_MAX_DELAY)
}

/// The single task that dispatches results to callbacks and requeues
/// retriable failures.
async fn drain_loop(
    mut results_rx: mpsc::UnboundedReceiver<Job>,
    queues: Arc<Queues>,
    retries_enabled: bool,
) {
    while let Some(mut job) = results_rx.recv().await {
        job.state = RequestState::Finished;

        // Abandoned requests (e.g. after feed deletion) are freed here.
        if job.callback.lock().unwrap().is_none() {
            tracing::debug!("freeing cancelled request ({})", job.request.source);
            continue;
        }

        let Some(result) = job.result.take() else {
            continue;
        };

        if result.return_code.is_retriable()
            && retries_enabled
            && job.request.allow_retries
            && job.retries < MAX_RETRIES
        {
            let delay = retry_delay(job.retries);
            tracing::warn!(
                "could not download \"{}\", retry #{} in {:?}",
                job.request.source,
                job.retries + 1,
                delay
            );
            // In case of a permanent redirect leading to a network error the
            // retry goes to the redirected source.
            job.request.source = result.source;
            job.retries += 1;
            job.result = None;
            let queues = Arc::clone(&queues);
            tokio::spawn(async move {
                sleep(delay).await;
                if job.callback.lock().unwrap().is_none() {
                    tracing::debug!(
                        "freeing request of cancelled retry #{} for \"{}\"",
                        job.retries,
                        job.request.source
                    );
                    return;
                }
                queues.push(job);
            });
            continue;
        }

        if let Some(callback) = job.callback.lock().unwrap().take() {
            callback(result);
        }
    }
}
