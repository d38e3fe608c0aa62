mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use syndikit::{
    CoreConfig, FeedCore, RequestPriority, StoreOperations, UpdateFlags, UpdateRequest,
    UpdateService,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::sleep;

fn small_pool_config() -> CoreConfig {
    CoreConfig {
        // One reserved high-priority worker plus exactly one normal worker,
        // so normal-queue ordering is deterministic.
        update_concurrency: 2,
        ..CoreConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_offline_gate_and_fifo_order() {
    let service = UpdateService::start(&small_pool_config()).unwrap();
    let finished: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    service.set_online(false);
    for i in 0..3u32 {
        let finished = Arc::clone(&finished);
        let request = UpdateRequest::new(format!("|echo {i}"));
        service.execute(request, move |_result| {
            finished.lock().unwrap().push(i);
        });
    }

    // Offline: nothing may start.
    sleep(Duration::from_millis(300)).await;
    assert!(finished.lock().unwrap().is_empty());
    assert!(!service.is_online());

    service.set_online(true);
    wait_until(|| finished.lock().unwrap().len() == 3).await;
    // FIFO within the priority class.
    assert_eq!(*finished.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_cancellation_prevents_callback() {
    let service = UpdateService::start(&small_pool_config()).unwrap();
    let fired = Arc::new(Mutex::new(false));

    service.set_online(false);
    let fired_clone = Arc::clone(&fired);
    let handle = service.execute(UpdateRequest::new("|echo never"), move |_| {
        *fired_clone.lock().unwrap() = true;
    });
    handle.cancel();
    assert!(handle.is_cancelled());

    service.set_online(true);
    sleep(Duration::from_millis(500)).await;
    assert!(!*fired.lock().unwrap());
}

#[tokio::test]
async fn test_high_priority_overtakes_queued_normal() {
    let service = UpdateService::start(&small_pool_config()).unwrap();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    service.set_online(false);

    let order_slow = Arc::clone(&order);
    service.execute(UpdateRequest::new("|sleep 0.4; echo slow"), move |_| {
        order_slow.lock().unwrap().push("normal-slow");
    });
    let order_late = Arc::clone(&order);
    service.execute(UpdateRequest::new("|echo late"), move |_| {
        order_late.lock().unwrap().push("normal-late");
    });
    let order_high = Arc::clone(&order);
    service.execute(
        UpdateRequest::new("|echo high").with_priority(RequestPriority::High),
        move |_| {
            order_high.lock().unwrap().push("high");
        },
    );

    service.set_online(true);
    wait_until(|| order.lock().unwrap().len() == 3).await;

    let order = order.lock().unwrap();
    let high_pos = order.iter().position(|s| *s == "high").unwrap();
    let late_pos = order.iter().position(|s| *s == "normal-late").unwrap();
    assert!(high_pos < late_pos, "high priority must not wait behind the normal queue: {order:?}");
}

#[tokio::test]
async fn test_feed_core_refresh_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig {
        cache_db_path: Some(dir.path().join("cache.db")),
        ..small_pool_config()
    };
    let core = FeedCore::new(config).unwrap();

    let fixture = common::fixture_path("rss/sample.rss");
    let node_id = core
        .subscribe(&format!("file://{}", fixture.display()), Default::default())
        .unwrap();

    let summary = core.update(&node_id, UpdateFlags::default()).await.unwrap();
    assert!(summary.available);
    assert_eq!(summary.new_count, 3);
    assert_eq!(summary.unread_count, 3);

    // Refreshing identical bytes merges to zero new items.
    let again = core.update(&node_id, UpdateFlags::default()).await.unwrap();
    assert!(again.available);
    assert_eq!(again.new_count, 0);
    assert_eq!(again.unread_count, 3);

    // The subscription picked up feed-level details.
    let subscription = core.subscription(&node_id).unwrap();
    assert_eq!(subscription.title.as_deref(), Some("Planet Example & Co"));
    assert_eq!(subscription.default_update_interval, 30);
    assert!(subscription.available);

    core.mark_all_read(&node_id).unwrap();
    assert_eq!(core.unread_count(&node_id).unwrap(), 0);

    // OPML export carries the node.
    let opml = core.export_opml().unwrap();
    assert!(opml.contains(&node_id), "{opml}");

    core.unsubscribe(&node_id).unwrap();
    assert!(core.load_itemset(&node_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_file_marks_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig {
        cache_db_path: Some(dir.path().join("cache.db")),
        ..small_pool_config()
    };
    let core = FeedCore::new(config).unwrap();

    let node_id = core
        .subscribe("file:///nonexistent/feed.xml", Default::default())
        .unwrap();
    // High priority skips the retry path, so the failure surfaces at once.
    let summary = core
        .update(&node_id, UpdateFlags { priority_high: true, ..Default::default() })
        .await
        .unwrap();
    assert!(!summary.available);
    assert_eq!(summary.http_status, 404);
    assert!(!core.subscription(&node_id).unwrap().available);
}

/// A one-connection-at-a-time HTTP server answering with a canned response
/// chosen per request; records the If-None-Match header of every request.
async fn spawn_feed_server(
    body: &'static str,
) -> (String, Arc<Mutex<Vec<Option<String>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));

    let seen_server = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buffer = vec![0u8; 8192];
            let n = stream.read(&mut buffer).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buffer[..n]).into_owned();

            let if_none_match = request
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("if-none-match")
                        .then(|| value.trim().to_string())
                });
            let matched = if_none_match.as_deref() == Some("\"abc\"");
            seen_server.lock().unwrap().push(if_none_match);

            let response = if matched {
                "HTTP/1.1 304 Not Modified\r\nETag: \"abc\"\r\nContent-Length: 0\r\n\r\n"
                    .to_string()
            } else {
                format!(
                    "HTTP/1.1 200 OK\r\nETag: \"abc\"\r\nContent-Type: text/xml\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
            };
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}/feed"), seen)
}

const SERVER_RSS: &str = r#"<rss version="2.0"><channel><title>Served</title>
<item><guid isPermaLink="false">s1</guid><title>One</title></item>
<item><guid isPermaLink="false">s2</guid><title>Two</title></item>
</channel></rss>"#;

#[tokio::test]
async fn test_conditional_get_and_304() {
    let (url, seen) = spawn_feed_server(SERVER_RSS).await;

    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig {
        cache_db_path: Some(dir.path().join("cache.db")),
        ..small_pool_config()
    };
    let core = FeedCore::new(config).unwrap();
    let node_id = core.subscribe(&url, Default::default()).unwrap();

    // First fetch: no conditional header, 200, items stored, ETag kept.
    let first = core.update(&node_id, UpdateFlags::default()).await.unwrap();
    assert_eq!(first.http_status, 200);
    assert_eq!(first.new_count, 2);
    assert_eq!(
        core.subscription(&node_id).unwrap().update_state.etag.as_deref(),
        Some("\"abc\"")
    );

    // Second fetch sends If-None-Match and gets a 304; the store must be
    // untouched.
    let second = core.update(&node_id, UpdateFlags::default()).await.unwrap();
    assert!(second.not_modified);
    assert_eq!(second.new_count, 0);
    assert_eq!(core.load_itemset(&node_id).unwrap().len(), 2);
    assert!(core.subscription(&node_id).unwrap().available);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], None);
    assert_eq!(seen[1].as_deref(), Some("\"abc\""));
    // The ETag survives the 304.
    assert_eq!(
        core.subscription(&node_id).unwrap().update_state.etag.as_deref(),
        Some("\"abc\"")
    );
}

#[tokio::test]
async fn test_auth_failure_pauses_schedule() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buffer = vec![0u8; 4096];
            let _ = stream.read(&mut buffer).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .await;
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig {
        cache_db_path: Some(dir.path().join("cache.db")),
        ..small_pool_config()
    };
    let core = FeedCore::new(config).unwrap();
    let node_id = core
        .subscribe(&format!("http://{addr}/private"), Default::default())
        .unwrap();

    let summary = core.update(&node_id, UpdateFlags::default()).await.unwrap();
    assert!(!summary.available);
    assert_eq!(summary.http_status, 401);

    let subscription = core.subscription(&node_id).unwrap();
    assert!(subscription.auth_failed);
    // New credentials re-enable scheduling.
    core.set_credentials(&node_id, Some("user".into()), Some("pass".into()))
        .unwrap();
    assert!(!core.subscription(&node_id).unwrap().auth_failed);
}
