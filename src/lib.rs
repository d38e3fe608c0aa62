//! # syndikit - the update and ingestion core of a feed aggregator
//!
//! syndikit implements the hard part of a desktop feed reader: fetching
//! subscription sources over the network, parsing the whole zoo of
//! syndication formats (RSS 0.9x/1.0/1.1/2.0, Atom 0.3/1.0, CDF, OPML),
//! normalizing them into one item model, merging new fetches against stored
//! items without losing read/flag state, persisting everything to SQLite,
//! and scheduling background refreshes with retry, backoff, and
//! conditional-GET support.
//!
//! ## Features
//!
//! - **Update engine** - priority queues, worker pool, online/offline gate,
//!   exponential retry, ETag/Last-Modified handling, filter pipelines
//! - **Format parsers** - tolerant DOM-based drivers with per-namespace
//!   extension handlers (Dublin Core, content, slash, syndication, media,
//!   and friends)
//! - **Merge engine** - stable item identity via GUIDs or synthetic hashes,
//!   user state preserved across refreshes
//! - **Item store** - two-table SQLite schema with prepared statements and
//!   bulk status operations
//!
//! ## Basic Usage
//!
//! ```no_run
//! use syndikit::{CoreConfig, FeedCore, StoreOperations, UpdateFlags};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let core = FeedCore::new(CoreConfig::default())?;
//!
//!     let node_id = core.subscribe("https://example.com/feed.xml", Default::default())?;
//!     let summary = core.update(&node_id, UpdateFlags::default()).await?;
//!     println!("{} new items, {} unread", summary.new_count, summary.unread_count);
//!
//!     for item in core.load_itemset(&node_id)? {
//!         println!("- {}", item.title.as_deref().unwrap_or("(untitled)"));
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod date;
mod db;
mod error;
mod feed;
mod item;
mod merge;
mod metadata;
mod subscription;
mod traits;
mod update;
mod uri;
mod xml;

pub mod parsing;

// Re-export core types and traits for a clean API
pub use crate::core::{FeedCore, RefreshSummary, UpdateFlags};
pub use config::CoreConfig;
pub use db::ItemStore;
pub use error::{Result, SyndError};
pub use feed::FeedHeader;
pub use item::Item;
pub use merge::{MergeResult, apply_max_items, merge_itemset};
pub use metadata::{KNOWN_KEYS, MetadataItem, MetadataList};
pub use subscription::{Subscription, SubscriptionOptions};
pub use traits::{StoreOperations, SubscriptionOperations};
pub use update::{
    RequestOptions, RequestPriority, RequestState, ResultCode, UpdateHandle, UpdateRequest,
    UpdateResult, UpdateService, UpdateState,
};

pub mod util {
    //! Small helpers shared by the parsers and useful to collaborators.
    pub use crate::date::{format_iso8601, parse_iso8601, parse_rfc822};
    pub use crate::uri::{build_url, sanitize};
    pub use crate::xml::{Element, ParsedDoc, parse_document, unhtmlize, xhtml_extract};
}

// Version information
/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
