#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A concurrent, in-process cache bounded by a weight budget, admitting
//! and evicting entries under the W-TinyLFU policy: a small LRU window
//! fronting a segmented main LRU (Probation + Protected), gated by a
//! count-min frequency sketch.
//!
//! Reads and writes never block on policy bookkeeping. Instead, they
//! push a task onto one of two bounded ring buffers and let a single
//! dedicated maintenance thread reconcile deque membership, the sketch,
//! and size-based eviction in the background. A four-state drain
//! coordinator guarantees at most one maintenance run is ever in flight.
//!
//! # Examples
//!
//! ```
//! use tinylfu_cache::Cache;
//!
//! let cache: Cache<String, String> = Cache::builder(10_000).build().unwrap();
//! cache.put("one".to_string(), "1".to_string());
//! assert_eq!(cache.get(&"one".to_string()).as_deref().map(String::as_str), Some("1"));
//! ```
//!
//! # Minimum Supported Rust Version
//!
//! This crate's minimum supported Rust version (MSRV) is 1.76.0.

pub(crate) mod builder;
pub(crate) mod cache;
pub(crate) mod common;
pub(crate) mod error;
pub(crate) mod maintenance;
pub(crate) mod node;
pub(crate) mod policy;
pub(crate) mod store;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::CacheError;
pub use policy::Policy;
