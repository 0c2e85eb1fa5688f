//! reportsync common library
//!
//! Shared utilities for the reportsync workspace.
//!
//! # Overview
//!
//! - **Fingerprints**: stable content digests used as deduplication keys
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use reportsync_common::fingerprint::fingerprint;
//!
//! let hash = fingerprint(Some("/home"));
//! assert_eq!(hash.as_deref().map(str::len), Some(32));
//! assert_eq!(fingerprint(None), None);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod fingerprint;
pub mod logging;
