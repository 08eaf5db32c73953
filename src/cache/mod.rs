//! Template database cache
//!
//! Provides content-addressed caching of fully initialized databases keyed by
//! recipe fingerprints. Building a database from scratch is slow; cloning a
//! cached template is fast.
//!
//! # Model
//!
//! - Template name is `<prefix>-<fingerprint>`: one template per recipe
//! - Timestamps live in the database comment, re-read on every call
//! - Every clone "touches" the template, so eviction follows last use
//!
//! # Eviction
//!
//! | Policy | Keeps | Disabled when |
//! |--------|-------|---------------|
//! | `trim_size(n)` | the `n` most recently used | `n < 0` |
//! | `trim_age(d)` | templates used after `now - d` | `d < 0` |

pub mod clock;
pub mod entry;
pub mod fingerprint;
pub mod inventory;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{entry_name, validate_prefix, CacheEntry, EntryMetadata};
pub use fingerprint::{fingerprint, Fingerprint, Recipe, FINGERPRINT_LEN};
pub use manager::{days, EvictionPolicy, TemplateCache, TrimReport};
