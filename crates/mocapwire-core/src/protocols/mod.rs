//! Protocol decoding modules.
//!
//! Each protocol follows a layered structure:
//! - `layout`: wire constants, ids and bit masks (source of truth)
//! - `reader`: bounds-checked byte access and protocol conventions
//! - `parser`: packet dispatch (no direct byte indexing)
//! - `error`: explicit, actionable faults
//!
//! Parsers are pure and contain no I/O; sources and analysis layers handle
//! file access and aggregation.

pub mod natnet;
