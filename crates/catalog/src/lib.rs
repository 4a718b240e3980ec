//! Courier operation catalog.
//!
//! Supplies the descriptors a [`courier_core::Registry`] is built from: a
//! fixed set of built-in operations against the remote video service, and
//! operator-supplied catalogs loaded from JSON files.
//!
//! ## Architectural Layer
//!
//! **Configuration data.** Nothing here sends a request. Descriptors are plain
//! data; validation happens when they are registered.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`builtin`] | Weekly-ranking and partition operations |
//! | [`file`] | JSON catalog parsing and loading |

pub mod builtin;
pub mod file;

pub use builtin::{builtin, partition, register_builtin, weekly_ranking, API_BASE};
pub use file::{load_catalog, parse_catalog, CatalogError};
