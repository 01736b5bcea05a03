//! Purpose: Library crate behind the `mongofixture` CLI and its tests.
//! Exports: `api` (loader, dispatcher, stores), `core` (scanner, resolver, normalizer, errors).
//! Role: Streams extended JSON fixture files into MongoDB collections.
//! Invariants: `core` performs no network I/O; `api` owns connections.
//! Invariants: Modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
mod json;
