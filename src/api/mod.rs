//! Purpose: Define the public Rust API for loading extended JSON fixtures.
//! Exports: Loader, dispatcher, store collaborators, cancellation, and error types.
//! Role: Public, additive-only surface over the `core` pipeline stages.
//! Invariants: Every load goes through `Loader`, one connection per load.
//! Invariants: Store implementations are swappable behind `Connector`.

mod context;
mod endpoint;
mod fixture;
mod loader;
mod memory;
mod mongo;
mod store;

pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::scan::ScanOptions;
pub use context::{CancelHandle, LoadContext};
pub use endpoint::{DEFAULT_ENDPOINT, ENDPOINT_ENV, resolve_endpoint};
pub use fixture::{
    BatchOutcome, Dispatcher, Fixture, FixtureReport, collection_name, load, load_all,
};
pub use loader::{LoadOutcome, LoadState, Loader, LoaderConfig};
pub use memory::{MemoryConnection, MemoryStore};
pub use mongo::{MongoConnection, MongoConnector};
pub use store::{Connection, Connector};
