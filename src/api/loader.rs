//! Purpose: Load one fixture file into one collection, a document at a time.
//! Exports: `Loader`, `LoaderConfig`, `LoadState`, `LoadOutcome`.
//! Role: Orchestrates scan -> decode -> normalize -> insert over a single connection.
//! Invariants: Insertion order equals file order; no stage overlaps another.
//! Invariants: The source file is opened before connecting; a missing file never touches the store.
//! Invariants: The first failure stops the load; earlier inserts stay committed.
//! Invariants: A loader runs at most once (Idle -> Running -> Done | Failed).
#![allow(clippy::result_large_err)]

use std::fs::File;
use std::path::PathBuf;

use bson::Document;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::LoadContext;
use super::mongo::MongoConnector;
use super::store::{Connection, Connector};
use crate::core::error::{Error, ErrorKind};
use crate::core::normalize::normalize;
use crate::core::scan::{ObjectScanner, RawObject, ScanOptions};
use crate::json::parse;

/// Everything a load needs, fixed before any I/O.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoaderConfig {
    pub endpoint: String,
    pub path: PathBuf,
    pub database: String,
    pub collection: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoadState {
    Idle,
    Running,
    Done,
    Failed,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LoadOutcome {
    /// Documents inserted.
    pub documents: u64,
    /// Source bytes consumed.
    pub bytes: u64,
}

#[derive(Debug)]
pub struct Loader {
    config: LoaderConfig,
    scan: ScanOptions,
    state: LoadState,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            scan: ScanOptions::default(),
            state: LoadState::Idle,
        }
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Load into MongoDB at the configured endpoint.
    pub async fn load(&mut self, ctx: &LoadContext) -> Result<LoadOutcome, Error> {
        self.load_with(&MongoConnector::new(), ctx).await
    }

    /// Load through an arbitrary store; opens exactly one connection.
    pub async fn load_with<C: Connector>(
        &mut self,
        connector: &C,
        ctx: &LoadContext,
    ) -> Result<LoadOutcome, Error> {
        if self.state != LoadState::Idle {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("loader already ran (state: {:?})", self.state))
                .with_path(&self.config.path)
                .with_hint("Construct a new Loader for each load."));
        }
        self.state = LoadState::Running;
        info!(
            path = %self.config.path.display(),
            database = %self.config.database,
            collection = %self.config.collection,
            "loading fixture"
        );

        let result = self
            .run(connector, ctx)
            .await
            .map_err(|err| err.with_path(&self.config.path));
        match &result {
            Ok(outcome) => {
                self.state = LoadState::Done;
                info!(
                    path = %self.config.path.display(),
                    collection = %self.config.collection,
                    documents = outcome.documents,
                    "fixture loaded"
                );
            }
            Err(err) => {
                self.state = LoadState::Failed;
                warn!(
                    path = %self.config.path.display(),
                    collection = %self.config.collection,
                    error = %err,
                    "fixture load failed"
                );
            }
        }
        result
    }

    async fn run<C: Connector>(
        &self,
        connector: &C,
        ctx: &LoadContext,
    ) -> Result<LoadOutcome, Error> {
        let config = &self.config;
        validate(config)?;

        let file = File::open(&config.path).map_err(|err| {
            Error::new(ErrorKind::FileAccess)
                .with_message("failed to open fixture")
                .with_source(err)
        })?;

        ctx.check()?;
        let connection = ctx.bound(connector.connect(&config.endpoint)).await?;

        let mut scanner = ObjectScanner::with_options(file, self.scan);
        let mut outcome = LoadOutcome::default();
        loop {
            ctx.check()
                .map_err(|err| err.at_document(outcome.documents + 1, scanner.position()))?;
            let Some(raw) = scanner.next_object()? else {
                break;
            };
            let document = decode_document(&raw)?;
            ctx.bound(
                connection.insert_one(&config.database, &config.collection, document),
            )
            .await
            .map_err(|err| err.at_document(raw.index, raw.offset))?;

            outcome.documents += 1;
            outcome.bytes = scanner.position();
            debug!(index = raw.index, offset = raw.offset, "inserted document");
        }
        outcome.bytes = scanner.position();
        Ok(outcome)
    }
}

fn validate(config: &LoaderConfig) -> Result<(), Error> {
    if config.database.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("database name is empty"));
    }
    if config.collection.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("collection name is empty"));
    }
    Ok(())
}

fn decode_document(raw: &RawObject) -> Result<Document, Error> {
    let value: Value = parse::decode(&raw.bytes).map_err(|err| {
        let offset = raw.offset + parse::error_offset(&raw.bytes, &err).unwrap_or(0);
        Error::new(ErrorKind::Parse)
            .with_message("invalid json in fixture object")
            .with_hint(parse::hint_for_error(&err, "fixture object"))
            .with_index(raw.index)
            .with_offset(offset)
            .with_source(err)
    })?;
    normalize(value).map_err(|err| err.at_document(raw.index, raw.offset))
}
