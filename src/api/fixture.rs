//! Purpose: Map fixture files to collections and run one fresh loader per fixture.
//! Exports: `Fixture`, `Dispatcher`, `FixtureReport`, `BatchOutcome`, `collection_name`, `load`, `load_all`.
//! Role: Public entry point mirroring `load(ctx, endpoint, fixture)`.
//! Invariants: Collection name is the file name without its last extension.
//! Invariants: Every dispatch opens its own connection; nothing is cached or retried.
//! Invariants: Re-dispatching a fixture inserts its documents again (no dedup).
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::context::LoadContext;
use super::loader::{LoadOutcome, Loader, LoaderConfig};
use super::mongo::MongoConnector;
use super::store::Connector;
use crate::core::error::{Error, ErrorKind};
use crate::core::scan::ScanOptions;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub path: PathBuf,
    pub database: String,
}

impl Fixture {
    pub fn new(path: impl Into<PathBuf>, database: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            database: database.into(),
        }
    }

    pub fn collection(&self) -> Result<String, Error> {
        collection_name(&self.path)
    }
}

/// `fixtures/users.json` -> `users`; `dump.2020.json` -> `dump.2020`.
pub fn collection_name(path: &Path) -> Result<String, Error> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("cannot derive a collection name from fixture path")
                .with_path(path)
        })
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FixtureReport {
    pub path: PathBuf,
    pub database: String,
    pub collection: String,
    #[serde(flatten)]
    pub outcome: LoadOutcome,
}

/// Reports for fixtures that loaded, plus the error that stopped the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<FixtureReport>,
    pub error: Option<Error>,
}

impl BatchOutcome {
    pub fn into_result(self) -> Result<Vec<FixtureReport>, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.reports),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dispatcher<C> {
    connector: C,
    endpoint: String,
    scan: ScanOptions,
}

impl Dispatcher<MongoConnector> {
    pub fn mongo(endpoint: impl Into<String>) -> Self {
        Self::new(MongoConnector::new(), endpoint)
    }
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C, endpoint: impl Into<String>) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            scan: ScanOptions::default(),
        }
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn dispatch(
        &self,
        ctx: &LoadContext,
        fixture: &Fixture,
    ) -> Result<FixtureReport, Error> {
        let collection = fixture.collection()?;
        self.dispatch_into(ctx, fixture, collection).await
    }

    /// Like `dispatch`, but with an explicit collection instead of the derived one.
    pub async fn dispatch_into(
        &self,
        ctx: &LoadContext,
        fixture: &Fixture,
        collection: String,
    ) -> Result<FixtureReport, Error> {
        let mut loader = Loader::new(LoaderConfig {
            endpoint: self.endpoint.clone(),
            path: fixture.path.clone(),
            database: fixture.database.clone(),
            collection: collection.clone(),
        })
        .with_scan_options(self.scan);
        let outcome = loader.load_with(&self.connector, ctx).await?;
        Ok(FixtureReport {
            path: fixture.path.clone(),
            database: fixture.database.clone(),
            collection,
            outcome,
        })
    }

    /// Dispatch fixtures in order, stopping at the first failure.
    pub async fn dispatch_all(&self, ctx: &LoadContext, fixtures: &[Fixture]) -> BatchOutcome {
        let mut batch = BatchOutcome::default();
        for fixture in fixtures {
            match self.dispatch(ctx, fixture).await {
                Ok(report) => batch.reports.push(report),
                Err(err) => {
                    batch.error = Some(err);
                    break;
                }
            }
        }
        batch
    }
}

/// Load `fixture` into MongoDB at `endpoint`, using a new connection for this call.
pub async fn load(
    ctx: &LoadContext,
    endpoint: &str,
    fixture: &Fixture,
) -> Result<LoadOutcome, Error> {
    Dispatcher::mongo(endpoint)
        .dispatch(ctx, fixture)
        .await
        .map(|report| report.outcome)
}

/// Load `fixtures` in order into MongoDB at `endpoint`, one connection each.
pub async fn load_all(ctx: &LoadContext, endpoint: &str, fixtures: &[Fixture]) -> BatchOutcome {
    Dispatcher::mongo(endpoint)
        .dispatch_all(ctx, fixtures)
        .await
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, Fixture, collection_name, load_all};
    use crate::api::context::LoadContext;
    use crate::api::memory::MemoryStore;
    use crate::core::error::ErrorKind;
    use std::path::Path;

    #[test]
    fn collection_is_file_stem() {
        assert_eq!(collection_name(Path::new("testdata/data.json")).unwrap(), "data");
        assert_eq!(collection_name(Path::new("users")).unwrap(), "users");
        assert_eq!(
            collection_name(Path::new("/tmp/dump.2020.json")).unwrap(),
            "dump.2020"
        );
        assert_eq!(collection_name(Path::new(".hidden")).unwrap(), ".hidden");
    }

    #[test]
    fn pathless_fixture_is_usage_error() {
        let err = collection_name(Path::new("/")).expect_err("no stem");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn dispatch_all_stops_at_first_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let good = temp.path().join("good.json");
        std::fs::write(&good, "{\"a\":1}").expect("write");
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(store.clone(), "memory://");
        let fixtures = [
            Fixture::new(&good, "db"),
            Fixture::new(temp.path().join("missing.json"), "db"),
            Fixture::new(&good, "db"),
        ];
        let batch = dispatcher
            .dispatch_all(&LoadContext::background(), &fixtures)
            .await;
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.reports[0].collection, "good");
        assert_eq!(
            batch.error.as_ref().map(|err| err.kind()),
            Some(ErrorKind::FileAccess)
        );
        assert_eq!(store.count("db", "good"), 1);
    }

    #[tokio::test]
    async fn load_all_reports_missing_file_without_connecting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fixtures = [Fixture::new(temp.path().join("absent.json"), "db")];
        let batch = load_all(
            &LoadContext::background(),
            "mongodb://127.0.0.1:1",
            &fixtures,
        )
        .await;
        assert!(batch.reports.is_empty());
        let err = batch.into_result().expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::FileAccess);
    }
}
