//! Purpose: MongoDB implementation of the store collaborator.
//! Exports: `MongoConnector`, `MongoConnection`.
//! Role: Thin adapter over the official driver; no retries beyond the driver's own.
//! Invariants: `connect` pings the server so unreachable endpoints fail before any insert.
use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::Client;

use super::store::{Connection, Connector};
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Debug)]
pub struct MongoConnection {
    client: Client,
}

impl MongoConnection {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Connection = MongoConnection;

    async fn connect(&self, endpoint: &str) -> Result<MongoConnection, Error> {
        let client = Client::with_uri_str(endpoint).await.map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message(format!("invalid endpoint {endpoint:?}"))
                .with_source(err)
        })?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| {
                Error::new(ErrorKind::Connection)
                    .with_message(format!("failed to reach {endpoint}"))
                    .with_hint("Check --uri or MONGODB_URI and that the server is running.")
                    .with_source(err)
            })?;
        Ok(MongoConnection { client })
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), Error> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .insert_one(document)
            .await
            .map(|_| ())
            .map_err(|err| {
                Error::new(ErrorKind::Insert)
                    .with_message(format!("insert into {database}.{collection} rejected"))
                    .with_source(err)
            })
    }
}
