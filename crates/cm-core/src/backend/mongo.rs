//! MongoDB driver

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::connection::{DatabaseClient, Driver, SessionCollection, redact_endpoint};
use crate::{Error, Result};

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

async fn ping(client: &Client) -> mongodb::error::Result<Document> {
    client.database("admin").run_command(doc! { "ping": 1 }).await
}

/// [`Driver`] backed by the official `mongodb` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for MongoDriver {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn open(&self, endpoint: &str) -> Result<Arc<dyn DatabaseClient>> {
        let client = Client::with_uri_str(endpoint)
            .await
            .map_err(|e| Error::Connect(format!("invalid endpoint: {}", e)))?;

        // The driver connects lazily; a ping makes sure the endpoint answers.
        ping(&client)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        debug!(endpoint = %redact_endpoint(endpoint), "MongoDB endpoint answered ping");

        Ok(Arc::new(MongoClient {
            endpoint: endpoint.to_string(),
            client,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// One MongoDB client (connection pool) for a single endpoint
pub struct MongoClient {
    endpoint: String,
    client: Client,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DatabaseClient for MongoClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        ping(&self.client).await.is_ok()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.client.clone().shutdown().immediate(true).await;
        debug!(endpoint = %redact_endpoint(&self.endpoint), "MongoDB client shut down");
    }

    fn collection(&self, database: &str, collection: &str) -> Arc<dyn SessionCollection> {
        Arc::new(MongoSessionCollection {
            collection: self.client.database(database).collection::<Document>(collection),
            closed: Arc::clone(&self.closed),
            index_ready: OnceCell::new(),
        })
    }
}

struct MongoSessionCollection {
    collection: Collection<Document>,
    closed: Arc<AtomicBool>,
    index_ready: OnceCell<()>,
}

impl MongoSessionCollection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("connection is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Create the unique `sessionId` index once per collection handle
    ///
    /// Without it two concurrent upserts of a missing session can both
    /// insert a record.
    async fn ensure_index(&self) -> Result<()> {
        self.index_ready
            .get_or_try_init(|| async {
                self.collection
                    .create_index(session_index())
                    .await
                    .map_err(unavailable)?;
                debug!(collection = %self.collection.name(), "Ensured unique sessionId index");
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }
}

fn session_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "sessionId": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Run `op`, running it a second time if the first failure is `retryable`
///
/// A losing concurrent upsert fails with a duplicate key error; by then the
/// record exists and the retried push updates it.
async fn retry_once_if<T, E, F, Fut>(
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    match op().await {
        Err(e) if retryable(&e) => {
            warn!("Upsert lost a race on a new session, retrying");
            op().await
        }
        other => other,
    }
}

fn unavailable(e: mongodb::error::Error) -> Error {
    Error::StoreUnavailable(e.to_string())
}

#[async_trait]
impl SessionCollection for MongoSessionCollection {
    async fn find_session(&self, session_id: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        self.collection
            .find_one(doc! { "sessionId": session_id })
            .await
            .map_err(unavailable)
    }

    async fn push_message(&self, session_id: &str, message: Document) -> Result<()> {
        self.ensure_open()?;
        self.ensure_index().await?;

        let filter = doc! { "sessionId": session_id };
        let update = doc! { "$push": { "messages": message } };
        retry_once_if(is_duplicate_key, || {
            self.collection
                .update_one(filter.clone(), update.clone())
                .upsert(true)
                .into_future()
        })
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.collection
            .delete_one(doc! { "sessionId": session_id })
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
