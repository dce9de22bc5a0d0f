use async_trait::async_trait;
use bson::doc;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use std::time::Duration;

use super::{Account, AccountStore, StoreError};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDbContext {
    client: Client,
    db: Database,
}

impl MongoDbContext {
    pub fn new(client: Client, database_name: &str) -> Self {
        Self {
            db: client.database(database_name),
            client,
        }
    }

    /// Builds a client whose connect and server-selection waits are bounded by
    /// `timeout`, so an unreachable server surfaces as an error instead of a hang.
    pub async fn connect(uri: &str, database_name: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("identity-server".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        Ok(Self::new(client, database_name))
    }

    pub fn accounts(&self, collection: &str) -> MongoAccountStore {
        MongoAccountStore {
            collection: self.db.collection(collection),
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    pub async fn init_indexes(&self, collection: &str) -> Result<(), StoreError> {
        // Username uniqueness is enforced by the server, not by a read-then-write.
        let username_index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<Account>(collection)
            .create_index(username_index)
            .await?;

        log::info!("Database indexes created successfully");
        Ok(())
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[derive(Clone)]
pub struct MongoAccountStore {
    collection: Collection<Account>,
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        match self.collection.insert_one(account).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let account = self
            .collection
            .find_one(doc! { "username": username })
            .await?;
        Ok(account)
    }

    async fn delete_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let result = self
            .collection
            .delete_one(doc! { "username": username })
            .await?;
        Ok(result.deleted_count > 0)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}
