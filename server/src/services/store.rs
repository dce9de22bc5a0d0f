use anyhow::Context;
use async_trait::async_trait;
use bootstrap::{Export, ServiceContext, ServiceDescriptor, ServiceError, ServiceHandler};
use std::sync::Arc;

use crate::config::MongoStoreSettings;
use crate::db::{InMemoryAccountStore, MongoDbContext, SharedStore};

/// `store::memory`: accounts live only as long as the process.
pub struct MemoryStoreService {
    name: String,
    store: Option<InMemoryAccountStore>,
}

impl MemoryStoreService {
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Result<Self, ServiceError> {
        Ok(Self {
            name: descriptor.name.clone(),
            store: None,
        })
    }
}

#[async_trait]
impl ServiceHandler for MemoryStoreService {
    async fn initialize(&mut self, _ctx: &ServiceContext) -> Result<(), ServiceError> {
        self.store = Some(InMemoryAccountStore::new());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        log::info!("In-memory account store `{}` ready", self.name);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        if let Some(store) = self.store.take() {
            log::info!(
                "In-memory account store `{}` released {} account(s)",
                self.name,
                store.len()
            );
        }
        Ok(())
    }

    fn export(&self) -> Option<Export> {
        self.store.clone().map(|store| {
            let shared: SharedStore = Arc::new(store);
            Arc::new(shared) as Export
        })
    }
}

/// `store::mongo`: accounts in a MongoDB collection with a unique username index.
pub struct MongoStoreService {
    name: String,
    settings: MongoStoreSettings,
    context: Option<MongoDbContext>,
}

impl MongoStoreService {
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Result<Self, ServiceError> {
        Ok(Self {
            name: descriptor.name.clone(),
            settings: descriptor.settings()?,
            context: None,
        })
    }

    fn context(&self) -> Result<&MongoDbContext, ServiceError> {
        self.context
            .as_ref()
            .ok_or_else(|| ServiceError::Other(anyhow::anyhow!("store `{}` is not initialized", self.name)))
    }
}

#[async_trait]
impl ServiceHandler for MongoStoreService {
    async fn initialize(&mut self, _ctx: &ServiceContext) -> Result<(), ServiceError> {
        log::info!("Connecting to MongoDB at {}...", self.settings.uri);
        let context = MongoDbContext::connect(
            &self.settings.uri,
            &self.settings.database,
            self.settings.timeout(),
        )
        .await
        .with_context(|| format!("invalid MongoDB settings for `{}`", self.name))?;

        self.context = Some(context);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        let context = self.context()?;

        context
            .ping()
            .await
            .with_context(|| format!("MongoDB at {} is unreachable", self.settings.uri))?;

        log::info!("Initializing database indexes...");
        context
            .init_indexes(&self.settings.collection)
            .await
            .context("failed to initialize database indexes")?;

        log::info!(
            "MongoDB store `{}` ready ({}.{})",
            self.name,
            self.settings.database,
            self.settings.collection
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        if let Some(context) = self.context.take() {
            context.shutdown().await;
            log::info!("MongoDB store `{}` disconnected", self.name);
        }
        Ok(())
    }

    fn export(&self) -> Option<Export> {
        self.context.as_ref().map(|context| {
            let shared: SharedStore = Arc::new(context.accounts(&self.settings.collection));
            Arc::new(shared) as Export
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Account;
    use bootstrap::HandlerRef;

    #[tokio::test]
    async fn test_memory_store_exports_shared_store() {
        let descriptor = ServiceDescriptor::new("db", HandlerRef::new("store", "memory"));
        let mut service = MemoryStoreService::from_descriptor(&descriptor).unwrap();
        assert!(service.export().is_none());

        service.initialize(&ServiceContext::new("db")).await.unwrap();
        service.start().await.unwrap();

        let export = service.export().unwrap();
        let store = export.downcast_ref::<SharedStore>().unwrap().clone();
        store
            .insert(&Account::new("alice".to_string(), "hash".to_string()))
            .await
            .unwrap();
        assert!(store.find_by_username("alice").await.unwrap().is_some());

        service.stop().await.unwrap();
        assert!(service.export().is_none());
    }

    #[test]
    fn test_mongo_store_rejects_bad_settings() {
        let descriptor = ServiceDescriptor::new("db", HandlerRef::new("store", "mongo"))
            .with_setting("timeout_ms", "soon");
        assert!(matches!(
            MongoStoreService::from_descriptor(&descriptor),
            Err(ServiceError::Config(_))
        ));
    }
}
