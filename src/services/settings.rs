use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::settings::{FactCheckConfig, FactCheckDefaults, SettingsRecord, SettingsUpdate},
    repositories::SettingsStore,
};

pub enum SettingsRequest {
    /// Effective configuration for one fact-check submission.
    Current {
        response: oneshot::Sender<Result<Arc<FactCheckConfig>, ServiceError>>,
    },
    GetRecord {
        response: oneshot::Sender<Result<Option<SettingsRecord>, ServiceError>>,
    },
    Update {
        update: SettingsUpdate,
        response: oneshot::Sender<Result<SettingsRecord, ServiceError>>,
    },
    Reload {
        response: oneshot::Sender<Result<Arc<FactCheckConfig>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct SettingsRequestHandler {
    store: Arc<dyn SettingsStore>,
    defaults: Arc<FactCheckDefaults>,
    snapshot: Arc<RwLock<Option<Arc<FactCheckConfig>>>>,
}

impl SettingsRequestHandler {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: FactCheckDefaults) -> Self {
        SettingsRequestHandler {
            store,
            defaults: Arc::new(defaults),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    async fn current(&self) -> Result<Arc<FactCheckConfig>, ServiceError> {
        if let Some(config) = self.snapshot.read().await.as_ref() {
            return Ok(config.clone());
        }

        self.reload().await
    }

    async fn reload(&self) -> Result<Arc<FactCheckConfig>, ServiceError> {
        let mut snapshot = self.snapshot.write().await;
        let record = self.store.get_settings().await?;
        let config = Arc::new(FactCheckConfig::resolve(&self.defaults, record.as_ref()));

        log::info!("Loaded fact-check settings v{}.", config.version);
        *snapshot = Some(config.clone());
        Ok(config)
    }

    async fn get_record(&self) -> Result<Option<SettingsRecord>, ServiceError> {
        Ok(self.store.get_settings().await?)
    }

    async fn update(&self, update: SettingsUpdate) -> Result<SettingsRecord, ServiceError> {
        let now = chrono::Utc::now().naive_utc();
        let record = self.store.upsert_settings(&update, now).await?;

        self.reload().await?;
        Ok(record)
    }
}

#[async_trait]
impl RequestHandler<SettingsRequest> for SettingsRequestHandler {
    async fn handle_request(&self, request: SettingsRequest) {
        match request {
            SettingsRequest::Current { response } => {
                let _ = response.send(self.current().await);
            }
            SettingsRequest::GetRecord { response } => {
                let _ = response.send(self.get_record().await);
            }
            SettingsRequest::Update { update, response } => {
                let _ = response.send(self.update(update).await);
            }
            SettingsRequest::Reload { response } => {
                let _ = response.send(self.reload().await);
            }
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub fn new() -> Self {
        SettingsService {}
    }
}

#[async_trait]
impl Service<SettingsRequest, SettingsRequestHandler> for SettingsService {}
