use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{
    call,
    settings::SettingsRequest,
    RequestHandler, Service, ServiceError,
};
use crate::{
    models::{
        facts::{Fact, FactWithFavorites, NewFact},
        ledger::LedgerError,
    },
    repositories::{fact_check::FactChecker, FactStore, UserStore},
};

pub enum FactRequest {
    Submit {
        user_id: String,
        claim: String,
        response: oneshot::Sender<Result<Fact, ServiceError>>,
    },
    GetFact {
        id: String,
        response: oneshot::Sender<Result<FactWithFavorites, ServiceError>>,
    },
    DeleteFact {
        id: String,
        user_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct FactRequestHandler {
    users: Arc<dyn UserStore>,
    facts: Arc<dyn FactStore>,
    checker: Arc<dyn FactChecker>,
    settings_channel: mpsc::Sender<SettingsRequest>,
}

impl FactRequestHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        facts: Arc<dyn FactStore>,
        checker: Arc<dyn FactChecker>,
        settings_channel: mpsc::Sender<SettingsRequest>,
    ) -> Self {
        FactRequestHandler {
            users,
            facts,
            checker,
            settings_channel,
        }
    }

    async fn submit(&self, user_id: &str, claim: &str) -> Result<Fact, ServiceError> {
        let claim = claim.trim();
        if claim.is_empty() {
            return Err(ServiceError::BadRequest("Fact text is required".to_string()));
        }

        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        if user.credits <= 0 {
            return Err(LedgerError::InsufficientCredits.into());
        }

        let fact = self.check_and_store(user_id, claim).await.map_err(|e| match e {
            ServiceError::Database(_)
            | ServiceError::Internal(_)
            | ServiceError::Communication(..)
            | ServiceError::ExternalService(..) => {
                log::error!("Fact submission for user {} failed: {}", user_id, e);
                ServiceError::FactCheck(e.to_string())
            }
            other => other,
        })?;

        log::info!(
            "Stored fact {} for user {} ({}).",
            fact.id,
            user_id,
            fact.truth_status
        );
        Ok(fact)
    }

    async fn check_and_store(&self, user_id: &str, claim: &str) -> Result<Fact, ServiceError> {
        let config = call(&self.settings_channel, "Settings", |response| {
            SettingsRequest::Current { response }
        })
        .await?;

        let verdict = self.checker.check(&config, claim).await.map_err(|e| {
            log::error!("Fact check for user {} failed: {}", user_id, e);
            ServiceError::FactCheck(e.to_string())
        })?;

        // The balance is checked again under the row lock.
        let fact = self
            .facts
            .insert_fact_charging(NewFact {
                user_id: user_id.to_string(),
                title: claim.to_string(),
                verdict,
            })
            .await?;

        Ok(fact)
    }

    async fn get_fact(&self, id: &str) -> Result<FactWithFavorites, ServiceError> {
        self.facts
            .get_fact(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Fact not found".to_string()))
    }

    async fn delete_fact(&self, id: &str, user_id: &str) -> Result<(), ServiceError> {
        self.facts.delete_owned_fact(id, user_id).await?;

        log::info!("Deleted fact {} of user {}.", id, user_id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<FactRequest> for FactRequestHandler {
    async fn handle_request(&self, request: FactRequest) {
        match request {
            FactRequest::Submit {
                user_id,
                claim,
                response,
            } => {
                let _ = response.send(self.submit(&user_id, &claim).await);
            }
            FactRequest::GetFact { id, response } => {
                let _ = response.send(self.get_fact(&id).await);
            }
            FactRequest::DeleteFact {
                id,
                user_id,
                response,
            } => {
                let _ = response.send(self.delete_fact(&id, &user_id).await);
            }
        }
    }
}

pub struct FactService;

impl FactService {
    pub fn new() -> Self {
        FactService {}
    }
}

#[async_trait]
impl Service<FactRequest, FactRequestHandler> for FactService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            facts::{FactVerdict, Reference},
            settings::FactCheckDefaults,
        },
        repositories::{fact_check::MockFactChecker, memory::MemoryStore},
        services::settings::{SettingsRequestHandler, SettingsService},
    };

    fn verdict() -> FactVerdict {
        FactVerdict {
            truth_status: "True".to_string(),
            severity: "Low".to_string(),
            explanation: "Well documented.".to_string(),
            key_facts: vec!["Water boils at 100C at sea level.".to_string()],
            references: vec![Reference {
                title: "Encyclopedia".to_string(),
                url: "https://example.org/water".to_string(),
            }],
        }
    }

    fn settings_channel(store: Arc<MemoryStore>) -> mpsc::Sender<SettingsRequest> {
        let (settings_tx, mut settings_rx) = mpsc::channel(8);
        let handler = SettingsRequestHandler::new(
            store,
            FactCheckDefaults {
                url: "http://localhost/chat".to_string(),
                model: "sonar".to_string(),
                api_key: "file-key".to_string(),
                prompt: "file prompt".to_string(),
            },
        );
        tokio::spawn(async move {
            SettingsService::new().run(handler, &mut settings_rx).await;
        });

        settings_tx
    }

    fn handler(store: Arc<MemoryStore>, checker: MockFactChecker) -> FactRequestHandler {
        FactRequestHandler::new(
            store.clone(),
            store.clone(),
            Arc::new(checker),
            settings_channel(store),
        )
    }

    #[tokio::test]
    async fn submission_stores_fact_and_spends_one_credit() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 2);

        let mut checker = MockFactChecker::new();
        checker
            .expect_check()
            .withf(|config, claim| config.api_key == "file-key" && claim == "Water boils at 100C")
            .times(1)
            .returning(|_, _| Ok(verdict()));

        let fact = handler(store.clone(), checker)
            .submit(&user.id, "  Water boils at 100C ")
            .await
            .unwrap();

        assert_eq!(fact.title, "Water boils at 100C");
        assert_eq!(fact.user_id, user.id);
        assert_eq!(fact.references.0.len(), 1);
        assert_eq!(store.credits(&user.id), 1);
        assert_eq!(store.fact_count(), 1);
    }

    #[tokio::test]
    async fn zero_credits_never_reach_the_checker() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 0);

        let mut checker = MockFactChecker::new();
        checker.expect_check().never();

        let result = handler(store.clone(), checker)
            .submit(&user.id, "The moon is made of cheese")
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert_eq!(store.fact_count(), 0);
    }

    #[tokio::test]
    async fn balance_drained_during_check_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 1);

        let drain = store.clone();
        let user_id = user.id.clone();
        let mut checker = MockFactChecker::new();
        checker.expect_check().times(1).returning(move |_, _| {
            drain.set_credits(&user_id, 0);
            Ok(verdict())
        });

        let result = handler(store.clone(), checker)
            .submit(&user.id, "Water boils at 100C")
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert_eq!(store.fact_count(), 0);
        assert_eq!(store.credits(&user.id), 0);
    }

    #[tokio::test]
    async fn checker_failure_is_reported_uniformly() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 3);

        let mut checker = MockFactChecker::new();
        checker
            .expect_check()
            .returning(|_, _| Err(anyhow::anyhow!("no JSON object in completion")));

        let result = handler(store.clone(), checker)
            .submit(&user.id, "Water boils at 100C")
            .await;

        let error = result.unwrap_err();
        assert!(matches!(error, ServiceError::FactCheck(_)));
        assert_eq!(error.to_string(), "Something went wrong!");
        assert_eq!(store.credits(&user.id), 3);
    }

    #[tokio::test]
    async fn unavailable_settings_are_reported_uniformly() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 3);
        let mut checker = MockFactChecker::new();
        checker.expect_check().never();

        let (closed_tx, closed_rx) = mpsc::channel(1);
        drop(closed_rx);
        let handler = FactRequestHandler::new(
            store.clone(),
            store.clone(),
            Arc::new(checker),
            closed_tx,
        );

        let error = handler
            .submit(&user.id, "Water boils at 100C")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::FactCheck(_)));
        assert_eq!(error.to_string(), "Something went wrong!");
        assert_eq!(store.credits(&user.id), 3);
        assert_eq!(store.fact_count(), 0);
    }

    #[tokio::test]
    async fn empty_claim_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ada@example.com", 3);
        let mut checker = MockFactChecker::new();
        checker.expect_check().never();

        let result = handler(store, checker).submit(&user.id, "   ").await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn only_the_owner_deletes_a_fact() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 0);
        let bob = store.seed_user("bob@example.com", 0);
        let fact = store.seed_fact(&ada.id, "The sky is blue");
        store.add_favorite(&bob.id, &fact.id).await.unwrap();
        let handler = handler(store.clone(), MockFactChecker::new());

        let denied = handler.delete_fact(&fact.id, &bob.id).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));
        assert_eq!(store.fact_count(), 1);
        assert_eq!(
            handler.get_fact(&fact.id).await.unwrap().favorite_users,
            vec![bob.id.clone()]
        );

        handler.delete_fact(&fact.id, &ada.id).await.unwrap();
        assert_eq!(store.fact_count(), 0);
        assert_eq!(store.favorite_count(), 0);
        assert!(matches!(
            handler.get_fact(&fact.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            handler.delete_fact(&fact.id, &ada.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
