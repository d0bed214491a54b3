//! Shared state for API handlers.

use super::error::ApiError;
use crate::config::{Config, Environment};
use crate::conversation::ConversationStore;
use crate::db::Db;
use crate::dispatch::Dispatcher;
use crate::files::{FileStore, VectorStores};
use crate::llm::LlmManager;

use std::sync::Arc;
use std::time::Duration;

/// State shared across all API handlers.
pub struct ApiState {
    pub environment: Environment,
    /// Budget for one chat turn before it is cancelled.
    pub request_timeout: Duration,
    /// Lowercase name of the header carrying the caller's email.
    pub user_header: String,
    pub conversations: ConversationStore,
    pub files: FileStore,
    pub vector_stores: VectorStores,
    pub dispatcher: Dispatcher,
}

impl ApiState {
    pub fn new(config: &Config, db: &Db, llm_manager: Arc<LlmManager>) -> Self {
        let dispatcher = Dispatcher::from_manager(&llm_manager, &config.chat.vector_store_id);
        Self::with_dispatcher(config, db, llm_manager, dispatcher)
    }

    /// State with an explicit dispatcher, for wiring in alternative providers.
    pub fn with_dispatcher(
        config: &Config,
        db: &Db,
        llm_manager: Arc<LlmManager>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            environment: config.environment,
            request_timeout: Duration::from_secs(config.chat.request_timeout_secs),
            user_header: config.user_header.clone(),
            conversations: ConversationStore::new(db.sqlite.clone()),
            files: FileStore::new(db.sqlite.clone()),
            vector_stores: VectorStores::new(db.sqlite.clone(), llm_manager),
            dispatcher,
        }
    }

    /// A 500 carrying `message`, with the error chain attached outside production.
    pub(super) fn internal_error(&self, message: &str, error: &crate::Error) -> ApiError {
        let response = ApiError::internal(message);
        if self.environment.is_production() {
            response
        } else {
            response.with_details(error_chain(error))
        }
    }
}

/// `error: cause: cause` for everything in the source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
