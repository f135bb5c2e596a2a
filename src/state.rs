use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    messaging::{MessagingService, PageLimits},
    storage::ObjectStorage,
    store::ConversationStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ConversationStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub messaging: MessagingService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ConversationStore>,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
    ) -> Self {
        let limits = PageLimits {
            default_limit: config.message_page_limit_default,
            max_limit: config.message_page_limit_max,
        };
        let messaging = MessagingService::new(store.clone(), storage.clone(), limits);
        Self {
            config: Arc::new(config),
            store,
            storage,
            jwt,
            messaging,
        }
    }

    pub fn attachment_url_ttl(&self) -> Duration {
        Duration::from_secs(self.config.attachment_url_expiry_minutes * 60)
    }
}
