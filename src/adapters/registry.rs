//! Adapter lookup table built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::rate_limit::RateLimiter;
use crate::repositories::EntityLinkRepository;
use crate::services::ServiceId;
use crate::token_manager::TokenManager;
use crate::api_client::ApiClient;

use super::crm::CrmAdapter;
use super::rest::RestAdapter;
use super::ServiceAdapter;

/// Registry of one adapter per connected service.
pub struct AdapterRegistry {
    adapters: HashMap<ServiceId, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    /// Build adapters for every known service.
    pub fn build(
        tokens: Arc<TokenManager>,
        rate_limiter: Arc<RateLimiter>,
        links: Arc<EntityLinkRepository>,
        config: Arc<AppConfig>,
    ) -> Result<Self, EngineError> {
        let mut adapters: HashMap<ServiceId, Arc<dyn ServiceAdapter>> = HashMap::new();

        for service in ServiceId::ALL {
            let client = ApiClient::new(
                service,
                Arc::clone(&tokens),
                Arc::clone(&rate_limiter),
                Arc::clone(&config),
            )?;
            let adapter: Arc<dyn ServiceAdapter> = match service {
                ServiceId::Crm => Arc::new(CrmAdapter::new(client, Arc::clone(&links))),
                _ => Arc::new(RestAdapter::new(service, client, Arc::clone(&links))),
            };
            adapters.insert(service, adapter);
        }

        Ok(Self { adapters })
    }

    pub fn get(&self, service: ServiceId) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(&service).cloned()
    }
}
