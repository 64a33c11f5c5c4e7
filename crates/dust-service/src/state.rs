//! Application state.

use std::sync::Arc;

use dust_coord::{CoordStore, EventBus, LockManager};
use dust_store::PgStore;

use crate::apps::{AppDirectoryClient, PricingClient};
use crate::auth::AuthKeys;
use crate::config::ServiceConfig;
use crate::ledger::Ledger;

/// Application state shared across handlers.
///
/// Everything here is constructed once at process start and torn down at
/// process stop; there is no ambient global state.
pub struct AppState {
    /// Service configuration.
    pub config: ServiceConfig,

    /// The durable store.
    pub store: Arc<PgStore>,

    /// The transaction processor.
    pub ledger: Ledger,

    /// App-directory validity lookups.
    pub apps: AppDirectoryClient,

    /// Action pricing lookups; `None` disables price verification.
    pub pricing: Option<PricingClient>,

    /// Balance-change event bus.
    pub events: EventBus,

    /// JWKS cache for end-user JWT validation.
    pub auth_keys: AuthKeys,
}

impl AppState {
    /// Wire the state from its injected components.
    #[must_use]
    pub fn new(store: Arc<PgStore>, coord: Arc<dyn CoordStore>, config: ServiceConfig) -> Self {
        let events = EventBus::new();
        let locks = LockManager::new(Arc::clone(&coord), config.lock_ttl);
        let ledger = Ledger::new(
            Arc::clone(&store),
            coord,
            locks,
            events.clone(),
            config.balance_cache_ttl,
            config.idempotency_ttl,
        );

        let apps = AppDirectoryClient::new(&config.app_directory_url);
        let pricing = config.pricing_url.as_deref().map(PricingClient::new);
        if pricing.is_none() {
            tracing::warn!("Pricing service not configured; caller-supplied amounts are trusted");
        }

        Self {
            config,
            store,
            ledger,
            apps,
            pricing,
            events,
            auth_keys: AuthKeys::new(),
        }
    }
}
