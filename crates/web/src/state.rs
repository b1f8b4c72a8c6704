//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{Backend, BackendError, MemoryBackend, SupabaseBackend};
use crate::config::{BackendConfig, CoupixConfig};
use crate::services::{AuthService, CouponService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// configuration and the services.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CoupixConfig,
    auth: AuthService,
    coupons: CouponService,
}

impl AppState {
    /// Create application state with the backend named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for the hosted backend cannot be
    /// built.
    pub fn new(config: CoupixConfig) -> Result<Self, BackendError> {
        let backend: Arc<dyn Backend> = match &config.backend {
            BackendConfig::Supabase(supabase) => Arc::new(SupabaseBackend::new(supabase)?),
            BackendConfig::Memory => {
                tracing::warn!("Using in-memory backend; data is lost on restart");
                Arc::new(MemoryBackend::new())
            }
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Create application state around an existing backend.
    #[must_use]
    pub fn with_backend(config: CoupixConfig, backend: Arc<dyn Backend>) -> Self {
        let auth = AuthService::new(Arc::clone(&backend));
        let coupons = CouponService::new(backend, config.coupon_cache_idle);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                auth,
                coupons,
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &CoupixConfig {
        &self.inner.config
    }

    /// Get a reference to the authentication service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Get a reference to the coupon service.
    #[must_use]
    pub fn coupons(&self) -> &CouponService {
        &self.inner.coupons
    }
}
