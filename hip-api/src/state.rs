//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::admission::AdmissionGate;
use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::facade::StoreFacade;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Every store access goes through the facade.
    pub facade: Arc<StoreFacade>,
    /// Per-tenant admission gate, consulted before any facade call.
    pub gate: AdmissionGate,
    pub auth: Arc<AuthConfig>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(
        facade: StoreFacade,
        gate: AdmissionGate,
        auth: AuthConfig,
        config: ApiConfig,
    ) -> Self {
        Self {
            facade: Arc::new(facade),
            gate,
            auth: Arc::new(auth),
            config: Arc::new(config),
        }
    }
}

crate::impl_from_ref!(Arc<StoreFacade>, facade);
crate::impl_from_ref!(AdmissionGate, gate);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(Arc<ApiConfig>, config);
