//! Application state shared by every request
//!
//! Built once before the listener starts and never mutated afterwards, so
//! handlers share it by cheap clones without locking.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::middleware::AuthMiddlewareState;
use crate::proxy::{Forwarder, ServiceGroup};
use crate::routes::ServiceId;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub forwarder: Forwarder,
    pub auth: AuthMiddlewareState,
    pub user: Arc<ServiceGroup>,
    pub payment: Arc<ServiceGroup>,
}

impl AppState {
    /// Resolve backend targets and route tables from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let user = ServiceGroup::new(ServiceId::User, &config.services.user_url)?;
        let payment = ServiceGroup::new(ServiceId::Payment, &config.services.payment_url)?;

        Ok(Self {
            forwarder: Forwarder::new(&config.proxy)?,
            auth: AuthMiddlewareState::new(&config.jwt),
            user: Arc::new(user),
            payment: Arc::new(payment),
            config: Arc::new(config),
        })
    }
}
