// src/api/mod.rs

pub mod bank;
pub mod health;
pub mod onchain;
pub mod session;

use std::sync::Arc;

use crate::{
    config::Config,
    db::Database,
    integrations::{BankProvider, ChainProvider},
    services::SessionRegistry,
};

/// Shared application state. All provider clients are constructed once by the
/// composition root and injected here; handlers never build their own.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub bank: Arc<dyn BankProvider>,
    pub chain: Arc<dyn ChainProvider>,
    pub sessions: Arc<SessionRegistry>,
}
