//! Application context: the process-wide singletons wired at startup and
//! passed explicitly to whatever needs them.

use std::sync::Arc;

use duesync_common::RateGate;
use duesync_domain::{Config, Result};
use duesync_infra::{DbManager, SiscomexClient, SqliteDueStore, SqliteLinkCache, TokenAuthority};

pub struct AppContext {
    pub config: Config,
    pub gate: Arc<RateGate>,
    pub client: Arc<SiscomexClient>,
    pub store: Arc<SqliteDueStore>,
    pub links: Arc<SqliteLinkCache>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let gate = Arc::new(RateGate::new(config.rate.safe_request_limit));
        let auth = Arc::new(TokenAuthority::new(
            &config.upstream,
            config.credentials.clone(),
            config.auth.clone(),
            Arc::clone(&gate),
        )?);
        let client =
            Arc::new(SiscomexClient::new(&config.upstream, Arc::clone(&gate), auth)?);

        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;
        let store = Arc::new(SqliteDueStore::new(Arc::clone(&db), config.situations.clone()));
        let links = Arc::new(SqliteLinkCache::new(db));

        Ok(Self { config, gate, client, store, links })
    }
}
