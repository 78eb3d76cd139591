use crate::config::AppConfig;
use crate::resolver::ContactResolver;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub resolver: Arc<ContactResolver>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            resolver: Arc::clone(&self.resolver),
        }
    }
}
