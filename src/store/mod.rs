use crate::shared::models::{Contact, ContactChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Unavailable(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Replacement name written on an email match when the event carried one.
#[derive(Debug, Clone)]
pub struct ContactName {
    pub full_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn find_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError>;

    async fn find_by_name(
        &self,
        workspace_id: Uuid,
        full_name: &str,
    ) -> Result<Option<Contact>, StoreError>;

    /// Insert the draft, or return the surviving row when another contact in
    /// the workspace already holds its full name. The flag is true when the
    /// draft itself was inserted. Any other constraint violation surfaces as
    /// `StoreError::Conflict`.
    async fn insert_or_existing(&self, draft: Contact) -> Result<(Contact, bool), StoreError>;

    /// Bump `interaction_count` and advance `last_interaction_at` in one
    /// atomic update; optionally overwrite the stored name.
    async fn record_interaction(
        &self,
        contact_id: Uuid,
        at: DateTime<Utc>,
        renamed: Option<ContactName>,
    ) -> Result<(), StoreError>;

    /// First e-mail wins: sets the address only where none is stored yet.
    async fn backfill_email(
        &self,
        contact_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ContactChannelStore: Send + Sync {
    /// Workspace-wide lookup by channel identity. When several contacts
    /// carry the same identity the oldest link wins.
    async fn find_by_channel(
        &self,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError>;

    /// Exact lookup by the full unique key.
    async fn find_link(
        &self,
        contact_id: Uuid,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError>;

    /// Returns false when a concurrent twin inserted the same link first.
    async fn insert_if_absent(&self, link: ContactChannel) -> Result<bool, StoreError>;

    /// Bump `message_count` and advance `last_message_at` in one atomic
    /// update.
    async fn record_message(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn has_links(&self, contact_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError>;
}

#[cfg(test)]
#[path = "store.test.rs"]
mod tests;
