use crate::shared::models::{Contact, ContactChannel};
use crate::shared::schema::{contact_channels, contacts};
use crate::shared::utils::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use uuid::Uuid;

use super::{ContactChannelStore, ContactName, ContactStore, StoreError};

/// Diesel-backed store. Every call runs its blocking query on the tokio
/// blocking pool with a connection checked out of the shared r2d2 pool.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: DieselError) -> StoreError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ContactStore for PgStore {
    async fn find_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let pool = self.pool.clone();
        let email = email.to_string();
        let contact = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            contacts::table
                .filter(contacts::workspace_id.eq(workspace_id))
                .filter(contacts::email.eq(&email))
                .first::<Contact>(&mut conn)
                .optional()
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(contact)
    }

    async fn find_by_name(
        &self,
        workspace_id: Uuid,
        full_name: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let pool = self.pool.clone();
        let full_name = full_name.to_string();
        let contact = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            contacts::table
                .filter(contacts::workspace_id.eq(workspace_id))
                .filter(contacts::full_name.eq(&full_name))
                .first::<Contact>(&mut conn)
                .optional()
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(contact)
    }

    async fn insert_or_existing(&self, draft: Contact) -> Result<(Contact, bool), StoreError> {
        let pool = self.pool.clone();
        let draft_id = draft.id;
        let row = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            // The no-op DO UPDATE turns a name collision into RETURNING the
            // surviving row; any other unique violation still errors.
            diesel::insert_into(contacts::table)
                .values(&draft)
                .on_conflict((contacts::workspace_id, contacts::full_name))
                .do_update()
                .set(contacts::full_name.eq(excluded(contacts::full_name)))
                .get_result::<Contact>(&mut conn)
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        let created = row.id == draft_id;
        Ok((row, created))
    }

    async fn record_interaction(
        &self,
        contact_id: Uuid,
        at: DateTime<Utc>,
        renamed: Option<ContactName>,
    ) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let target = contacts::table.filter(contacts::id.eq(contact_id));
            match renamed {
                Some(name) => {
                    diesel::update(target)
                        .set((
                            contacts::interaction_count.eq(contacts::interaction_count + 1),
                            contacts::last_interaction_at.eq(at),
                            contacts::updated_at.eq(at),
                            contacts::full_name.eq(&name.full_name),
                            contacts::first_name.eq(name.first_name.as_deref()),
                            contacts::last_name.eq(name.last_name.as_deref()),
                        ))
                        .execute(&mut conn)
                        .map_err(db_err)?;
                }
                None => {
                    diesel::update(target)
                        .set((
                            contacts::interaction_count.eq(contacts::interaction_count + 1),
                            contacts::last_interaction_at.eq(at),
                            contacts::updated_at.eq(at),
                        ))
                        .execute(&mut conn)
                        .map_err(db_err)?;
                }
            }
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }

    async fn backfill_email(
        &self,
        contact_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            // The is_null filter makes the first stored address stick.
            diesel::update(
                contacts::table
                    .filter(contacts::id.eq(contact_id))
                    .filter(contacts::email.is_null()),
            )
            .set((contacts::email.eq(&email), contacts::updated_at.eq(at)))
            .execute(&mut conn)
            .map_err(db_err)?;
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl ContactChannelStore for PgStore {
    async fn find_by_channel(
        &self,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        let pool = self.pool.clone();
        let channel_type = channel_type.to_string();
        let channel_id = channel_id.to_string();
        let link = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            contact_channels::table
                .filter(contact_channels::workspace_id.eq(workspace_id))
                .filter(contact_channels::channel_type.eq(&channel_type))
                .filter(contact_channels::channel_id.eq(&channel_id))
                .order(contact_channels::created_at.asc())
                .first::<ContactChannel>(&mut conn)
                .optional()
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(link)
    }

    async fn find_link(
        &self,
        contact_id: Uuid,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        let pool = self.pool.clone();
        let channel_type = channel_type.to_string();
        let channel_id = channel_id.to_string();
        let link = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            contact_channels::table
                .filter(contact_channels::contact_id.eq(contact_id))
                .filter(contact_channels::workspace_id.eq(workspace_id))
                .filter(contact_channels::channel_type.eq(&channel_type))
                .filter(contact_channels::channel_id.eq(&channel_id))
                .first::<ContactChannel>(&mut conn)
                .optional()
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(link)
    }

    async fn insert_if_absent(&self, link: ContactChannel) -> Result<bool, StoreError> {
        let pool = self.pool.clone();
        let inserted = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let rows = diesel::insert_into(contact_channels::table)
                .values(&link)
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .map_err(db_err)?;
            Ok::<_, StoreError>(rows > 0)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(inserted)
    }

    async fn record_message(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            diesel::update(contact_channels::table.filter(contact_channels::id.eq(link_id)))
                .set((
                    contact_channels::message_count.eq(contact_channels::message_count + 1),
                    contact_channels::last_message_at.eq(at),
                ))
                .execute(&mut conn)
                .map_err(db_err)?;
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(())
    }

    async fn has_links(&self, contact_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError> {
        let pool = self.pool.clone();
        let count: i64 = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            contact_channels::table
                .filter(contact_channels::contact_id.eq(contact_id))
                .filter(contact_channels::workspace_id.eq(workspace_id))
                .count()
                .get_result(&mut conn)
                .map_err(db_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(count > 0)
    }
}
