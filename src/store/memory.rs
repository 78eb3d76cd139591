use crate::guard::WorkspaceGuard;
use crate::shared::models::{Contact, ContactChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{ContactChannelStore, ContactName, ContactStore, StoreError};

#[derive(Default)]
struct MemoryState {
    contacts: Vec<Contact>,
    channels: Vec<ContactChannel>,
    members: HashSet<(Uuid, Uuid)>,
}

/// In-memory store enforcing the same uniqueness rules as the Postgres
/// schema. Backs the test suite and local development without a database.
/// One mutex around the whole state keeps every operation atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, workspace_id: Uuid, user_id: Uuid) {
        if let Ok(mut state) = self.state.lock() {
            state.members.insert((workspace_id, user_id));
        }
    }

    pub fn contacts_in(&self, workspace_id: Uuid) -> Vec<Contact> {
        self.state
            .lock()
            .map(|state| {
                state
                    .contacts
                    .iter()
                    .filter(|c| c.workspace_id == workspace_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn links_of(&self, contact_id: Uuid) -> Vec<ContactChannel> {
        self.state
            .lock()
            .map(|state| {
                state
                    .channels
                    .iter()
                    .filter(|l| l.contact_id == contact_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn find_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.workspace_id == workspace_id && c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_name(
        &self,
        workspace_id: Uuid,
        full_name: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.workspace_id == workspace_id && c.full_name == full_name)
            .cloned())
    }

    async fn insert_or_existing(&self, draft: Contact) -> Result<(Contact, bool), StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .contacts
            .iter()
            .find(|c| c.workspace_id == draft.workspace_id && c.full_name == draft.full_name)
        {
            return Ok((existing.clone(), false));
        }
        if let Some(email) = draft.email.as_deref() {
            if state
                .contacts
                .iter()
                .any(|c| c.workspace_id == draft.workspace_id && c.email.as_deref() == Some(email))
            {
                return Err(StoreError::Conflict(format!(
                    "duplicate key value violates idx_contacts_workspace_email: {email}"
                )));
            }
        }
        state.contacts.push(draft.clone());
        Ok((draft, true))
    }

    async fn record_interaction(
        &self,
        contact_id: Uuid,
        at: DateTime<Utc>,
        renamed: Option<ContactName>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(name) = &renamed {
            let workspace_id = state
                .contacts
                .iter()
                .find(|c| c.id == contact_id)
                .map(|c| c.workspace_id);
            if let Some(workspace_id) = workspace_id {
                let taken = state.contacts.iter().any(|c| {
                    c.workspace_id == workspace_id
                        && c.id != contact_id
                        && c.full_name == name.full_name
                });
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "duplicate key value violates contacts_workspace_full_name_key: {}",
                        name.full_name
                    )));
                }
            }
        }
        if let Some(contact) = state.contacts.iter_mut().find(|c| c.id == contact_id) {
            contact.interaction_count += 1;
            contact.last_interaction_at = at;
            contact.updated_at = at;
            if let Some(name) = renamed {
                contact.full_name = name.full_name;
                contact.first_name = name.first_name;
                contact.last_name = name.last_name;
            }
        }
        Ok(())
    }

    async fn backfill_email(
        &self,
        contact_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let target = state
            .contacts
            .iter()
            .find(|c| c.id == contact_id)
            .map(|c| (c.workspace_id, c.email.is_some()));
        if let Some((workspace_id, false)) = target {
            if state
                .contacts
                .iter()
                .any(|c| c.workspace_id == workspace_id && c.email.as_deref() == Some(email))
            {
                return Err(StoreError::Conflict(format!(
                    "duplicate key value violates idx_contacts_workspace_email: {email}"
                )));
            }
            if let Some(contact) = state.contacts.iter_mut().find(|c| c.id == contact_id) {
                contact.email = Some(email.to_string());
                contact.updated_at = at;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContactChannelStore for MemoryStore {
    async fn find_by_channel(
        &self,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        let state = self.lock()?;
        // Insertion order stands in for the created_at ordering of the
        // Postgres query: the oldest matching link wins.
        Ok(state
            .channels
            .iter()
            .find(|l| {
                l.workspace_id == workspace_id
                    && l.channel_type == channel_type
                    && l.channel_id == channel_id
            })
            .cloned())
    }

    async fn find_link(
        &self,
        contact_id: Uuid,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .channels
            .iter()
            .find(|l| {
                l.contact_id == contact_id
                    && l.workspace_id == workspace_id
                    && l.channel_type == channel_type
                    && l.channel_id == channel_id
            })
            .cloned())
    }

    async fn insert_if_absent(&self, link: ContactChannel) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let exists = state.channels.iter().any(|l| {
            l.contact_id == link.contact_id
                && l.workspace_id == link.workspace_id
                && l.channel_type == link.channel_type
                && l.channel_id == link.channel_id
        });
        if exists {
            return Ok(false);
        }
        state.channels.push(link);
        Ok(true)
    }

    async fn record_message(&self, link_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(link) = state.channels.iter_mut().find(|l| l.id == link_id) {
            link.message_count += 1;
            link.last_message_at = at;
        }
        Ok(())
    }

    async fn has_links(&self, contact_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state
            .channels
            .iter()
            .any(|l| l.contact_id == contact_id && l.workspace_id == workspace_id))
    }
}

#[async_trait]
impl WorkspaceGuard for MemoryStore {
    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state.members.contains(&(workspace_id, user_id)))
    }
}
