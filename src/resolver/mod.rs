use crate::guard::WorkspaceGuard;
use crate::identity::{normalize_sender, SenderIdentity};
use crate::shared::models::{Contact, ContactChannel};
use crate::store::{ContactChannelStore, ContactName, ContactStore, StoreError};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub mod handlers;

pub use handlers::configure_resolution_routes;

/// One inbound event: who sent something, on which channel, as seen by
/// which workspace member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub workspace_id: Uuid,
    pub caller_id: Uuid,
    pub channel_type: String,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub contact_id: Uuid,
    pub is_new: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("user {caller_id} is not a member of workspace {workspace_id}")]
    Unauthorized { caller_id: Uuid, workspace_id: Uuid },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves inbound sender identities to workspace contacts.
///
/// The cascade tries the strongest identifier first: a stored e-mail, then
/// an already-linked channel identity, and only then creates a contact,
/// letting the store collapse same-name duplicates onto one surviving row.
/// Replaying the same event therefore lands on the same contact, and
/// concurrent duplicates report `is_new` at most once.
pub struct ContactResolver {
    contacts: Arc<dyn ContactStore>,
    channels: Arc<dyn ContactChannelStore>,
    guard: Arc<dyn WorkspaceGuard>,
}

impl ContactResolver {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        channels: Arc<dyn ContactChannelStore>,
        guard: Arc<dyn WorkspaceGuard>,
    ) -> Self {
        Self {
            contacts,
            channels,
            guard,
        }
    }

    pub async fn resolve(&self, request: ResolveRequest) -> Result<Resolution, ResolveError> {
        // Guard first, and fail closed: a store error here is an error, not
        // a pass.
        if !self
            .guard
            .is_member(request.caller_id, request.workspace_id)
            .await?
        {
            return Err(ResolveError::Unauthorized {
                caller_id: request.caller_id,
                workspace_id: request.workspace_id,
            });
        }

        // One timestamp for every write in this call.
        let now = Utc::now();
        let sender = normalize_sender(
            request.sender_email.as_deref(),
            request.sender_name.as_deref(),
            request.channel_id.as_deref(),
        );

        // Strongest signal first: a stored e-mail identifies one contact
        // per workspace.
        if let Some(email) = sender.email.as_deref() {
            if let Some(contact) = self
                .contacts
                .find_by_email(request.workspace_id, email)
                .await?
            {
                debug!("contact {} matched by email", contact.id);
                // first_name is set only when the event carried a usable
                // sender name; an email-only event must not erase a stored
                // name.
                let renamed = sender.first_name.as_ref().map(|_| ContactName {
                    full_name: sender.display_name.clone(),
                    first_name: sender.first_name.clone(),
                    last_name: sender.last_name.clone(),
                });
                self.contacts
                    .record_interaction(contact.id, now, renamed)
                    .await?;
                self.attach_channel(&contact, &request.channel_type, &sender, false, now)
                    .await;
                info!(
                    "resolved contact {} in workspace {} (email match)",
                    contact.id, request.workspace_id
                );
                return Ok(Resolution {
                    contact_id: contact.id,
                    is_new: false,
                });
            }
        }

        // Second chance: the channel identity may already be linked.
        if let Some(link) = self
            .channels
            .find_by_channel(request.workspace_id, &request.channel_type, &sender.channel_key)
            .await?
        {
            debug!(
                "contact {} matched by {} channel",
                link.contact_id, link.channel_type
            );
            self.contacts
                .record_interaction(link.contact_id, now, None)
                .await?;
            if let Some(email) = sender.email.as_deref() {
                self.contacts
                    .backfill_email(link.contact_id, email, now)
                    .await?;
            }
            if let Err(e) = self.channels.record_message(link.id, now).await {
                warn!(
                    "channel bookkeeping failed for contact {}: {}",
                    link.contact_id, e
                );
            }
            info!(
                "resolved contact {} in workspace {} (channel match)",
                link.contact_id, request.workspace_id
            );
            return Ok(Resolution {
                contact_id: link.contact_id,
                is_new: false,
            });
        }

        // Nothing matched: create, letting the store collapse name
        // collisions onto the surviving row.
        let draft = Contact {
            id: Uuid::new_v4(),
            workspace_id: request.workspace_id,
            full_name: sender.display_name.clone(),
            first_name: sender.first_name.clone(),
            last_name: sender.last_name.clone(),
            email: sender.email.clone(),
            phone: None,
            company: None,
            job_title: None,
            tags: Vec::new(),
            notes: None,
            is_favorite: false,
            last_interaction_at: now,
            interaction_count: 1,
            created_at: now,
            updated_at: now,
        };
        let draft_name = draft.full_name.clone();
        let (contact, created) = match self.contacts.insert_or_existing(draft).await {
            Ok(outcome) => outcome,
            Err(StoreError::Conflict(reason)) => {
                // Some other constraint fired, most likely the email index.
                // One more chance to land on the row that owns the name; a
                // miss propagates the original conflict and the caller's
                // retry converges through the email or channel step.
                match self
                    .contacts
                    .find_by_name(request.workspace_id, &draft_name)
                    .await?
                {
                    Some(contact) => (contact, false),
                    None => return Err(StoreError::Conflict(reason).into()),
                }
            }
            Err(e) => return Err(e.into()),
        };
        if !created {
            // Collapsed onto an existing row: same refresh as a channel
            // match.
            self.contacts
                .record_interaction(contact.id, now, None)
                .await?;
            if let Some(email) = sender.email.as_deref() {
                self.contacts.backfill_email(contact.id, email, now).await?;
            }
        }
        self.attach_channel(&contact, &request.channel_type, &sender, created, now)
            .await;
        info!(
            "resolved contact {} in workspace {} ({})",
            contact.id,
            request.workspace_id,
            if created { "created" } else { "collapsed" }
        );
        Ok(Resolution {
            contact_id: contact.id,
            is_new: created,
        })
    }

    /// Channel-link bookkeeping. Best-effort: the resolution already
    /// succeeded, so failures are logged and absorbed.
    async fn attach_channel(
        &self,
        contact: &Contact,
        channel_type: &str,
        sender: &SenderIdentity,
        contact_created: bool,
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self
            .ensure_channel_link(contact, channel_type, sender, contact_created, now)
            .await
        {
            warn!(
                "channel bookkeeping failed for contact {}: {}",
                contact.id, e
            );
        }
    }

    async fn ensure_channel_link(
        &self,
        contact: &Contact,
        channel_type: &str,
        sender: &SenderIdentity,
        contact_created: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(link) = self
            .channels
            .find_link(
                contact.id,
                contact.workspace_id,
                channel_type,
                &sender.channel_key,
            )
            .await?
        {
            self.channels.record_message(link.id, now).await?;
            return Ok(());
        }
        // The first link a contact ever gets becomes its primary channel.
        let is_primary = contact_created
            || !self
                .channels
                .has_links(contact.id, contact.workspace_id)
                .await?;
        let link = ContactChannel {
            id: Uuid::new_v4(),
            contact_id: contact.id,
            workspace_id: contact.workspace_id,
            channel_type: channel_type.to_string(),
            channel_id: sender.channel_key.clone(),
            display_name: sender.display_name.clone(),
            is_primary,
            is_verified: false,
            message_count: 1,
            last_message_at: now,
            created_at: now,
        };
        if !self.channels.insert_if_absent(link).await? {
            warn!(
                "lost link insert race for contact {} on {}",
                contact.id, channel_type
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "resolver.test.rs"]
mod tests;
