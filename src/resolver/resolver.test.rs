//! Tests for the contact resolution cascade

use super::*;
use crate::guard::WorkspaceGuard;
use crate::shared::models::{Contact, ContactChannel};
use crate::store::{ContactChannelStore, ContactName, ContactStore, MemoryStore, StoreError};
use crate::tests::test_util;
use crate::{assert_err, assert_ok};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn new_resolver(store: &MemoryStore) -> ContactResolver {
    let shared = Arc::new(store.clone());
    ContactResolver::new(shared.clone(), shared.clone(), shared)
}

fn event(
    workspace_id: Uuid,
    caller_id: Uuid,
    channel_type: &str,
    email: Option<&str>,
    name: Option<&str>,
    channel_id: Option<&str>,
) -> ResolveRequest {
    ResolveRequest {
        workspace_id,
        caller_id,
        channel_type: channel_type.to_string(),
        sender_email: email.map(str::to_string),
        sender_name: name.map(str::to_string),
        channel_id: channel_id.map(str::to_string),
    }
}

fn draft(workspace_id: Uuid, name: &str, email: Option<&str>) -> Contact {
    let now = Utc::now();
    Contact {
        id: Uuid::new_v4(),
        workspace_id,
        full_name: name.to_string(),
        first_name: None,
        last_name: None,
        email: email.map(str::to_string),
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
    }
}

#[tokio::test]
async fn test_unknown_email_sender_creates_contact() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);

    let resolution = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("Bob@Gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    assert!(resolution.is_new);

    let contacts = store.contacts_in(workspace);
    assert_eq!(contacts.len(), 1);
    let contact = &contacts[0];
    assert_eq!(contact.id, resolution.contact_id);
    assert_eq!(contact.full_name, "Bob Marley");
    assert_eq!(contact.first_name.as_deref(), Some("Bob"));
    assert_eq!(contact.last_name.as_deref(), Some("Marley"));
    assert_eq!(contact.email.as_deref(), Some("bob@gmail.com"));
    assert_eq!(contact.interaction_count, 1);

    let links = store.links_of(contact.id);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].channel_type, "email");
    assert_eq!(links[0].channel_id, "bob@gmail.com");
    assert_eq!(links[0].display_name, "Bob Marley");
    assert!(links[0].is_primary);
    assert_eq!(links[0].message_count, 1);
}

#[tokio::test]
async fn test_replaying_an_event_is_idempotent() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);
    let request = event(
        workspace,
        caller,
        "whatsapp",
        Some("bob@gmail.com"),
        Some("Bob Marley"),
        Some("+5511999990000"),
    );

    let first = assert_ok!(resolver.resolve(request.clone()).await);
    let second = assert_ok!(resolver.resolve(request).await);

    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.contact_id, second.contact_id);

    let contacts = store.contacts_in(workspace);
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].interaction_count, 2);

    let links = store.links_of(first.contact_id);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].message_count, 2);
}

#[tokio::test]
async fn test_non_member_caller_is_rejected() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    let resolver = new_resolver(&store);

    let err = assert_err!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    assert!(matches!(err, ResolveError::Unauthorized { .. }));
    assert!(store.contacts_in(workspace).is_empty());
}

struct FailingGuard;

#[async_trait]
impl WorkspaceGuard for FailingGuard {
    async fn is_member(&self, _user_id: Uuid, _workspace_id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("membership store offline".to_string()))
    }
}

#[tokio::test]
async fn test_guard_failure_fails_closed() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    let shared = Arc::new(store.clone());
    let resolver = ContactResolver::new(shared.clone(), shared, Arc::new(FailingGuard));

    let err = assert_err!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                None,
                None,
            ))
            .await
    );
    assert!(matches!(
        err,
        ResolveError::Store(StoreError::Unavailable(_))
    ));
    assert!(store.contacts_in(workspace).is_empty());
}

#[tokio::test]
async fn test_email_match_wins_over_unseen_channel() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);

    let first = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    let second = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "instagram",
                Some("bob@gmail.com"),
                Some("BobbyIG"),
                Some("bob_ig"),
            ))
            .await
    );

    assert!(!second.is_new);
    assert_eq!(second.contact_id, first.contact_id);

    let contact = &store.contacts_in(workspace)[0];
    // Most recent name wins on an email match.
    assert_eq!(contact.full_name, "BobbyIG");
    assert_eq!(contact.interaction_count, 2);

    let links = store.links_of(first.contact_id);
    assert_eq!(links.len(), 2);
    assert_eq!(links.iter().filter(|l| l.is_primary).count(), 1);
    let instagram = links
        .iter()
        .find(|l| l.channel_type == "instagram")
        .expect("instagram link missing");
    assert!(!instagram.is_primary);
    assert_eq!(instagram.channel_id, "bob_ig");
    assert_eq!(instagram.display_name, "BobbyIG");
}

#[tokio::test]
async fn test_email_only_event_keeps_stored_name() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);

    let first = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    let second = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                None,
                None,
            ))
            .await
    );

    assert_eq!(second.contact_id, first.contact_id);
    let contact = &store.contacts_in(workspace)[0];
    assert_eq!(contact.full_name, "Bob Marley");
    assert_eq!(contact.interaction_count, 2);
}

#[tokio::test]
async fn test_channel_match_backfills_missing_email() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);

    let first = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "whatsapp",
                None,
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(first.is_new);
    assert_eq!(store.contacts_in(workspace)[0].email, None);

    let second = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "whatsapp",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(!second.is_new);
    assert_eq!(second.contact_id, first.contact_id);
    assert_eq!(
        store.contacts_in(workspace)[0].email.as_deref(),
        Some("bob@gmail.com")
    );

    // A later address never displaces the first one.
    let third = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "whatsapp",
                Some("other@gmail.com"),
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert_eq!(third.contact_id, first.contact_id);
    assert_eq!(
        store.contacts_in(workspace)[0].email.as_deref(),
        Some("bob@gmail.com")
    );
}

#[tokio::test]
async fn test_same_name_collapses_onto_one_contact() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = new_resolver(&store);

    let first = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "instagram",
                None,
                Some("Bob Marley"),
                Some("bob_ig"),
            ))
            .await
    );
    assert!(first.is_new);

    // Same display name arriving over plain e-mail: no email or channel
    // match, so the create collapses onto the existing row.
    let second = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    assert!(!second.is_new);
    assert_eq!(second.contact_id, first.contact_id);

    let contacts = store.contacts_in(workspace);
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].email.as_deref(), Some("bob@gmail.com"));
    assert_eq!(contacts[0].interaction_count, 2);

    let links = store.links_of(first.contact_id);
    assert_eq!(links.len(), 2);
    assert_eq!(links.iter().filter(|l| l.is_primary).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_create_one_contact() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let resolver = Arc::new(new_resolver(&store));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = Arc::clone(&resolver);
        let request = event(
            workspace,
            caller,
            "email",
            Some("bob@gmail.com"),
            Some("Bob Marley"),
            None,
        );
        handles.push(tokio::spawn(async move { resolver.resolve(request).await }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let resolution = assert_ok!(handle.await.expect("task panicked"));
        if resolution.is_new {
            created += 1;
        }
        ids.push(resolution.contact_id);
    }

    assert_eq!(created, 1);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(store.contacts_in(workspace).len(), 1);
    assert_eq!(store.links_of(ids[0]).len(), 1);
}

#[tokio::test]
async fn test_workspaces_are_isolated() {
    test_util::setup();
    let store = MemoryStore::new();
    let first_workspace = Uuid::new_v4();
    let second_workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(first_workspace, caller);
    store.add_member(second_workspace, caller);
    let resolver = new_resolver(&store);

    let first = assert_ok!(
        resolver
            .resolve(event(
                first_workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    let second = assert_ok!(
        resolver
            .resolve(event(
                second_workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );

    assert!(first.is_new);
    assert!(second.is_new);
    assert_ne!(first.contact_id, second.contact_id);
    assert_eq!(store.contacts_in(first_workspace).len(), 1);
    assert_eq!(store.contacts_in(second_workspace).len(), 1);
}

struct ConflictOnInsert {
    inner: MemoryStore,
}

#[async_trait]
impl ContactStore for ConflictOnInsert {
    async fn find_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError> {
        self.inner.find_by_email(workspace_id, email).await
    }

    async fn find_by_name(
        &self,
        workspace_id: Uuid,
        full_name: &str,
    ) -> Result<Option<Contact>, StoreError> {
        self.inner.find_by_name(workspace_id, full_name).await
    }

    async fn insert_or_existing(&self, _draft: Contact) -> Result<(Contact, bool), StoreError> {
        Err(StoreError::Conflict(
            "duplicate key value violates idx_contacts_workspace_email".to_string(),
        ))
    }

    async fn record_interaction(
        &self,
        contact_id: Uuid,
        at: DateTime<Utc>,
        renamed: Option<ContactName>,
    ) -> Result<(), StoreError> {
        self.inner.record_interaction(contact_id, at, renamed).await
    }

    async fn backfill_email(
        &self,
        contact_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.backfill_email(contact_id, email, at).await
    }
}

#[tokio::test]
async fn test_insert_conflict_falls_back_to_name_owner() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let (seeded, _) = assert_ok!(
        store
            .insert_or_existing(draft(workspace, "Bob Marley", None))
            .await
    );

    let shared = Arc::new(store.clone());
    let resolver = ContactResolver::new(
        Arc::new(ConflictOnInsert {
            inner: store.clone(),
        }),
        shared.clone(),
        shared,
    );

    let resolution = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "sms",
                None,
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(!resolution.is_new);
    assert_eq!(resolution.contact_id, seeded.id);
}

#[tokio::test]
async fn test_insert_conflict_without_name_owner_propagates() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);

    let shared = Arc::new(store.clone());
    let resolver = ContactResolver::new(
        Arc::new(ConflictOnInsert {
            inner: store.clone(),
        }),
        shared.clone(),
        shared,
    );

    let err = assert_err!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "sms",
                None,
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(matches!(err, ResolveError::Store(StoreError::Conflict(_))));
}

/// Channel store where lookups still work but every link write fails.
/// `find_by_channel` stays live because a failure there is fatal to the
/// cascade, not best-effort.
struct FailingChannelStore {
    inner: MemoryStore,
}

#[async_trait]
impl ContactChannelStore for FailingChannelStore {
    async fn find_by_channel(
        &self,
        workspace_id: Uuid,
        channel_type: &str,
        channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        self.inner
            .find_by_channel(workspace_id, channel_type, channel_id)
            .await
    }

    async fn find_link(
        &self,
        _contact_id: Uuid,
        _workspace_id: Uuid,
        _channel_type: &str,
        _channel_id: &str,
    ) -> Result<Option<ContactChannel>, StoreError> {
        Err(StoreError::Unavailable("link store offline".to_string()))
    }

    async fn insert_if_absent(&self, _link: ContactChannel) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("link store offline".to_string()))
    }

    async fn record_message(&self, _link_id: Uuid, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("link store offline".to_string()))
    }

    async fn has_links(&self, _contact_id: Uuid, _workspace_id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("link store offline".to_string()))
    }
}

#[tokio::test]
async fn test_broken_link_store_never_fails_resolution() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);
    let shared = Arc::new(store.clone());
    let resolver = ContactResolver::new(
        shared.clone(),
        Arc::new(FailingChannelStore {
            inner: store.clone(),
        }),
        shared,
    );

    // Creation: the contact lands even though no link can be written.
    let first = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    assert!(first.is_new);
    assert_eq!(store.contacts_in(workspace).len(), 1);
    assert!(store.links_of(first.contact_id).is_empty());

    // Replay: the email-keyed match absorbs the same failure.
    let second = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "email",
                Some("bob@gmail.com"),
                Some("Bob Marley"),
                None,
            ))
            .await
    );
    assert!(!second.is_new);
    assert_eq!(second.contact_id, first.contact_id);
    assert_eq!(store.contacts_in(workspace)[0].interaction_count, 2);
    assert!(store.links_of(first.contact_id).is_empty());
}

#[tokio::test]
async fn test_message_bump_failure_is_absorbed_on_channel_match() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let caller = Uuid::new_v4();
    store.add_member(workspace, caller);

    // Seed contact and link through a fully working resolver.
    let seeded = assert_ok!(
        new_resolver(&store)
            .resolve(event(
                workspace,
                caller,
                "whatsapp",
                None,
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(seeded.is_new);

    let shared = Arc::new(store.clone());
    let resolver = ContactResolver::new(
        shared.clone(),
        Arc::new(FailingChannelStore {
            inner: store.clone(),
        }),
        shared,
    );
    let resolution = assert_ok!(
        resolver
            .resolve(event(
                workspace,
                caller,
                "whatsapp",
                None,
                Some("Bob Marley"),
                Some("+5511999990000"),
            ))
            .await
    );
    assert!(!resolution.is_new);
    assert_eq!(resolution.contact_id, seeded.contact_id);

    // The interaction still counted; only the link counter was left behind.
    let contact = &store.contacts_in(workspace)[0];
    assert_eq!(contact.interaction_count, 2);
    assert_eq!(store.links_of(seeded.contact_id)[0].message_count, 1);
}
