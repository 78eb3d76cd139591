//! Tests for the store backends

use super::*;
use crate::guard::WorkspaceGuard;
use crate::shared::models::{Contact, ContactChannel};
use crate::tests::test_util;
use crate::{assert_err, assert_ok};
use chrono::Utc;
use uuid::Uuid;

fn contact(workspace_id: Uuid, name: &str, email: Option<&str>) -> Contact {
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

fn link(contact_id: Uuid, workspace_id: Uuid, channel_type: &str, channel_id: &str) -> ContactChannel {
    let now = Utc::now();
    ContactChannel {
        id: Uuid::new_v4(),
        contact_id,
        workspace_id,
        channel_type: channel_type.to_string(),
        channel_id: channel_id.to_string(),
        display_name: channel_id.to_string(),
        is_primary: false,
        is_verified: false,
        message_count: 1,
        last_message_at: now,
        created_at: now,
    }
}

#[tokio::test]
async fn test_insert_or_existing_collapses_same_name() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();

    let (first, created) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", None))
            .await
    );
    assert!(created);

    let (second, created) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", Some("bob@gmail.com")))
            .await
    );
    assert!(!created);
    assert_eq!(second.id, first.id);
    // The surviving row keeps its own fields.
    assert_eq!(second.email, None);
}

#[tokio::test]
async fn test_insert_or_existing_rejects_duplicate_email() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();

    assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", Some("bob@gmail.com")))
            .await
    );
    let err = assert_err!(
        store
            .insert_or_existing(contact(workspace, "Robert Nesta", Some("bob@gmail.com")))
            .await
    );
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_same_name_is_allowed_across_workspaces() {
    test_util::setup();
    let store = MemoryStore::new();
    let first_workspace = Uuid::new_v4();
    let second_workspace = Uuid::new_v4();

    let (first, created_first) = assert_ok!(
        store
            .insert_or_existing(contact(first_workspace, "Bob Marley", None))
            .await
    );
    let (second, created_second) = assert_ok!(
        store
            .insert_or_existing(contact(second_workspace, "Bob Marley", None))
            .await
    );
    assert!(created_first);
    assert!(created_second);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_find_by_email_is_scoped_to_workspace() {
    test_util::setup();
    let store = MemoryStore::new();
    let first_workspace = Uuid::new_v4();
    let second_workspace = Uuid::new_v4();

    let (own, _) = assert_ok!(
        store
            .insert_or_existing(contact(first_workspace, "Bob Marley", Some("bob@gmail.com")))
            .await
    );
    assert_ok!(
        store
            .insert_or_existing(contact(second_workspace, "Bob Marley", Some("bob@gmail.com")))
            .await
    );

    let found = assert_ok!(store.find_by_email(first_workspace, "bob@gmail.com").await);
    assert_eq!(found.map(|c| c.id), Some(own.id));
    let missing = assert_ok!(store.find_by_email(Uuid::new_v4(), "bob@gmail.com").await);
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_record_interaction_bumps_and_renames() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let (row, _) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", None))
            .await
    );

    let at = Utc::now();
    assert_ok!(
        store
            .record_interaction(
                row.id,
                at,
                Some(ContactName {
                    full_name: "Robert Nesta Marley".to_string(),
                    first_name: Some("Robert".to_string()),
                    last_name: Some("Nesta Marley".to_string()),
                }),
            )
            .await
    );

    let updated = assert_ok!(store.find_by_name(workspace, "Robert Nesta Marley").await)
        .expect("renamed contact missing");
    assert_eq!(updated.id, row.id);
    assert_eq!(updated.interaction_count, 2);
    assert_eq!(updated.last_interaction_at, at);
    assert_eq!(updated.first_name.as_deref(), Some("Robert"));
}

#[tokio::test]
async fn test_record_interaction_rename_collision_conflicts() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", None))
            .await
    );
    let (other, _) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Robert Nesta", None))
            .await
    );

    let err = assert_err!(
        store
            .record_interaction(
                other.id,
                Utc::now(),
                Some(ContactName {
                    full_name: "Bob Marley".to_string(),
                    first_name: Some("Bob".to_string()),
                    last_name: Some("Marley".to_string()),
                }),
            )
            .await
    );
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_backfill_email_only_fills_missing() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let (row, _) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", None))
            .await
    );

    assert_ok!(store.backfill_email(row.id, "bob@gmail.com", Utc::now()).await);
    assert_ok!(store.backfill_email(row.id, "other@gmail.com", Utc::now()).await);

    let found = assert_ok!(store.find_by_email(workspace, "bob@gmail.com").await);
    assert_eq!(found.map(|c| c.id), Some(row.id));
    let missing = assert_ok!(store.find_by_email(workspace, "other@gmail.com").await);
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_backfill_email_conflicts_with_existing_holder() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Bob Marley", Some("bob@gmail.com")))
            .await
    );
    let (other, _) = assert_ok!(
        store
            .insert_or_existing(contact(workspace, "Robert Nesta", None))
            .await
    );

    let err = assert_err!(store.backfill_email(other.id, "bob@gmail.com", Utc::now()).await);
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_insert_if_absent_dedupes_links() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let contact_id = Uuid::new_v4();

    let inserted = assert_ok!(
        store
            .insert_if_absent(link(contact_id, workspace, "whatsapp", "+5511999990000"))
            .await
    );
    assert!(inserted);

    let duplicate = assert_ok!(
        store
            .insert_if_absent(link(contact_id, workspace, "whatsapp", "+5511999990000"))
            .await
    );
    assert!(!duplicate);
    assert_eq!(store.links_of(contact_id).len(), 1);
}

#[tokio::test]
async fn test_find_by_channel_prefers_oldest_link() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let first_contact = Uuid::new_v4();
    let second_contact = Uuid::new_v4();

    assert_ok!(
        store
            .insert_if_absent(link(first_contact, workspace, "instagram", "bob_ig"))
            .await
    );
    assert_ok!(
        store
            .insert_if_absent(link(second_contact, workspace, "instagram", "bob_ig"))
            .await
    );

    let found = assert_ok!(store.find_by_channel(workspace, "instagram", "bob_ig").await)
        .expect("link missing");
    assert_eq!(found.contact_id, first_contact);
}

#[tokio::test]
async fn test_record_message_bumps_counters() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let contact_id = Uuid::new_v4();
    let row = link(contact_id, workspace, "whatsapp", "+5511999990000");
    let link_id = row.id;
    assert_ok!(store.insert_if_absent(row).await);

    let at = Utc::now();
    assert_ok!(store.record_message(link_id, at).await);

    let links = store.links_of(contact_id);
    assert_eq!(links[0].message_count, 2);
    assert_eq!(links[0].last_message_at, at);
}

#[tokio::test]
async fn test_has_links_is_scoped_to_workspace() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let contact_id = Uuid::new_v4();
    assert_ok!(
        store
            .insert_if_absent(link(contact_id, workspace, "whatsapp", "+5511999990000"))
            .await
    );

    assert!(assert_ok!(store.has_links(contact_id, workspace).await));
    assert!(!assert_ok!(store.has_links(contact_id, Uuid::new_v4()).await));
    assert!(!assert_ok!(store.has_links(Uuid::new_v4(), workspace).await));
}

#[tokio::test]
async fn test_membership_is_per_workspace() {
    test_util::setup();
    let store = MemoryStore::new();
    let workspace = Uuid::new_v4();
    let user = Uuid::new_v4();
    store.add_member(workspace, user);

    assert!(assert_ok!(store.is_member(user, workspace).await));
    assert!(!assert_ok!(store.is_member(user, Uuid::new_v4()).await));
    assert!(!assert_ok!(store.is_member(Uuid::new_v4(), workspace).await));
}
