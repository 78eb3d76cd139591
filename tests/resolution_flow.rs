#[cfg(test)]
mod resolution_flow_integration_tests {
    use contactserver::resolver::{ContactResolver, ResolveError, ResolveRequest};
    use contactserver::store::MemoryStore;
    use contactserver::tests::test_util;
    use contactserver::{assert_err, assert_ok};
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

    #[tokio::test]
    async fn test_multi_channel_customer_journey() {
        test_util::setup();
        let store = MemoryStore::new();
        let workspace = Uuid::new_v4();
        let caller = Uuid::new_v4();
        store.add_member(workspace, caller);
        let resolver = new_resolver(&store);

        // First seen on WhatsApp, name only.
        let whatsapp = assert_ok!(
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
        assert!(whatsapp.is_new);

        // Then writes an e-mail under the same name: collapses onto the
        // WhatsApp contact and backfills the address.
        let email = assert_ok!(
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
        assert!(!email.is_new);
        assert_eq!(email.contact_id, whatsapp.contact_id);

        // Finally shows up on Instagram with the same address and a new
        // display name: e-mail wins, the stored name follows the event.
        let instagram = assert_ok!(
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
        assert!(!instagram.is_new);
        assert_eq!(instagram.contact_id, whatsapp.contact_id);

        let contacts = store.contacts_in(workspace);
        assert_eq!(contacts.len(), 1);
        let contact = &contacts[0];
        assert_eq!(contact.full_name, "BobbyIG");
        assert_eq!(contact.email.as_deref(), Some("bob@gmail.com"));
        assert_eq!(contact.interaction_count, 3);

        let links = store.links_of(contact.id);
        assert_eq!(links.len(), 3);
        assert_eq!(links.iter().filter(|l| l.is_primary).count(), 1);
        let primary = links.iter().find(|l| l.is_primary).expect("primary link");
        assert_eq!(primary.channel_type, "whatsapp");
    }

    #[tokio::test]
    async fn test_name_only_followup_collapses_onto_email_contact() {
        test_util::setup();
        let store = MemoryStore::new();
        let workspace = Uuid::new_v4();
        let caller = Uuid::new_v4();
        store.add_member(workspace, caller);
        let resolver = new_resolver(&store);

        let gmail = assert_ok!(
            resolver
                .resolve(event(
                    workspace,
                    caller,
                    "gmail",
                    Some("bob@acme.com"),
                    Some("Bob Acme"),
                    None,
                ))
                .await
        );
        assert!(gmail.is_new);

        // Instagram gives neither an address nor a known handle, so only the
        // shared display name can tie the event back: the create collapses.
        let instagram = assert_ok!(
            resolver
                .resolve(event(
                    workspace,
                    caller,
                    "instagram",
                    None,
                    Some("Bob Acme"),
                    Some("bob_ig"),
                ))
                .await
        );
        assert!(!instagram.is_new);
        assert_eq!(instagram.contact_id, gmail.contact_id);

        let contacts = store.contacts_in(workspace);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].full_name, "Bob Acme");
        assert_eq!(contacts[0].email.as_deref(), Some("bob@acme.com"));

        let links = store.links_of(gmail.contact_id);
        assert_eq!(links.len(), 2);
        let primary = links.iter().find(|l| l.is_primary).expect("primary link");
        assert_eq!(primary.channel_type, "gmail");
        let instagram_link = links
            .iter()
            .find(|l| l.channel_type == "instagram")
            .expect("instagram link");
        assert_eq!(instagram_link.channel_id, "bob_ig");
        assert_eq!(instagram_link.message_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingestion_stays_workspace_isolated() {
        test_util::setup();
        let store = MemoryStore::new();
        let caller = Uuid::new_v4();
        let workspaces: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for workspace in &workspaces {
            store.add_member(*workspace, caller);
        }
        let resolver = Arc::new(new_resolver(&store));

        let mut handles = Vec::new();
        for workspace in &workspaces {
            for _ in 0..4 {
                let resolver = Arc::clone(&resolver);
                let request = event(
                    *workspace,
                    caller,
                    "email",
                    Some("bob@gmail.com"),
                    Some("Bob Marley"),
                    None,
                );
                handles.push(tokio::spawn(async move { resolver.resolve(request).await }));
            }
        }
        for handle in handles {
            assert_ok!(handle.await.expect("task panicked"));
        }

        let mut all_ids = Vec::new();
        for workspace in &workspaces {
            let contacts = store.contacts_in(*workspace);
            assert_eq!(contacts.len(), 1);
            all_ids.push(contacts[0].id);
        }
        all_ids.sort();
        all_ids.dedup();
        assert_eq!(all_ids.len(), workspaces.len());
    }

    #[tokio::test]
    async fn test_identifierless_events_share_the_sentinel_contact() {
        test_util::setup();
        let store = MemoryStore::new();
        let workspace = Uuid::new_v4();
        let caller = Uuid::new_v4();
        store.add_member(workspace, caller);
        let resolver = new_resolver(&store);

        let first = assert_ok!(
            resolver
                .resolve(event(workspace, caller, "webchat", None, None, None))
                .await
        );
        assert!(first.is_new);

        let second = assert_ok!(
            resolver
                .resolve(event(workspace, caller, "webchat", None, None, None))
                .await
        );
        assert!(!second.is_new);
        assert_eq!(second.contact_id, first.contact_id);

        let contacts = store.contacts_in(workspace);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].full_name, "unknown");
        let links = store.links_of(first.contact_id);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].channel_id, "unknown");
        assert_eq!(links[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_membership_gates_each_workspace() {
        test_util::setup();
        let store = MemoryStore::new();
        let home = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        let caller = Uuid::new_v4();
        store.add_member(home, caller);
        let resolver = new_resolver(&store);

        assert_ok!(
            resolver
                .resolve(event(home, caller, "email", Some("bob@gmail.com"), None, None))
                .await
        );

        let err = assert_err!(
            resolver
                .resolve(event(
                    foreign,
                    caller,
                    "email",
                    Some("bob@gmail.com"),
                    None,
                    None,
                ))
                .await
        );
        assert!(matches!(err, ResolveError::Unauthorized { .. }));
        assert!(store.contacts_in(foreign).is_empty());

        store.add_member(foreign, caller);
        let resolution = assert_ok!(
            resolver
                .resolve(event(
                    foreign,
                    caller,
                    "email",
                    Some("bob@gmail.com"),
                    None,
                    None,
                ))
                .await
        );
        assert!(resolution.is_new);
        assert_eq!(store.contacts_in(foreign).len(), 1);
    }
}
