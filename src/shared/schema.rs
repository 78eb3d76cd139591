diesel::table! {
    workspaces (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    workspace_members (workspace_id, user_id) {
        workspace_id -> Uuid,
        user_id -> Uuid,
        role -> Varchar,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    contacts (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        full_name -> Varchar,
        first_name -> Nullable<Varchar>,
        last_name -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        company -> Nullable<Varchar>,
        job_title -> Nullable<Varchar>,
        tags -> Array<Text>,
        notes -> Nullable<Text>,
        is_favorite -> Bool,
        last_interaction_at -> Timestamptz,
        interaction_count -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    contact_channels (id) {
        id -> Uuid,
        contact_id -> Uuid,
        workspace_id -> Uuid,
        channel_type -> Varchar,
        channel_id -> Varchar,
        display_name -> Varchar,
        is_primary -> Bool,
        is_verified -> Bool,
        message_count -> Int8,
        last_message_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(contact_channels -> contacts (contact_id));
diesel::joinable!(workspace_members -> workspaces (workspace_id));

diesel::allow_tables_to_appear_in_same_query!(
    workspaces,
    workspace_members,
    contacts,
    contact_channels,
);
