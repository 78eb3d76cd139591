use crate::shared::schema::{contact_channels, contacts};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// The workspace tables carry no row structs: the resolver only ever filters
// on their columns (see the guard), never reads whole rows.

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = contacts)]
pub struct Contact {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub full_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub is_favorite: bool,
    pub last_interaction_at: DateTime<Utc>,
    pub interaction_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = contact_channels)]
pub struct ContactChannel {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub workspace_id: Uuid,
    pub channel_type: String,
    pub channel_id: String,
    pub display_name: String,
    pub is_primary: bool,
    pub is_verified: bool,
    pub message_count: i64,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
