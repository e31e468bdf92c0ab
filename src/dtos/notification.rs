use serde::{Deserialize, Serialize};

#[derive(Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}
