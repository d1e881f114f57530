//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the bazaar-types models so the schema can move on its own.

pub struct ConversationRow {
    pub id: String,
    pub client_id: String,
    pub seller_id: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct ConversationListRow {
    pub conversation: ConversationRow,
    pub unread_count: i64,
}
