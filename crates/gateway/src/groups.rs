//! Group projection and name search over the engine's chat list.

use {groupcast_channels::ChatRecord, serde::Serialize};

/// A group as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

impl From<ChatRecord> for GroupRef {
    fn from(chat: ChatRecord) -> Self {
        Self {
            id: chat.id.serialized,
            name: chat.name,
        }
    }
}

/// Keep only group chats, in engine order.
pub fn list_groups(chats: Vec<ChatRecord>) -> Vec<GroupRef> {
    chats
        .into_iter()
        .filter(|c| c.is_group)
        .map(GroupRef::from)
        .collect()
}

/// Groups whose name contains `query`, ignoring case.
pub fn find_groups(chats: Vec<ChatRecord>, query: &str) -> Vec<GroupRef> {
    let needle = query.to_lowercase();
    list_groups(chats)
        .into_iter()
        .filter(|g| g.name.to_lowercase().contains(&needle))
        .collect()
}
