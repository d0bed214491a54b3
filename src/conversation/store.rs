//! Users, conversations, messages and citations (SQLite).

use crate::error::{ConversationError, Result};
use crate::message::{Citation, Role};

use anyhow::Context as _;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Row as _, SqlitePool};

pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

/// A message to append to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
    pub citations: Vec<Citation>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_url: None,
            citations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Id of the user with `email`, creating the row on first sight.
    pub async fn upsert_user(&self, email: &str) -> Result<String> {
        sqlx::query("INSERT INTO users (id, email) VALUES (?, ?) ON CONFLICT(email) DO NOTHING")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(email)
            .execute(&self.pool)
            .await
            .context("failed to upsert user")?;

        let user_id: String = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("failed to load user id")?;

        Ok(user_id)
    }

    /// The user's conversations, most recently updated first, with messages.
    pub async fn list(&self, user_id: &str) -> Result<Vec<StoredConversation>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations \
             WHERE user_id = ? ORDER BY updated_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list conversations")?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let mut conversation = conversation_from_row(&row)?;
            conversation.messages = self.messages(&conversation.id).await?;
            conversations.push(conversation);
        }
        Ok(conversations)
    }

    /// A conversation owned by `user_id`, with messages and citations.
    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<StoredConversation>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations \
             WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch conversation")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut conversation = conversation_from_row(&row)?;
        conversation.messages = self.messages(id).await?;
        Ok(Some(conversation))
    }

    pub async fn is_owned_by(&self, id: &str, user_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM conversations WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to check conversation owner")?;
        Ok(found.is_some())
    }

    pub async fn create(&self, user_id: &str, title: Option<&str>) -> Result<StoredConversation> {
        let id = uuid::Uuid::new_v4().to_string();
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let now = chrono::Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to create conversation")?;

        tracing::debug!(conversation_id = %id, "conversation created");

        Ok(self
            .get(&id, user_id)
            .await?
            .context("conversation inserted but not found")?)
    }

    /// Rename a conversation. `None` when it does not exist for this user.
    pub async fn update_title(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<Option<StoredConversation>> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(title)
        .bind(chrono::Utc::now().naive_utc())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to update conversation title")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id, user_id).await
    }

    /// Delete a conversation and, through cascades, its messages and citations.
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to delete conversation")?;
        Ok(result.rows_affected() > 0)
    }

    /// Append a message and touch the conversation's `updated_at`.
    pub async fn add_message(&self, conversation_id: &str, message: NewMessage) -> Result<StoredMessage> {
        self.insert_message(conversation_id, message, chrono::Utc::now().naive_utc())
            .await
    }

    /// Persist a user turn and the assistant reply concurrently. Failures are
    /// logged and never surface to the caller.
    pub async fn record_exchange(&self, conversation_id: &str, user: NewMessage, assistant: NewMessage) {
        let now = chrono::Utc::now().naive_utc();
        let reply_at = now + chrono::Duration::milliseconds(1);

        let (user_result, assistant_result) = tokio::join!(
            self.insert_message(conversation_id, user, now),
            self.insert_message(conversation_id, assistant, reply_at),
        );

        if let Err(error) = user_result {
            tracing::warn!(%error, %conversation_id, "failed to persist user message");
        }
        if let Err(error) = assistant_result {
            tracing::warn!(%error, %conversation_id, "failed to persist assistant message");
        }
    }

    async fn insert_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
        created_at: NaiveDateTime,
    ) -> Result<StoredMessage> {
        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("failed to touch conversation")?;
        if touched.rows_affected() == 0 {
            return Err(ConversationError::NotFound {
                id: conversation_id.to_string(),
            }
            .into());
        }

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, image_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.image_url)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert message")?;

        let mut citations = Vec::with_capacity(message.citations.len());
        for (position, citation) in message.citations.into_iter().enumerate() {
            let inserted = sqlx::query(
                "INSERT INTO citations (id, message_id, url, title, text, position) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&citation.url)
            .bind(&citation.title)
            .bind(&citation.text)
            .bind(position as i64)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => citations.push(citation),
                Err(error) => {
                    tracing::warn!(%error, message_id = %id, url = %citation.url, "failed to persist citation");
                }
            }
        }

        Ok(StoredMessage {
            id,
            role: message.role,
            content: message.content,
            image_url: message.image_url,
            created_at: created_at.and_utc().to_rfc3339(),
            citations,
        })
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT id, role, content, image_url, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load messages")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let mut message = message_from_row(&row)?;
            message.citations = self.citations(&message.id).await?;
            messages.push(message);
        }
        Ok(messages)
    }

    async fn citations(&self, message_id: &str) -> Result<Vec<Citation>> {
        let rows = sqlx::query(
            "SELECT id, url, title, text FROM citations WHERE message_id = ? ORDER BY position ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load citations")?;

        rows.into_iter()
            .map(|row| -> Result<Citation> {
                Ok(Citation {
                    id: row.try_get("id").context("failed to read citation id")?,
                    url: row.try_get("url").context("failed to read citation url")?,
                    title: row
                        .try_get("title")
                        .context("failed to read citation title")?,
                    text: row.try_get::<Option<String>, _>("text").ok().flatten(),
                })
            })
            .collect()
    }
}

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredConversation> {
    Ok(StoredConversation {
        id: row.try_get("id").context("failed to read conversation id")?,
        title: row
            .try_get("title")
            .context("failed to read conversation title")?,
        created_at: row
            .try_get::<NaiveDateTime, _>("created_at")
            .map(|v| v.and_utc().to_rfc3339())
            .context("failed to read conversation created_at")?,
        updated_at: row
            .try_get::<NaiveDateTime, _>("updated_at")
            .map(|v| v.and_utc().to_rfc3339())
            .context("failed to read conversation updated_at")?,
        messages: Vec::new(),
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
    let role_value: String = row.try_get("role").context("failed to read message role")?;
    let role = Role::parse(&role_value)
        .with_context(|| format!("invalid message role in database: {role_value}"))?;

    Ok(StoredMessage {
        id: row.try_get("id").context("failed to read message id")?,
        role,
        content: row
            .try_get("content")
            .context("failed to read message content")?,
        image_url: row
            .try_get::<Option<String>, _>("image_url")
            .ok()
            .flatten(),
        created_at: row
            .try_get::<NaiveDateTime, _>("created_at")
            .map(|v| v.and_utc().to_rfc3339())
            .context("failed to read message created_at")?,
        citations: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::error::Error;

    async fn setup_store() -> ConversationStore {
        let db = Db::connect_in_memory()
            .await
            .expect("in-memory sqlite should connect");
        ConversationStore::new(db.sqlite)
    }

    fn citation(url: &str) -> Citation {
        Citation {
            id: "1".into(),
            url: url.into(),
            title: "Source".into(),
            text: Some("snippet".into()),
        }
    }

    #[tokio::test]
    async fn upsert_user_is_stable() {
        let store = setup_store().await;
        let first = store.upsert_user("sam@example.com").await.unwrap();
        let second = store.upsert_user("sam@example.com").await.unwrap();
        let other = store.upsert_user("alex@example.com").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = setup_store().await;
        let user = store.upsert_user("sam@example.com").await.unwrap();

        let created = store.create(&user, None).await.unwrap();
        assert_eq!(created.title, DEFAULT_TITLE);
        assert!(created.messages.is_empty());

        let renamed = store
            .update_title(&created.id, &user, "Trip planning")
            .await
            .unwrap()
            .expect("conversation should exist");
        assert_eq!(renamed.title, "Trip planning");

        let listed = store.list(&user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        assert!(store.delete(&created.id, &user).await.unwrap());
        assert!(!store.delete(&created.id, &user).await.unwrap());
        assert!(store.get(&created.id, &user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversations_are_scoped_to_their_owner() {
        let store = setup_store().await;
        let owner = store.upsert_user("sam@example.com").await.unwrap();
        let stranger = store.upsert_user("alex@example.com").await.unwrap();
        let conversation = store.create(&owner, Some("Private")).await.unwrap();

        assert!(store.get(&conversation.id, &stranger).await.unwrap().is_none());
        assert!(!store.is_owned_by(&conversation.id, &stranger).await.unwrap());
        assert!(
            store
                .update_title(&conversation.id, &stranger, "Mine now")
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete(&conversation.id, &stranger).await.unwrap());
        assert!(store.list(&stranger).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_keep_order_and_citations() {
        let store = setup_store().await;
        let user = store.upsert_user("sam@example.com").await.unwrap();
        let conversation = store.create(&user, Some("News")).await.unwrap();

        let mut assistant = NewMessage::new(Role::Assistant, "Here is the news");
        assistant.citations = vec![citation("https://a.example"), citation("https://b.example")];
        store
            .record_exchange(
                &conversation.id,
                NewMessage::new(Role::User, "What's new?"),
                assistant,
            )
            .await;

        let loaded = store.get(&conversation.id, &user).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, Role::User);
        assert_eq!(loaded.messages[1].role, Role::Assistant);
        let urls: Vec<_> = loaded.messages[1]
            .citations
            .iter()
            .map(|citation| citation.url.as_str())
            .collect();
        assert_eq!(urls, ["https://a.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn adding_a_message_touches_updated_at() {
        let store = setup_store().await;
        let user = store.upsert_user("sam@example.com").await.unwrap();
        let conversation = store.create(&user, None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let message = store
            .add_message(&conversation.id, NewMessage::new(Role::User, "hi"))
            .await
            .unwrap();

        let loaded = store.get(&conversation.id, &user).await.unwrap().unwrap();
        assert_eq!(loaded.messages[0].id, message.id);
        let parse = |value: &str| chrono::DateTime::parse_from_rfc3339(value).unwrap();
        assert!(parse(&loaded.updated_at) > parse(&conversation.updated_at));
    }

    #[tokio::test]
    async fn adding_to_missing_conversation_is_not_found() {
        let store = setup_store().await;

        let error = store
            .add_message("missing", NewMessage::new(Role::User, "hi"))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            Error::Conversation(ConversationError::NotFound { .. })
        ));
    }
}
