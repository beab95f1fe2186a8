//! Message persistence: contact history lookups, idempotent paid sends, and
//! the atomic debit+insert transaction.
//!
//! Grounded on `openibank-db::repos::wallet`'s debit-under-transaction
//! pattern (re-read balance inside the transaction, reject before
//! mutating, commit only on success).

use chrono::Utc;
use uuid::Uuid;

use messaging_types::{Message, MessageIdempotency, MessageStatus};

use crate::error::{DbError, DbResult};
use crate::models::{DbMessage, DbMessageIdempotency};
use crate::store::{Backend, Store};

/// What the orchestrator needs to know from prior contact between a sender
/// and a recipient, queried as one pair of existence checks.
pub struct ContactHistoryRow {
    pub sender_has_sent_to_recipient: bool,
    pub recipient_has_sent_to_sender: bool,
}

/// Outcome of attempting to insert a new paid message.
pub enum SendOutcome {
    Created(Message),
    /// A prior call with the same idempotency key already produced this
    /// message; the caller should return it rather than re-debit.
    Idempotent(Message),
}

/// A row of `inbox(userId)`: the message plus the sender's
/// wallet address, joined so the HTTP layer never has to make a second
/// round trip per row.
#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub message: Message,
    pub sender_wallet_address: String,
}

impl Store {
    pub async fn contact_history(&self, sender_id: &str, recipient_id: &str) -> DbResult<ContactHistoryRow> {
        match &self.backend {
            Backend::Sql(pool) => {
                let sender_sent: (bool,) = sqlx::query_as(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE sender_id = ? AND recipient_id = ? AND status != 'failed')",
                )
                .bind(sender_id)
                .bind(recipient_id)
                .fetch_one(pool)
                .await?;
                let recipient_sent: (bool,) = sqlx::query_as(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE sender_id = ? AND recipient_id = ? AND status != 'failed')",
                )
                .bind(recipient_id)
                .bind(sender_id)
                .fetch_one(pool)
                .await?;
                Ok(ContactHistoryRow {
                    sender_has_sent_to_recipient: sender_sent.0,
                    recipient_has_sent_to_sender: recipient_sent.0,
                })
            }
            Backend::File(fs) => {
                let messages = fs.messages.lock().await;
                let sender_has_sent = messages
                    .values()
                    .any(|m| m.sender_id == sender_id && m.recipient_id == recipient_id && m.status() != MessageStatus::Failed);
                let recipient_has_sent = messages
                    .values()
                    .any(|m| m.sender_id == recipient_id && m.recipient_id == sender_id && m.status() != MessageStatus::Failed);
                Ok(ContactHistoryRow {
                    sender_has_sent_to_recipient: sender_has_sent,
                    recipient_has_sent_to_sender: recipient_has_sent,
                })
            }
        }
    }

    pub async fn find_idempotent_message(
        &self,
        sender_id: &str,
        idempotency_key: &str,
    ) -> DbResult<Option<MessageIdempotency>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbMessageIdempotency>(
                    "SELECT * FROM message_idempotency WHERE sender_id = ? AND idempotency_key = ?",
                )
                .bind(sender_id)
                .bind(idempotency_key)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .idempotency
                .lock()
                .await
                .get(&(sender_id.to_string(), idempotency_key.to_string()))
                .cloned()
                .map(Into::into)),
        }
    }

    pub async fn get_message(&self, id: Uuid) -> DbResult<Option<Message>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbMessage>("SELECT * FROM messages WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs.messages.lock().await.get(&id.to_string()).cloned().map(Into::into)),
        }
    }

    /// Looks a message up by content hash — the chain indexer's idempotency
    /// key, checked so a re-observed event doesn't insert a duplicate row,
    /// since the event carries the hash, not the row's uuid.
    pub async fn get_message_by_content_hash(&self, content_hash: &str) -> DbResult<Option<Message>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbMessage>("SELECT * FROM messages WHERE content_hash = ?")
                    .bind(content_hash)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .messages
                .lock()
                .await
                .values()
                .find(|m| m.content_hash == content_hash)
                .cloned()
                .map(Into::into)),
        }
    }


    /// `inbox(userId)`: messages addressed to `user_id`, newest first, each
    /// joined with the sender's wallet address.
    pub async fn list_inbox(&self, user_id: &str) -> DbResult<Vec<InboxEntry>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let rows = sqlx::query_as::<_, DbMessage>(
                    "SELECT m.* FROM messages m WHERE m.recipient_id = ? ORDER BY m.created_at DESC",
                )
                .bind(user_id)
                .fetch_all(pool)
                .await?;
                let mut entries = Vec::with_capacity(rows.len());
                for row in rows {
                    let sender: (String,) = sqlx::query_as("SELECT wallet_address FROM users WHERE id = ?")
                        .bind(&row.sender_id)
                        .fetch_one(pool)
                        .await?;
                    entries.push(InboxEntry { message: row.into(), sender_wallet_address: sender.0 });
                }
                Ok(entries)
            }
            Backend::File(fs) => {
                let messages = fs.messages.lock().await;
                let users = fs.users.lock().await;
                let mut entries: Vec<InboxEntry> = messages
                    .values()
                    .filter(|m| m.recipient_id == user_id)
                    .filter_map(|m| {
                        users.get(&m.sender_id).map(|sender| InboxEntry {
                            message: m.clone().into(),
                            sender_wallet_address: sender.wallet_address.clone(),
                        })
                    })
                    .collect();
                entries.sort_by(|a, b| b.message.created_at.cmp(&a.message.created_at));
                Ok(entries)
            }
        }
    }

    /// Atomically re-reads the sender's balance, rejects with
    /// `InsufficientBalance` if short, debits, and inserts the message (plus
    /// idempotency row if a key was supplied). Postgres/SQLite run this as
    /// one transaction; the file backend holds both collection locks for
    /// the duration since it has no transaction primitive of its own.
    pub async fn create_paid_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        ciphertext: &str,
        content_hash: &str,
        price: i64,
        idempotency_key: Option<&str>,
    ) -> DbResult<SendOutcome> {
        match &self.backend {
            Backend::Sql(pool) => {
                let mut tx = pool.begin().await?;

                let balance: (i64,) = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
                    .bind(sender_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| DbError::NotFound(format!("user {sender_id}")))?;

                if balance.0 < price {
                    tx.rollback().await.ok();
                    return Err(DbError::InsufficientBalance {
                        available: balance.0,
                        required: price,
                    });
                }

                if let Some(key) = idempotency_key {
                    let existing = sqlx::query_as::<_, DbMessageIdempotency>(
                        "SELECT * FROM message_idempotency WHERE sender_id = ? AND idempotency_key = ?",
                    )
                    .bind(sender_id)
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;
                    if let Some(existing) = existing {
                        tx.rollback().await.ok();
                        let message = self
                            .get_message(existing.message_id)
                            .await?
                            .ok_or_else(|| DbError::NotFound("idempotent message vanished".into()))?;
                        return Ok(SendOutcome::Idempotent(message));
                    }
                }

                let now = Utc::now();
                let id = Uuid::new_v4();
                sqlx::query("UPDATE users SET balance = balance - ?, updated_at = ? WHERE id = ?")
                    .bind(price)
                    .bind(now)
                    .bind(sender_id)
                    .execute(&mut *tx)
                    .await?;

                let row = sqlx::query_as::<_, DbMessage>(
                    r#"
                    INSERT INTO messages (id, sender_id, recipient_id, ciphertext, content_hash, price, status, tx_hash, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, 'paid', NULL, ?, ?)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(sender_id)
                .bind(recipient_id)
                .bind(ciphertext)
                .bind(content_hash)
                .bind(price)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

                if let Some(key) = idempotency_key {
                    sqlx::query(
                        "INSERT INTO message_idempotency (sender_id, idempotency_key, message_id, created_at) VALUES (?, ?, ?, ?)",
                    )
                    .bind(sender_id)
                    .bind(key)
                    .bind(id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok(SendOutcome::Created(row.into()))
            }
            Backend::File(fs) => {
                let mut users = fs.users.lock().await;
                let mut messages = fs.messages.lock().await;
                let mut idempotency = fs.idempotency.lock().await;

                if let Some(key) = idempotency_key {
                    if let Some(existing) = idempotency.get(&(sender_id.to_string(), key.to_string())) {
                        let message = messages
                            .get(&existing.message_id.to_string())
                            .cloned()
                            .ok_or_else(|| DbError::NotFound("idempotent message vanished".into()))?;
                        return Ok(SendOutcome::Idempotent(message.into()));
                    }
                }

                let user = users
                    .get_mut(sender_id)
                    .ok_or_else(|| DbError::NotFound(format!("user {sender_id}")))?;
                if user.balance < price {
                    return Err(DbError::InsufficientBalance {
                        available: user.balance,
                        required: price,
                    });
                }

                let now = Utc::now();
                let id = Uuid::new_v4();
                user.balance -= price;
                user.updated_at = now;
                fs.persist("users.json", &*users).await?;

                let row = DbMessage {
                    id,
                    sender_id: sender_id.to_string(),
                    recipient_id: recipient_id.to_string(),
                    ciphertext: ciphertext.to_string(),
                    content_hash: content_hash.to_string(),
                    price,
                    status: "paid".to_string(),
                    tx_hash: None,
                    created_at: now,
                    updated_at: now,
                };
                messages.insert(id.to_string(), row.clone());
                fs.persist("messages.json", &*messages).await?;

                if let Some(key) = idempotency_key {
                    idempotency.insert(
                        (sender_id.to_string(), key.to_string()),
                        DbMessageIdempotency {
                            sender_id: sender_id.to_string(),
                            idempotency_key: key.to_string(),
                            message_id: id,
                            created_at: now,
                        },
                    );
                }

                Ok(SendOutcome::Created(row.into()))
            }
        }
    }

    pub async fn mark_message_delivered(&self, id: Uuid, tx_hash: Option<&str>) -> DbResult<()> {
        self.transition_message_status(id, "delivered", tx_hash).await
    }

    pub async fn mark_message_failed(&self, id: Uuid) -> DbResult<()> {
        self.transition_message_status(id, "failed", None).await
    }

    async fn transition_message_status(&self, id: Uuid, status: &str, tx_hash: Option<&str>) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query("UPDATE messages SET status = ?, tx_hash = COALESCE(?, tx_hash), updated_at = ? WHERE id = ?")
                    .bind(status)
                    .bind(tx_hash)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut messages = fs.messages.lock().await;
                let row = messages
                    .get_mut(&id.to_string())
                    .ok_or_else(|| DbError::NotFound(format!("message {id}")))?;
                row.status = status.to_string();
                if let Some(tx) = tx_hash {
                    row.tx_hash = Some(tx.to_string());
                }
                row.updated_at = now;
                fs.persist("messages.json", &*messages).await?;
                Ok(())
            }
        }
    }

    /// Materializes a message observed on-chain rather than through the
    /// orchestrator: inserts a new `delivered` row
    /// keyed on `content_hash`, or — if the orchestrator already inserted
    /// this message as `paid` — transitions it to `delivered` and stamps
    /// `tx_hash`. Idempotent on `content_hash`, the chain event's unique key
    /// upstream.
    pub async fn create_chain_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content_hash: &str,
        amount: i64,
        tx_hash: &str,
    ) -> DbResult<Message> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbMessage>(
                    r#"
                    INSERT INTO messages (id, sender_id, recipient_id, ciphertext, content_hash, price, status, tx_hash, created_at, updated_at)
                    VALUES (?, ?, ?, '', ?, ?, 'delivered', ?, ?, ?)
                    ON CONFLICT (content_hash) DO UPDATE SET
                        status = 'delivered',
                        tx_hash = excluded.tx_hash,
                        updated_at = excluded.updated_at
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(sender_id)
                .bind(recipient_id)
                .bind(content_hash)
                .bind(amount)
                .bind(tx_hash)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await?;
                Ok(row.into())
            }
            Backend::File(fs) => {
                let mut messages = fs.messages.lock().await;
                if let Some(existing_id) = messages
                    .values()
                    .find(|m| m.content_hash == content_hash)
                    .map(|m| m.id.to_string())
                {
                    let row = messages.get_mut(&existing_id).expect("existing_id came from this map");
                    row.status = "delivered".to_string();
                    row.tx_hash = Some(tx_hash.to_string());
                    row.updated_at = now;
                    let updated = row.clone();
                    fs.persist("messages.json", &*messages).await?;
                    return Ok(updated.into());
                }
                let row = DbMessage {
                    id,
                    sender_id: sender_id.to_string(),
                    recipient_id: recipient_id.to_string(),
                    ciphertext: String::new(),
                    content_hash: content_hash.to_string(),
                    price: amount,
                    status: "delivered".to_string(),
                    tx_hash: Some(tx_hash.to_string()),
                    created_at: now,
                    updated_at: now,
                };
                messages.insert(id.to_string(), row.clone());
                fs.persist("messages.json", &*messages).await?;
                Ok(row.into())
            }
        }
    }
}
