//! PostgreSQL [`RollCallStore`] backed by sqlx.
//!
//! Queries use the runtime API with explicit binds; enums travel as TEXT
//! and are parsed on the way out. The correlation-critical selections
//! (`last_unreplied_*`, `outstanding_messages`) push the unreplied predicate
//! into SQL with `NOT EXISTS` so they stay index-friendly at fan-out scale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RollCallError};
use crate::models::{
    Channel, ComplaintRecord, Contact, NewContact, NewOutboundMessage, NewReply, NewRollCall,
    NewUnmatchedInbound, OutboundMessage, Recipient, Reply, ResponseStatus, RollCall,
    RollCallStatus, UnmatchedInbound,
};

use super::{Page, RollCallCounts, RollCallFilter, RollCallStore};

/// Internal struct for SQL query results
#[derive(sqlx::FromRow)]
struct RollCallRow {
    roll_call_uuid: Uuid,
    organization_uuid: Uuid,
    creator_uuid: Uuid,
    message: String,
    status: String,
    self_test: bool,
    dispatched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RollCallRow> for RollCall {
    type Error = RollCallError;

    fn try_from(row: RollCallRow) -> Result<Self> {
        Ok(Self {
            roll_call_uuid: row.roll_call_uuid,
            organization_uuid: row.organization_uuid,
            creator_uuid: row.creator_uuid,
            message: row.message,
            status: row.status.parse().map_err(RollCallError::Storage)?,
            self_test: row.self_test,
            dispatched_at: row.dispatched_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    contact_uuid: Uuid,
    user_uuid: Uuid,
    channel: String,
    address: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = RollCallError;

    fn try_from(row: ContactRow) -> Result<Self> {
        Ok(Self {
            contact_uuid: row.contact_uuid,
            user_uuid: row.user_uuid,
            channel: row.channel.parse().map_err(RollCallError::Storage)?,
            address: row.address,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    roll_call_uuid: Uuid,
    user_uuid: Uuid,
    response_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecipientRow> for Recipient {
    type Error = RollCallError;

    fn try_from(row: RecipientRow) -> Result<Self> {
        Ok(Self {
            roll_call_uuid: row.roll_call_uuid,
            user_uuid: row.user_uuid,
            response_status: row.response_status.parse().map_err(RollCallError::Storage)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    message_uuid: Uuid,
    roll_call_uuid: Uuid,
    contact_uuid: Uuid,
    channel: String,
    provider_message_id: String,
    sent_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for OutboundMessage {
    type Error = RollCallError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            message_uuid: row.message_uuid,
            roll_call_uuid: row.roll_call_uuid,
            contact_uuid: row.contact_uuid,
            channel: row.channel.parse().map_err(RollCallError::Storage)?,
            provider_message_id: row.provider_message_id,
            sent_at: row.sent_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReplyRow {
    reply_uuid: Uuid,
    roll_call_uuid: Uuid,
    user_uuid: Uuid,
    contact_uuid: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<ReplyRow> for Reply {
    fn from(row: ReplyRow) -> Self {
        Self {
            reply_uuid: row.reply_uuid,
            roll_call_uuid: row.roll_call_uuid,
            user_uuid: row.user_uuid,
            contact_uuid: row.contact_uuid,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UnmatchedRow {
    inbound_uuid: Uuid,
    channel: String,
    contact_address: String,
    contact_uuid: Option<Uuid>,
    content: String,
    received_at: DateTime<Utc>,
}

impl TryFrom<UnmatchedRow> for UnmatchedInbound {
    type Error = RollCallError;

    fn try_from(row: UnmatchedRow) -> Result<Self> {
        Ok(Self {
            inbound_uuid: row.inbound_uuid,
            channel: row.channel.parse().map_err(RollCallError::Storage)?,
            contact_address: row.contact_address,
            contact_uuid: row.contact_uuid,
            content: row.content,
            received_at: row.received_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ComplaintTotalRow {
    organization_uuid: Uuid,
    roll_call_uuid: Uuid,
    complaint_count: i64,
    updated_at: DateTime<Utc>,
}

impl From<ComplaintTotalRow> for ComplaintRecord {
    fn from(row: ComplaintTotalRow) -> Self {
        Self {
            organization_uuid: row.organization_uuid,
            roll_call_uuid: row.roll_call_uuid,
            count: row.complaint_count,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn roll_call_exists(&self, roll_call_uuid: Uuid) -> Result<bool> {
        let row = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM roll_calls WHERE roll_call_uuid = $1)",
        )
        .bind(roll_call_uuid)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl RollCallStore for PgStore {
    async fn create_roll_call(
        &self,
        new: NewRollCall,
        recipient_users: &[Uuid],
    ) -> Result<RollCall> {
        let roll_call = RollCall::from_new(&new);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO roll_calls
                (roll_call_uuid, organization_uuid, creator_uuid, message, status, self_test,
                 dispatched_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(roll_call.roll_call_uuid)
        .bind(roll_call.organization_uuid)
        .bind(roll_call.creator_uuid)
        .bind(&roll_call.message)
        .bind(roll_call.status.to_string())
        .bind(roll_call.self_test)
        .bind(roll_call.dispatched_at)
        .bind(roll_call.created_at)
        .execute(&mut *tx)
        .await?;

        for &user_uuid in recipient_users {
            sqlx::query(
                r#"
                INSERT INTO roll_call_recipients
                    (roll_call_uuid, user_uuid, response_status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $4)
                ON CONFLICT (roll_call_uuid, user_uuid) DO NOTHING
                "#,
            )
            .bind(roll_call.roll_call_uuid)
            .bind(user_uuid)
            .bind(ResponseStatus::Pending.to_string())
            .bind(roll_call.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(roll_call)
    }

    async fn roll_call(&self, roll_call_uuid: Uuid) -> Result<RollCall> {
        let row = sqlx::query_as::<_, RollCallRow>(
            r#"
            SELECT roll_call_uuid, organization_uuid, creator_uuid, message, status, self_test,
                   dispatched_at, created_at
            FROM roll_calls
            WHERE roll_call_uuid = $1
            "#,
        )
        .bind(roll_call_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RollCallError::NotFound {
            entity: "roll_call",
            id: roll_call_uuid,
        })?
        .try_into()
    }

    async fn list_roll_calls(&self, filter: &RollCallFilter, page: &Page) -> Result<Vec<RollCall>> {
        let rows = sqlx::query_as::<_, RollCallRow>(
            r#"
            SELECT roll_call_uuid, organization_uuid, creator_uuid, message, status, self_test,
                   dispatched_at, created_at
            FROM roll_calls
            WHERE ($1::uuid IS NULL OR organization_uuid = $1)
              AND ($2::uuid IS NULL OR creator_uuid = $2)
              AND ($3::uuid IS NULL
                   OR creator_uuid = $3
                   OR EXISTS (SELECT 1 FROM roll_call_recipients r
                              WHERE r.roll_call_uuid = roll_calls.roll_call_uuid
                                AND r.user_uuid = $3))
            ORDER BY created_at DESC, roll_call_uuid
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(filter.organization_uuid)
        .bind(filter.creator_uuid)
        .bind(filter.recipient_uuid)
        .bind(page.offset as i64)
        .bind(page.limit.map(|limit| limit as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim_for_dispatch(&self, roll_call_uuid: Uuid) -> Result<bool> {
        if !self.roll_call_exists(roll_call_uuid).await? {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE roll_calls
            SET status = $1, dispatched_at = NOW()
            WHERE roll_call_uuid = $2 AND status = $3
            "#,
        )
        .bind(RollCallStatus::Sent.to_string())
        .bind(roll_call_uuid)
        .bind(RollCallStatus::Draft.to_string())
        .execute(&self.pool)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!(roll_call_uuid = %roll_call_uuid, claimed, "Dispatch claim attempt");
        Ok(claimed)
    }

    async fn release_dispatch_claim(&self, roll_call_uuid: Uuid) -> Result<()> {
        if !self.roll_call_exists(roll_call_uuid).await? {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            });
        }

        sqlx::query(
            r#"
            UPDATE roll_calls
            SET status = $1, dispatched_at = NULL
            WHERE roll_call_uuid = $2 AND status = $3
            "#,
        )
        .bind(RollCallStatus::Draft.to_string())
        .bind(roll_call_uuid)
        .bind(RollCallStatus::Sent.to_string())
        .execute(&self.pool)
        .await?;

        debug!(roll_call_uuid = %roll_call_uuid, "Released dispatch claim");
        Ok(())
    }

    async fn update_roll_call_status(
        &self,
        roll_call_uuid: Uuid,
        status: RollCallStatus,
    ) -> Result<RollCall> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RollCallRow>(
            r#"
            SELECT roll_call_uuid, organization_uuid, creator_uuid, message, status, self_test,
                   dispatched_at, created_at
            FROM roll_calls
            WHERE roll_call_uuid = $1
            FOR UPDATE
            "#,
        )
        .bind(roll_call_uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let mut roll_call: RollCall = row
            .ok_or(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            })?
            .try_into()?;

        if !roll_call.status.can_transition_to(status) {
            return Err(RollCallError::InvalidStateTransition {
                entity: "roll_call",
                from: roll_call.status.to_string(),
                to: status.to_string(),
            });
        }

        sqlx::query("UPDATE roll_calls SET status = $1 WHERE roll_call_uuid = $2")
            .bind(status.to_string())
            .bind(roll_call_uuid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        roll_call.status = status;
        Ok(roll_call)
    }

    async fn create_contact(&self, new: NewContact) -> Result<Contact> {
        let contact = Contact::from_new(new);

        sqlx::query(
            r#"
            INSERT INTO contacts (contact_uuid, user_uuid, channel, address, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(contact.contact_uuid)
        .bind(contact.user_uuid)
        .bind(contact.channel.to_string())
        .bind(&contact.address)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;

        Ok(contact)
    }

    async fn contact(&self, contact_uuid: Uuid) -> Result<Contact> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT contact_uuid, user_uuid, channel, address, created_at
            FROM contacts
            WHERE contact_uuid = $1
            "#,
        )
        .bind(contact_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RollCallError::NotFound {
            entity: "contact",
            id: contact_uuid,
        })?
        .try_into()
    }

    async fn contacts_for_user(&self, user_uuid: Uuid) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT contact_uuid, user_uuid, channel, address, created_at
            FROM contacts
            WHERE user_uuid = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn contact_by_address(
        &self,
        channel: Channel,
        address: &str,
    ) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT contact_uuid, user_uuid, channel, address, created_at
            FROM contacts
            WHERE channel = $1 AND address = $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(channel.to_string())
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn recipients(
        &self,
        roll_call_uuid: Uuid,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<Recipient>> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT roll_call_uuid, user_uuid, response_status, created_at, updated_at
            FROM roll_call_recipients
            WHERE roll_call_uuid = $1
              AND ($2::text IS NULL OR response_status = $2)
            ORDER BY created_at, user_uuid
            "#,
        )
        .bind(roll_call_uuid)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn recipient(&self, roll_call_uuid: Uuid, user_uuid: Uuid) -> Result<Recipient> {
        let row = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT roll_call_uuid, user_uuid, response_status, created_at, updated_at
            FROM roll_call_recipients
            WHERE roll_call_uuid = $1 AND user_uuid = $2
            "#,
        )
        .bind(roll_call_uuid)
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RollCallError::NotFound {
            entity: "recipient",
            id: user_uuid,
        })?
        .try_into()
    }

    async fn update_recipient_status(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
        status: ResponseStatus,
    ) -> Result<Recipient> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT roll_call_uuid, user_uuid, response_status, created_at, updated_at
            FROM roll_call_recipients
            WHERE roll_call_uuid = $1 AND user_uuid = $2
            FOR UPDATE
            "#,
        )
        .bind(roll_call_uuid)
        .bind(user_uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let mut recipient: Recipient = row
            .ok_or(RollCallError::NotFound {
                entity: "recipient",
                id: user_uuid,
            })?
            .try_into()?;

        if !recipient.response_status.can_transition_to(status) {
            return Err(RollCallError::InvalidStateTransition {
                entity: "recipient",
                from: recipient.response_status.to_string(),
                to: status.to_string(),
            });
        }

        let updated_at = Utc::now();
        sqlx::query(
            r#"
            UPDATE roll_call_recipients
            SET response_status = $1, updated_at = $2
            WHERE roll_call_uuid = $3 AND user_uuid = $4
            "#,
        )
        .bind(status.to_string())
        .bind(updated_at)
        .bind(roll_call_uuid)
        .bind(user_uuid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        recipient.response_status = status;
        recipient.updated_at = updated_at;
        Ok(recipient)
    }

    async fn record_outbound_message(&self, new: NewOutboundMessage) -> Result<OutboundMessage> {
        if !self.roll_call_exists(new.roll_call_uuid).await? {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: new.roll_call_uuid,
            });
        }
        let contact = self.contact(new.contact_uuid).await?;
        if contact.channel != new.channel {
            return Err(RollCallError::Validation(format!(
                "contact {} is on channel {}, message claims {}",
                contact.contact_uuid, contact.channel, new.channel
            )));
        }

        let message = OutboundMessage::from_new(new);

        sqlx::query(
            r#"
            INSERT INTO outbound_messages
                (message_uuid, roll_call_uuid, contact_uuid, channel, provider_message_id, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.message_uuid)
        .bind(message.roll_call_uuid)
        .bind(message.contact_uuid)
        .bind(message.channel.to_string())
        .bind(&message.provider_message_id)
        .bind(message.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn messages(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Option<Uuid>,
    ) -> Result<Vec<OutboundMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.message_uuid, m.roll_call_uuid, m.contact_uuid, m.channel,
                   m.provider_message_id, m.sent_at
            FROM outbound_messages m
            JOIN contacts c ON c.contact_uuid = m.contact_uuid
            WHERE m.roll_call_uuid = $1
              AND ($2::uuid IS NULL OR c.user_uuid = $2)
            ORDER BY m.sent_at, m.message_uuid
            "#,
        )
        .bind(roll_call_uuid)
        .bind(user_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn last_unreplied_message_by_contact(
        &self,
        contact_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>> {
        // Existence check keeps NotFound semantics aligned with `contact()`
        let _ = self.contact(contact_uuid).await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.message_uuid, m.roll_call_uuid, m.contact_uuid, m.channel,
                   m.provider_message_id, m.sent_at
            FROM outbound_messages m
            JOIN contacts c ON c.contact_uuid = m.contact_uuid
            WHERE m.contact_uuid = $1
              AND NOT EXISTS (
                  SELECT 1 FROM replies r
                  WHERE r.roll_call_uuid = m.roll_call_uuid
                    AND r.user_uuid = c.user_uuid
                    AND r.created_at >= m.sent_at
              )
            ORDER BY m.sent_at DESC
            LIMIT 1
            "#,
        )
        .bind(contact_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn last_unreplied_message_by_user(
        &self,
        user_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.message_uuid, m.roll_call_uuid, m.contact_uuid, m.channel,
                   m.provider_message_id, m.sent_at
            FROM outbound_messages m
            JOIN contacts c ON c.contact_uuid = m.contact_uuid
            WHERE c.user_uuid = $1
              AND NOT EXISTS (
                  SELECT 1 FROM replies r
                  WHERE r.roll_call_uuid = m.roll_call_uuid
                    AND r.user_uuid = c.user_uuid
                    AND r.created_at >= m.sent_at
              )
            ORDER BY m.sent_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn outstanding_messages(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<OutboundMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT latest.message_uuid, latest.roll_call_uuid, latest.contact_uuid,
                   latest.channel, latest.provider_message_id, latest.sent_at
            FROM (
                SELECT DISTINCT ON (m.contact_uuid)
                       m.message_uuid, m.roll_call_uuid, m.contact_uuid, m.channel,
                       m.provider_message_id, m.sent_at
                FROM outbound_messages m
                JOIN contacts c ON c.contact_uuid = m.contact_uuid
                WHERE NOT EXISTS (
                    SELECT 1 FROM replies r
                    WHERE r.roll_call_uuid = m.roll_call_uuid
                      AND r.user_uuid = c.user_uuid
                      AND r.created_at >= m.sent_at
                )
                ORDER BY m.contact_uuid, m.sent_at DESC
            ) latest
            WHERE latest.sent_at <= $1
            ORDER BY latest.sent_at
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_reply(&self, new: NewReply) -> Result<Reply> {
        if !self.roll_call_exists(new.roll_call_uuid).await? {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: new.roll_call_uuid,
            });
        }
        let _ = self.contact(new.contact_uuid).await?;

        let reply = Reply::from_new(new);

        sqlx::query(
            r#"
            INSERT INTO replies
                (reply_uuid, roll_call_uuid, user_uuid, contact_uuid, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reply.reply_uuid)
        .bind(reply.roll_call_uuid)
        .bind(reply.user_uuid)
        .bind(reply.contact_uuid)
        .bind(&reply.content)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await?;

        Ok(reply)
    }

    async fn replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>> {
        let rows = sqlx::query_as::<_, ReplyRow>(
            r#"
            SELECT reply_uuid, roll_call_uuid, user_uuid, contact_uuid, content, created_at
            FROM replies
            WHERE roll_call_uuid = $1
            ORDER BY created_at, reply_uuid
            "#,
        )
        .bind(roll_call_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>> {
        let rows = sqlx::query_as::<_, ReplyRow>(
            r#"
            SELECT latest.reply_uuid, latest.roll_call_uuid, latest.user_uuid,
                   latest.contact_uuid, latest.content, latest.created_at
            FROM (
                SELECT DISTINCT ON (user_uuid)
                       reply_uuid, roll_call_uuid, user_uuid, contact_uuid, content, created_at
                FROM replies
                WHERE roll_call_uuid = $1
                ORDER BY user_uuid, created_at DESC
            ) latest
            ORDER BY latest.created_at, latest.user_uuid
            "#,
        )
        .bind(roll_call_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn counts(&self, roll_call_uuid: Uuid) -> Result<RollCallCounts> {
        if !self.roll_call_exists(roll_call_uuid).await? {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            });
        }

        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT user_uuid) FROM replies WHERE roll_call_uuid = $1),
                (SELECT COUNT(*) FROM outbound_messages WHERE roll_call_uuid = $1)
            "#,
        )
        .bind(roll_call_uuid)
        .fetch_one(&self.pool)
        .await?;

        Ok(RollCallCounts {
            reply_count: row.0,
            sent_count: row.1,
        })
    }

    async fn record_unmatched_inbound(
        &self,
        new: NewUnmatchedInbound,
    ) -> Result<UnmatchedInbound> {
        let inbound = UnmatchedInbound::from_new(new);

        sqlx::query(
            r#"
            INSERT INTO unmatched_inbound
                (inbound_uuid, channel, contact_address, contact_uuid, content, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(inbound.inbound_uuid)
        .bind(inbound.channel.to_string())
        .bind(&inbound.contact_address)
        .bind(inbound.contact_uuid)
        .bind(&inbound.content)
        .bind(inbound.received_at)
        .execute(&self.pool)
        .await?;

        Ok(inbound)
    }

    async fn unmatched_inbound(&self, limit: usize) -> Result<Vec<UnmatchedInbound>> {
        let rows = sqlx::query_as::<_, UnmatchedRow>(
            r#"
            SELECT inbound_uuid, channel, contact_address, contact_uuid, content, received_at
            FROM unmatched_inbound
            ORDER BY received_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_complaint_total(
        &self,
        organization_uuid: Uuid,
        roll_call_uuid: Uuid,
        count: i64,
    ) -> Result<ComplaintRecord> {
        let roll_call = self.roll_call(roll_call_uuid).await?;
        if roll_call.organization_uuid != organization_uuid {
            return Err(RollCallError::Validation(format!(
                "roll call {} does not belong to organization {}",
                roll_call_uuid, organization_uuid
            )));
        }

        let row = sqlx::query_as::<_, ComplaintTotalRow>(
            r#"
            INSERT INTO complaint_totals (roll_call_uuid, organization_uuid, complaint_count, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (roll_call_uuid) DO UPDATE
                SET complaint_count = GREATEST(complaint_totals.complaint_count, EXCLUDED.complaint_count),
                    updated_at = NOW()
            RETURNING organization_uuid, roll_call_uuid, complaint_count, updated_at
            "#,
        )
        .bind(roll_call_uuid)
        .bind(organization_uuid)
        .bind(count)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn complaint_total_for_org(&self, organization_uuid: Uuid) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(complaint_count), 0)
            FROM complaint_totals
            WHERE organization_uuid = $1
            "#,
        )
        .bind(organization_uuid)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn organization_uuids(&self) -> Result<Vec<Uuid>> {
        let orgs = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT organization_uuid FROM roll_calls ORDER BY organization_uuid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(orgs)
    }
}
