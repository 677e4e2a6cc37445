//! SQLite backend for sessions, messages, and escalation records.
//!
//! A single database file with three tables. The "one open session per
//! user" invariant is a partial unique index on `sessions(user_id)
//! WHERE ended_at IS NULL`, and session counters are updated with
//! additive `SET x = x + ?` statements inside the append transaction —
//! never read-modify-write from the application.

use async_trait::async_trait;
use chrono::Utc;
use sherpa_core::error::StoreError;
use sherpa_core::escalation::{
    EscalationPriority, EscalationRecord, EscalationStatus, Hotline,
};
use sherpa_core::message::{
    ConversationSession, Message, MessageId, Sender, SessionId, UserId,
};
use sherpa_core::store::{EscalationStore, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations — creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL,
                started_at        TEXT NOT NULL,
                ended_at          TEXT,
                context_summary   TEXT,
                long_term_summary TEXT,
                total_tokens      INTEGER NOT NULL DEFAULT 0,
                message_count     INTEGER NOT NULL DEFAULT 0,
                folded_seq        INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        // The "one open session per user" constraint, enforced by the
        // database rather than application logic
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
            ON sessions(user_id) WHERE ended_at IS NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("open-session index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id           TEXT PRIMARY KEY,
                session_id   TEXT NOT NULL REFERENCES sessions(id),
                sender       TEXT NOT NULL,
                content      TEXT NOT NULL,
                seq          INTEGER NOT NULL,
                token_count  INTEGER NOT NULL,
                sentiment    REAL NOT NULL DEFAULT 0.0,
                risk         TEXT,
                citations    TEXT NOT NULL DEFAULT '[]',
                review_note  TEXT,
                created_at   TEXT NOT NULL,
                UNIQUE(session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_seq ON messages(session_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS escalations (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                session_id      TEXT NOT NULL,
                message_id      TEXT NOT NULL UNIQUE,
                excerpt         TEXT,
                resources       TEXT NOT NULL DEFAULT '[]',
                priority        TEXT NOT NULL,
                status          TEXT NOT NULL,
                composite_score REAL NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("escalations table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSession, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let started_at: String = row
            .try_get("started_at")
            .map_err(|e| StoreError::QueryFailed(format!("started_at column: {e}")))?;
        let ended_at: Option<String> = row
            .try_get("ended_at")
            .map_err(|e| StoreError::QueryFailed(format!("ended_at column: {e}")))?;
        let total_tokens: i64 = row
            .try_get("total_tokens")
            .map_err(|e| StoreError::QueryFailed(format!("total_tokens column: {e}")))?;
        let message_count: i64 = row
            .try_get("message_count")
            .map_err(|e| StoreError::QueryFailed(format!("message_count column: {e}")))?;
        let folded_seq: i64 = row
            .try_get("folded_seq")
            .map_err(|e| StoreError::QueryFailed(format!("folded_seq column: {e}")))?;

        Ok(ConversationSession {
            id: SessionId(parse_uuid(&id)?),
            user_id: UserId(parse_uuid(&user_id)?),
            started_at: parse_timestamp(&started_at),
            ended_at: ended_at.as_deref().map(parse_timestamp),
            context_summary: row.try_get("context_summary").ok().flatten(),
            long_term_summary: row.try_get("long_term_summary").ok().flatten(),
            total_tokens: total_tokens as u64,
            message_count: message_count as u64,
            folded_seq: folded_seq as u64,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let sender: String = row
            .try_get("sender")
            .map_err(|e| StoreError::QueryFailed(format!("sender column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::QueryFailed(format!("seq column: {e}")))?;
        let token_count: i64 = row
            .try_get("token_count")
            .map_err(|e| StoreError::QueryFailed(format!("token_count column: {e}")))?;
        let sentiment: f64 = row.try_get("sentiment").unwrap_or(0.0);
        let risk_json: Option<String> = row.try_get("risk").ok().flatten();
        let citations_json: String = row
            .try_get("citations")
            .unwrap_or_else(|_| "[]".to_string());
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Message {
            id: MessageId(parse_uuid(&id)?),
            session_id: SessionId(parse_uuid(&session_id)?),
            sender: parse_sender(&sender)?,
            content,
            seq: seq as u64,
            token_count: token_count as u32,
            sentiment,
            risk: risk_json.and_then(|j| serde_json::from_str(&j).ok()),
            citations: serde_json::from_str(&citations_json).unwrap_or_default(),
            review_note: row.try_get("review_note").ok().flatten(),
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_escalation(row: &sqlx::sqlite::SqliteRow) -> Result<EscalationRecord, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let message_id: String = row
            .try_get("message_id")
            .map_err(|e| StoreError::QueryFailed(format!("message_id column: {e}")))?;
        let priority: String = row
            .try_get("priority")
            .map_err(|e| StoreError::QueryFailed(format!("priority column: {e}")))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?;
        let composite_score: f64 = row
            .try_get("composite_score")
            .map_err(|e| StoreError::QueryFailed(format!("composite_score column: {e}")))?;
        let resources_json: String = row
            .try_get("resources")
            .unwrap_or_else(|_| "[]".to_string());
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        let resources: Vec<Hotline> = serde_json::from_str(&resources_json).unwrap_or_default();

        Ok(EscalationRecord {
            id: parse_uuid(&id)?,
            user_id: UserId(parse_uuid(&user_id)?),
            session_id: SessionId(parse_uuid(&session_id)?),
            message_id: MessageId(parse_uuid(&message_id)?),
            excerpt: row.try_get("excerpt").ok().flatten(),
            resources,
            priority: parse_priority(&priority)?,
            status: parse_status(&status)?,
            composite_score,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::QueryFailed(format!("bad uuid '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_sender(s: &str) -> Result<Sender, StoreError> {
    match s {
        "user" => Ok(Sender::User),
        "assistant" => Ok(Sender::Assistant),
        "system" => Ok(Sender::System),
        other => Err(StoreError::QueryFailed(format!("unknown sender '{other}'"))),
    }
}

fn sender_str(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Assistant => "assistant",
        Sender::System => "system",
    }
}

fn parse_priority(s: &str) -> Result<EscalationPriority, StoreError> {
    match s {
        "high" => Ok(EscalationPriority::High),
        "urgent" => Ok(EscalationPriority::Urgent),
        other => Err(StoreError::QueryFailed(format!(
            "unknown priority '{other}'"
        ))),
    }
}

fn parse_status(s: &str) -> Result<EscalationStatus, StoreError> {
    match s {
        "pending" => Ok(EscalationStatus::Pending),
        "in_review" => Ok(EscalationStatus::InReview),
        "completed" => Ok(EscalationStatus::Completed),
        "escalated" => Ok(EscalationStatus::Escalated),
        other => Err(StoreError::QueryFailed(format!("unknown status '{other}'"))),
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn open(&self, user_id: UserId) -> Result<ConversationSession, StoreError> {
        // Fast path: an open session already exists
        if let Some(row) =
            sqlx::query("SELECT * FROM sessions WHERE user_id = ?1 AND ended_at IS NULL")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("open lookup: {e}")))?
        {
            return Self::row_to_session(&row);
        }

        // Insert; the partial unique index resolves the race with a
        // concurrent open, in which case we fall through to the select.
        let session = ConversationSession::new(user_id);
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, started_at, total_tokens, message_count, folded_seq)
            VALUES (?1, ?2, ?3, 0, 0, 0)
            ON CONFLICT(user_id) WHERE ended_at IS NULL DO NOTHING
            "#,
        )
        .bind(session.id.to_string())
        .bind(user_id.to_string())
        .bind(session.started_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("session insert: {e}")))?;

        let row = sqlx::query("SELECT * FROM sessions WHERE user_id = ?1 AND ended_at IS NULL")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("open reselect: {e}")))?;
        Self::row_to_session(&row)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ConversationSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("session get: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn append(
        &self,
        session_id: SessionId,
        mut message: Message,
    ) -> Result<Message, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("append begin: {e}")))?;

        let row = sqlx::query("SELECT ended_at, message_count FROM sessions WHERE id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("append lookup: {e}")))?
            .ok_or(StoreError::SessionNotFound(session_id.0))?;

        let ended_at: Option<String> = row
            .try_get("ended_at")
            .map_err(|e| StoreError::QueryFailed(format!("ended_at column: {e}")))?;
        if ended_at.is_some() {
            return Err(StoreError::SessionClosed(session_id.0));
        }
        let message_count: i64 = row
            .try_get("message_count")
            .map_err(|e| StoreError::QueryFailed(format!("message_count column: {e}")))?;

        message.session_id = session_id;
        message.seq = message_count as u64;

        let risk_json = message
            .risk
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("risk serialization: {e}")))?;
        let citations_json = serde_json::to_string(&message.citations)
            .map_err(|e| StoreError::Storage(format!("citations serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, session_id, sender, content, seq, token_count, sentiment, risk, citations, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(message.id.to_string())
        .bind(session_id.to_string())
        .bind(sender_str(message.sender))
        .bind(&message.content)
        .bind(message.seq as i64)
        .bind(i64::from(message.token_count))
        .bind(message.sentiment)
        .bind(&risk_json)
        .bind(&citations_json)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("message insert: {e}")))?;

        // Additive counter update: monotonic, safe under concurrency
        sqlx::query(
            r#"
            UPDATE sessions
            SET total_tokens = total_tokens + ?1,
                message_count = message_count + 1
            WHERE id = ?2
            "#,
        )
        .bind(i64::from(message.token_count))
        .bind(session_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("counter update: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("append commit: {e}")))?;

        Ok(message)
    }

    async fn history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(session_id.to_string())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("history: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn close(&self, session_id: SessionId) -> Result<ConversationSession, StoreError> {
        sqlx::query("UPDATE sessions SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("close: {e}")))?;

        self.get_session(session_id)
            .await?
            .ok_or(StoreError::SessionNotFound(session_id.0))
    }

    async fn record_fold(
        &self,
        session_id: SessionId,
        folded_seq: u64,
        context_summary: String,
        long_term_summary: String,
    ) -> Result<(), StoreError> {
        // The folded_seq guard keeps the fold pointer monotonic
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET folded_seq = ?1, context_summary = ?2, long_term_summary = ?3
            WHERE id = ?4 AND folded_seq <= ?1
            "#,
        )
        .bind(folded_seq as i64)
        .bind(&context_summary)
        .bind(&long_term_summary)
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("fold: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Storage(format!(
                "fold rejected for session {session_id}: folded_seq may not move backwards"
            )));
        }
        Ok(())
    }

    async fn attach_review_note(
        &self,
        message_id: MessageId,
        note: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE messages SET review_note = ?1 WHERE id = ?2")
            .bind(note)
            .bind(message_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("review note: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MessageNotFound(message_id.0));
        }
        Ok(())
    }
}

#[async_trait]
impl EscalationStore for SqliteStore {
    async fn insert(&self, record: EscalationRecord) -> Result<EscalationRecord, StoreError> {
        let resources_json = serde_json::to_string(&record.resources)
            .map_err(|e| StoreError::Storage(format!("resources serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO escalations
                (id, user_id, session_id, message_id, excerpt, resources,
                 priority, status, composite_score, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.user_id.to_string())
        .bind(record.session_id.to_string())
        .bind(record.message_id.to_string())
        .bind(&record.excerpt)
        .bind(&resources_json)
        .bind(record.priority.to_string())
        .bind(record.status.to_string())
        .bind(record.composite_score)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("escalation insert: {e}")))?;

        Ok(record)
    }

    async fn get_escalation(&self, id: Uuid) -> Result<Option<EscalationRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM escalations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("escalation get: {e}")))?;

        row.as_ref().map(Self::row_to_escalation).transpose()
    }

    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EscalationRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM escalations WHERE message_id = ?1")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("escalation lookup: {e}")))?;

        row.as_ref().map(Self::row_to_escalation).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        next: EscalationStatus,
    ) -> Result<EscalationRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("transition begin: {e}")))?;

        let row = sqlx::query("SELECT status FROM escalations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("transition lookup: {e}")))?
            .ok_or(StoreError::EscalationNotFound(id))?;

        let status_str: String = row
            .try_get("status")
            .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?;
        let current = parse_status(&status_str)?;

        if !current.can_transition(next) {
            return Err(StoreError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        sqlx::query("UPDATE escalations SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(next.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("transition update: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("transition commit: {e}")))?;

        self.get_escalation(id)
            .await?
            .ok_or(StoreError::EscalationNotFound(id))
    }
}
