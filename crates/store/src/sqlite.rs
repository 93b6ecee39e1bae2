//! SQLite implementation of [`AuditStore`].
//!
//! Timestamps are stored as RFC 3339 text, JSON payloads as serialized text
//! columns. Quota increments go through a conditional `UPDATE` so that two
//! concurrent turns can never jointly push `requests_made` past the ceiling.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use tutoria_core::audit::{
    AuditStore, CompletionStats, Feedback, NewSession, QuotaKey, QuotaLimits, QuotaScope,
    RequestDraft, RequestRecord, RequestStatus, ResponseDraft, ResponseLog, Session, UsageQuota,
};
use tutoria_core::error::StoreError;
use tutoria_core::persona::Persona;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The production audit store.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Open (and create if missing) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // A pooled :memory: database is per-connection, so ephemeral runs
        // pin the pool to a single long-lived connection.
        let in_memory = path.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(if in_memory {
                None
            } else {
                Some(std::time::Duration::from_secs(600))
            })
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite audit store initialized at {path}");
        Ok(store)
    }

    /// Build from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_sessions (
                session_id          TEXT PRIMARY KEY,
                user_id             INTEGER NOT NULL,
                persona             TEXT NOT NULL,
                origin_app          TEXT NOT NULL DEFAULT '',
                class_id            INTEGER,
                context_descriptor  TEXT NOT NULL DEFAULT '',
                context_payload     TEXT NOT NULL DEFAULT '{}',
                is_active           INTEGER NOT NULL DEFAULT 1,
                created_at          TEXT NOT NULL,
                last_interaction_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("ai_sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_requests (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id       TEXT NOT NULL REFERENCES ai_sessions(session_id),
                user_id          INTEGER NOT NULL,
                persona          TEXT NOT NULL,
                origin_app       TEXT NOT NULL DEFAULT '',
                raw_query        TEXT NOT NULL,
                optimized_prompt TEXT NOT NULL DEFAULT '',
                optimizer_trace  TEXT NOT NULL DEFAULT '{}',
                intent_label     TEXT NOT NULL DEFAULT 'general',
                suggested_model  TEXT NOT NULL DEFAULT '',
                resolved_model   TEXT NOT NULL DEFAULT '',
                context_snapshot TEXT NOT NULL DEFAULT '{}',
                status           TEXT NOT NULL DEFAULT 'pending',
                input_tokens     INTEGER NOT NULL DEFAULT 0,
                output_tokens    INTEGER NOT NULL DEFAULT 0,
                cost_estimate    REAL NOT NULL DEFAULT 0,
                latency_ms       INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL,
                completed_at     TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("ai_requests table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ai_requests_session
             ON ai_requests(session_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("session index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_response_logs (
                request_id         INTEGER PRIMARY KEY REFERENCES ai_requests(id),
                response_text      TEXT NOT NULL,
                model_metadata     TEXT NOT NULL DEFAULT '{}',
                guardrail_decision TEXT NOT NULL DEFAULT '{}',
                cache_hit          INTEGER NOT NULL DEFAULT 0,
                user_feedback      TEXT,
                created_at         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("ai_response_logs table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_quotas (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                scope            TEXT NOT NULL,
                user_id          INTEGER,
                class_id         INTEGER,
                period_start     TEXT NOT NULL,
                period_end       TEXT NOT NULL,
                max_requests     INTEGER NOT NULL,
                max_cost         REAL NOT NULL,
                requests_made    INTEGER NOT NULL DEFAULT 0,
                cost_accumulated REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("usage_quotas table: {e}")))?;

        // NULL scope ids are collapsed so lazy creation cannot duplicate a
        // ledger row for the same day.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_usage_quotas_key
             ON usage_quotas(scope, COALESCE(user_id, -1), COALESCE(class_id, -1), period_start)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("quota index: {e}")))?;

        debug!("audit store migrations complete");
        Ok(())
    }

    fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
        let session_id: String = get(row, "session_id")?;
        let session_id = Uuid::parse_str(&session_id)
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let persona: String = get(row, "persona")?;
        Ok(Session {
            session_id,
            user_id: get(row, "user_id")?,
            persona: Persona::from_platform_role(&persona),
            origin_app: get(row, "origin_app")?,
            class_id: get(row, "class_id")?,
            context_descriptor: get(row, "context_descriptor")?,
            context_payload: parse_json(&get::<String>(row, "context_payload")?),
            is_active: get::<i64>(row, "is_active")? != 0,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?),
            last_interaction_at: parse_timestamp(&get::<String>(row, "last_interaction_at")?),
        })
    }

    fn row_to_request(row: &SqliteRow) -> Result<RequestRecord, StoreError> {
        let session_id: String = get(row, "session_id")?;
        let session_id = Uuid::parse_str(&session_id)
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let status: String = get(row, "status")?;
        let status = RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown status: {status}")))?;
        let persona: String = get(row, "persona")?;
        let completed_at: Option<String> = get(row, "completed_at")?;
        Ok(RequestRecord {
            id: get(row, "id")?,
            session_id,
            user_id: get(row, "user_id")?,
            persona: Persona::from_platform_role(&persona),
            origin_app: get(row, "origin_app")?,
            raw_query: get(row, "raw_query")?,
            optimized_prompt: get(row, "optimized_prompt")?,
            optimizer_trace: parse_json(&get::<String>(row, "optimizer_trace")?),
            intent_label: get(row, "intent_label")?,
            suggested_model: get(row, "suggested_model")?,
            resolved_model: get(row, "resolved_model")?,
            context_snapshot: parse_json(&get::<String>(row, "context_snapshot")?),
            status,
            input_tokens: get::<i64>(row, "input_tokens")? as u32,
            output_tokens: get::<i64>(row, "output_tokens")? as u32,
            cost_estimate: get(row, "cost_estimate")?,
            latency_ms: get::<i64>(row, "latency_ms")? as u64,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?),
            completed_at: completed_at.map(|s| parse_timestamp(&s)),
        })
    }

    fn row_to_quota(row: &SqliteRow) -> Result<UsageQuota, StoreError> {
        let scope: String = get(row, "scope")?;
        let scope = QuotaScope::parse(&scope)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown scope: {scope}")))?;
        Ok(UsageQuota {
            id: get(row, "id")?,
            scope,
            user_id: get(row, "user_id")?,
            class_id: get(row, "class_id")?,
            period_start: parse_date(&get::<String>(row, "period_start")?)?,
            period_end: parse_date(&get::<String>(row, "period_end")?)?,
            max_requests: get::<i64>(row, "max_requests")? as u32,
            max_cost: get(row, "max_cost")?,
            requests_made: get::<i64>(row, "requests_made")? as u32,
            cost_accumulated: get(row, "cost_accumulated")?,
        })
    }
}

fn get<'r, T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>>(
    row: &'r SqliteRow,
    column: &str,
) -> Result<T, StoreError> {
    row.try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn parse_json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or(serde_json::Value::Null)
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(text: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| StoreError::QueryFailed(format!("date column: {e}")))
}

fn json_text(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO ai_sessions
                (session_id, user_id, persona, origin_app, class_id,
                 context_descriptor, context_payload, is_active,
                 created_at, last_interaction_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
            "#,
        )
        .bind(session_id.to_string())
        .bind(new.user_id)
        .bind(new.persona.as_str())
        .bind(&new.origin_app)
        .bind(new.class_id)
        .bind(&new.context_descriptor)
        .bind(json_text(&new.context_payload))
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert session: {e}")))?;

        Ok(Session {
            session_id,
            user_id: new.user_id,
            persona: new.persona,
            origin_app: new.origin_app,
            class_id: new.class_id,
            context_descriptor: new.context_descriptor,
            context_payload: new.context_payload,
            is_active: true,
            created_at: now,
            last_interaction_at: now,
        })
    }

    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM ai_sessions WHERE session_id = ?1 AND user_id = ?2",
        )
        .bind(session_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("find session: {e}")))?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE ai_sessions SET last_interaction_at = ?1 WHERE session_id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("touch session: {e}")))?;
        Ok(())
    }

    async fn create_request(&self, draft: RequestDraft) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ai_requests
                (session_id, user_id, persona, origin_app, raw_query,
                 optimized_prompt, optimizer_trace, intent_label,
                 suggested_model, context_snapshot, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11)
            "#,
        )
        .bind(draft.session_id.to_string())
        .bind(draft.user_id)
        .bind(draft.persona.as_str())
        .bind(&draft.origin_app)
        .bind(&draft.raw_query)
        .bind(&draft.optimized_prompt)
        .bind(json_text(&draft.optimizer_trace))
        .bind(&draft.intent_label)
        .bind(&draft.suggested_model)
        .bind(json_text(&draft.context_snapshot))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert request: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    async fn get_request(&self, id: i64) -> Result<Option<RequestRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get request: {e}")))?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn mark_request_completed(
        &self,
        id: i64,
        stats: CompletionStats,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE ai_requests
            SET status = 'completed', resolved_model = ?1, input_tokens = ?2,
                output_tokens = ?3, cost_estimate = ?4, latency_ms = ?5,
                completed_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&stats.resolved_model)
        .bind(stats.input_tokens as i64)
        .bind(stats.output_tokens as i64)
        .bind(stats.cost)
        .bind(stats.latency_ms as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("complete request: {e}")))?;
        Ok(())
    }

    async fn mark_request_errored(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ai_requests SET status = 'errored', completed_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("error request: {e}")))?;
        Ok(())
    }

    async fn requests_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<(RequestRecord, Option<ResponseLog>)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.*,
                   l.response_text      AS log_text,
                   l.model_metadata     AS log_metadata,
                   l.guardrail_decision AS log_guardrail,
                   l.cache_hit          AS log_cache_hit,
                   l.user_feedback      AS log_feedback,
                   l.created_at         AS log_created_at
            FROM ai_requests r
            LEFT JOIN ai_response_logs l ON l.request_id = r.id
            WHERE r.session_id = ?1
            ORDER BY r.created_at ASC, r.id ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("session requests: {e}")))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let request = Self::row_to_request(row)?;
            let log_created: Option<String> = get(row, "log_created_at")?;
            let log = match log_created {
                Some(created) => {
                    let feedback: Option<String> = get(row, "log_feedback")?;
                    Some(ResponseLog {
                        request_id: request.id,
                        response_text: get(row, "log_text")?,
                        model_metadata: parse_json(&get::<String>(row, "log_metadata")?),
                        guardrail_decision: parse_json(&get::<String>(row, "log_guardrail")?),
                        cache_hit: get::<i64>(row, "log_cache_hit")? != 0,
                        user_feedback: feedback.as_deref().and_then(Feedback::parse),
                        created_at: parse_timestamp(&created),
                    })
                }
                None => None,
            };
            entries.push((request, log));
        }
        Ok(entries)
    }

    async fn create_response_log(&self, draft: ResponseDraft) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ai_response_logs
                (request_id, response_text, model_metadata, guardrail_decision,
                 cache_hit, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(draft.request_id)
        .bind(&draft.response_text)
        .bind(json_text(&draft.model_metadata))
        .bind(json_text(&draft.guardrail_decision))
        .bind(draft.cache_hit as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert response log: {e}")))?;
        Ok(())
    }

    async fn response_log_for(&self, request_id: i64) -> Result<Option<ResponseLog>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_response_logs WHERE request_id = ?1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get response log: {e}")))?;
        row.map(|row| {
            let feedback: Option<String> = get(&row, "user_feedback")?;
            Ok(ResponseLog {
                request_id: get(&row, "request_id")?,
                response_text: get(&row, "response_text")?,
                model_metadata: parse_json(&get::<String>(&row, "model_metadata")?),
                guardrail_decision: parse_json(&get::<String>(&row, "guardrail_decision")?),
                cache_hit: get::<i64>(&row, "cache_hit")? != 0,
                user_feedback: feedback.as_deref().and_then(Feedback::parse),
                created_at: parse_timestamp(&get::<String>(&row, "created_at")?),
            })
        })
        .transpose()
    }

    async fn set_feedback(
        &self,
        request_id: i64,
        user_id: i64,
        feedback: Feedback,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ai_response_logs
            SET user_feedback = ?1
            WHERE request_id = ?2
              AND EXISTS (SELECT 1 FROM ai_requests r
                          WHERE r.id = ?2 AND r.user_id = ?3)
            "#,
        )
        .bind(feedback.as_str())
        .bind(request_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("set feedback: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_quota(
        &self,
        key: &QuotaKey,
        day: NaiveDate,
        defaults: QuotaLimits,
    ) -> Result<UsageQuota, StoreError> {
        let day_text = day.format(DATE_FORMAT).to_string();
        sqlx::query(
            r#"
            INSERT INTO usage_quotas
                (scope, user_id, class_id, period_start, period_end,
                 max_requests, max_cost, requests_made, cost_accumulated)
            VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, 0, 0)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(key.scope.as_str())
        .bind(key.user_id)
        .bind(key.class_id)
        .bind(&day_text)
        .bind(defaults.max_requests as i64)
        .bind(defaults.max_cost)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert quota: {e}")))?;

        let row = sqlx::query(
            r#"
            SELECT * FROM usage_quotas
            WHERE scope = ?1 AND user_id IS ?2 AND class_id IS ?3
              AND period_start = ?4
            "#,
        )
        .bind(key.scope.as_str())
        .bind(key.user_id)
        .bind(key.class_id)
        .bind(&day_text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get quota: {e}")))?;
        Self::row_to_quota(&row)
    }

    async fn register_usage(&self, quota_id: i64, cost: f64) -> Result<bool, StoreError> {
        // Conditional so a concurrent turn that consumed the last slot makes
        // this one report failure instead of overshooting.
        let result = sqlx::query(
            r#"
            UPDATE usage_quotas
            SET requests_made = requests_made + 1,
                cost_accumulated = cost_accumulated + ?1
            WHERE id = ?2
              AND (max_requests <= 0 OR requests_made < max_requests)
            "#,
        )
        .bind(cost)
        .bind(quota_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("register usage: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteAuditStore {
        SqliteAuditStore::new("sqlite::memory:").await.unwrap()
    }

    fn new_session(user_id: i64) -> NewSession {
        NewSession {
            user_id,
            persona: Persona::Student,
            origin_app: "diario".to_string(),
            class_id: Some(1),
            context_descriptor: "PIT 2.º período".to_string(),
            context_payload: json!({"topic": "tabuadas"}),
        }
    }

    fn draft_for(session_id: Uuid, user_id: i64) -> RequestDraft {
        RequestDraft {
            session_id,
            user_id,
            persona: Persona::Student,
            origin_app: "diario".to_string(),
            raw_query: "como treinar a tabuada do 7?".to_string(),
            optimized_prompt: "Sugere exercícios para a tabuada do 7.".to_string(),
            optimizer_trace: json!({"intent": "orientacao_imediata"}),
            intent_label: "orientacao_imediata".to_string(),
            suggested_model: "".to_string(),
            context_snapshot: json!({"persona": "student"}),
        }
    }

    #[tokio::test]
    async fn session_round_trip() {
        let store = store().await;
        let session = store.create_session(new_session(7)).await.unwrap();

        let found = store
            .find_session(session.session_id, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.persona, Persona::Student);
        assert_eq!(found.class_id, Some(1));
        assert_eq!(found.context_payload["topic"], json!("tabuadas"));

        // Another user cannot see the session.
        assert!(store.find_session(session.session_id, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn request_lifecycle() {
        let store = store().await;
        let session = store.create_session(new_session(7)).await.unwrap();
        let request_id = store
            .create_request(draft_for(session.session_id, 7))
            .await
            .unwrap();

        let pending = store.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(pending.status, RequestStatus::Pending);
        assert!(pending.completed_at.is_none());

        store
            .mark_request_completed(
                request_id,
                CompletionStats {
                    resolved_model: "gpt-5-mini".to_string(),
                    input_tokens: 120,
                    output_tokens: 80,
                    cost: 0.00018,
                    latency_ms: 420,
                },
            )
            .await
            .unwrap();

        let done = store.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert_eq!(done.resolved_model, "gpt-5-mini");
        assert_eq!(done.input_tokens, 120);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn errored_request_keeps_audit_row() {
        let store = store().await;
        let session = store.create_session(new_session(7)).await.unwrap();
        let request_id = store
            .create_request(draft_for(session.session_id, 7))
            .await
            .unwrap();
        store.mark_request_errored(request_id).await.unwrap();

        let errored = store.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(errored.status, RequestStatus::Errored);
        assert!(store.response_log_for(request_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn response_log_and_feedback() {
        let store = store().await;
        let session = store.create_session(new_session(7)).await.unwrap();
        let request_id = store
            .create_request(draft_for(session.session_id, 7))
            .await
            .unwrap();
        store
            .create_response_log(ResponseDraft {
                request_id,
                response_text: "Treina 5 minutos por dia.".to_string(),
                model_metadata: json!({"model": "gpt-5-mini"}),
                guardrail_decision: json!({"allow": true}),
                cache_hit: false,
            })
            .await
            .unwrap();

        // Feedback by the owner sticks; repeating it is a no-op success.
        assert!(store.set_feedback(request_id, 7, Feedback::Helpful).await.unwrap());
        assert!(store.set_feedback(request_id, 7, Feedback::Helpful).await.unwrap());
        // A different user cannot attach feedback.
        assert!(!store.set_feedback(request_id, 8, Feedback::NotHelpful).await.unwrap());

        let log = store.response_log_for(request_id).await.unwrap().unwrap();
        assert_eq!(log.user_feedback, Some(Feedback::Helpful));
        assert!(!log.cache_hit);
    }

    #[tokio::test]
    async fn session_listing_joins_logs() {
        let store = store().await;
        let session = store.create_session(new_session(7)).await.unwrap();
        let first = store
            .create_request(draft_for(session.session_id, 7))
            .await
            .unwrap();
        let second = store
            .create_request(draft_for(session.session_id, 7))
            .await
            .unwrap();
        store
            .create_response_log(ResponseDraft {
                request_id: first,
                response_text: "Resposta um.".to_string(),
                model_metadata: json!({}),
                guardrail_decision: json!({"allow": true}),
                cache_hit: true,
            })
            .await
            .unwrap();

        let entries = store.requests_for_session(session.session_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.id, first);
        assert!(entries[0].1.as_ref().unwrap().cache_hit);
        assert_eq!(entries[1].0.id, second);
        assert!(entries[1].1.is_none());
    }

    #[tokio::test]
    async fn quota_lazy_create_is_idempotent() {
        let store = store().await;
        let key = QuotaKey::for_user(7, None);
        let day = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        let limits = QuotaLimits {
            max_requests: 12,
            max_cost: 1.5,
        };

        let first = store.get_or_create_quota(&key, day, limits).await.unwrap();
        let second = store.get_or_create_quota(&key, day, limits).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.max_requests, 12);
        assert_eq!(first.requests_made, 0);

        // A new day gets a fresh row.
        let next_day = day.succ_opt().unwrap();
        let third = store.get_or_create_quota(&key, next_day, limits).await.unwrap();
        assert_ne!(first.id, third.id);
    }

    #[tokio::test]
    async fn usage_registration_stops_at_ceiling() {
        let store = store().await;
        let key = QuotaKey::for_user(7, None);
        let day = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        let quota = store
            .get_or_create_quota(
                &key,
                day,
                QuotaLimits {
                    max_requests: 2,
                    max_cost: 1.5,
                },
            )
            .await
            .unwrap();

        assert!(store.register_usage(quota.id, 0.1).await.unwrap());
        assert!(store.register_usage(quota.id, 0.2).await.unwrap());
        // Ceiling consumed: the conditional update refuses the third.
        assert!(!store.register_usage(quota.id, 0.3).await.unwrap());

        let after = store.get_or_create_quota(&key, day, QuotaLimits {
            max_requests: 2,
            max_cost: 1.5,
        })
        .await
        .unwrap();
        assert_eq!(after.requests_made, 2);
        assert!((after.cost_accumulated - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unlimited_quota_never_refuses() {
        let store = store().await;
        let key = QuotaKey::for_user(9, None);
        let day = NaiveDate::from_ymd_opt(2026, 2, 11).unwrap();
        let quota = store
            .get_or_create_quota(
                &key,
                day,
                QuotaLimits {
                    max_requests: 0,
                    max_cost: 0.0,
                },
            )
            .await
            .unwrap();
        for _ in 0..5 {
            assert!(store.register_usage(quota.id, 0.5).await.unwrap());
        }
    }
}
