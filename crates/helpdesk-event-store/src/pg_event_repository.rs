//! `PostgreSQL` implementation of the event log, read-model store, and outbox.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{OutboxEntry, OutboxStore};
use helpdesk_core::pipeline::AppendPipeline;
use helpdesk_core::projection::ReadModelStore;
use helpdesk_core::repository::{EventRepository, StoredEvent, check_batch};

const STREAM_VERSION_SQL: &str =
    "SELECT COALESCE(MAX(sequence_number), 0) FROM domain_events WHERE stream_id = $1";

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    pipeline: AppendPipeline,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository` running `pipeline` on every append.
    #[must_use]
    pub fn new(pool: PgPool, pipeline: AppendPipeline) -> Self {
        Self { pool, pipeline }
    }

    async fn stream_version(&self, stream_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar(STREAM_VERSION_SQL)
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn current_version(
        executor: &mut Transaction<'_, Postgres>,
        stream_id: Uuid,
    ) -> Result<i64, DomainError> {
        sqlx::query_scalar(STREAM_VERSION_SQL)
            .bind(stream_id)
            .fetch_one(&mut **executor)
            .await
            .map_err(map_sqlx_error)
    }

    /// Returns `true` if `events` is already stored right after
    /// `expected_version`, which is what a retry sees when the first attempt
    /// committed but its acknowledgement was lost.
    async fn already_appended(
        tx: &mut Transaction<'_, Postgres>,
        stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<bool, DomainError> {
        let limit = i64::try_from(events.len())
            .map_err(|e| DomainError::Validation(format!("batch too large: {e}")))?;
        let stored: Vec<Uuid> = sqlx::query_scalar(
            "SELECT event_id FROM domain_events \
             WHERE stream_id = $1 AND sequence_number > $2 \
             ORDER BY sequence_number ASC LIMIT $3",
        )
        .bind(stream_id)
        .bind(expected_version)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(stored.len() == events.len()
            && stored.iter().zip(events).all(|(id, e)| *id == e.event_id))
    }

    async fn insert_events(
        tx: &mut Transaction<'_, Postgres>,
        events: &[StoredEvent],
    ) -> Result<(), sqlx::Error> {
        for event in events {
            sqlx::query(
                "INSERT INTO domain_events \
                 (event_id, stream_id, event_type, payload, sequence_number, \
                  correlation_id, causation_id, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.event_id)
            .bind(event.stream_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.occurred_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn apply_projections(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stream_id: Uuid,
        new_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        for projection in self.pipeline.projections() {
            let current: Option<serde_json::Value> = sqlx::query_scalar(
                "SELECT document FROM read_models \
                 WHERE projection = $1 AND stream_id = $2 FOR UPDATE",
            )
            .bind(projection.name())
            .bind(stream_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            match projection.project(current, events)? {
                Some(document) => {
                    sqlx::query(
                        "INSERT INTO read_models (projection, stream_id, document, version) \
                         VALUES ($1, $2, $3, $4) \
                         ON CONFLICT (projection, stream_id) DO UPDATE \
                         SET document = EXCLUDED.document, \
                             version = EXCLUDED.version, \
                             updated_at = NOW()",
                    )
                    .bind(projection.name())
                    .bind(stream_id)
                    .bind(&document)
                    .bind(new_version)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_sqlx_error)?;
                }
                None => {
                    sqlx::query("DELETE FROM read_models WHERE projection = $1 AND stream_id = $2")
                        .bind(projection.name())
                        .bind(stream_id)
                        .execute(&mut **tx)
                        .await
                        .map_err(map_sqlx_error)?;
                }
            }
        }
        Ok(())
    }

    async fn enqueue_cascades(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        events: &[StoredEvent],
    ) -> Result<usize, DomainError> {
        let messages = self.pipeline.cascade(events)?;
        let count = messages.len();
        for message in messages {
            sqlx::query(
                "INSERT INTO outbox_entries \
                 (id, destination, message_type, payload, ordering_key, \
                  correlation_id, causation_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::new_v4())
            .bind(&message.destination)
            .bind(&message.message_type)
            .bind(&message.payload)
            .bind(&message.ordering_key)
            .bind(message.correlation_id)
            .bind(message.causation_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(count)
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[instrument(skip(self))]
    async fn load_events(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(
            "SELECT event_id, stream_id, event_type, payload, sequence_number, \
                    correlation_id, causation_id, occurred_at \
             FROM domain_events WHERE stream_id = $1 ORDER BY sequence_number ASC",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_events(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        check_batch(stream_id, expected_version, events)?;
        let appended = i64::try_from(events.len())
            .map_err(|e| DomainError::Validation(format!("batch too large: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let actual = Self::current_version(&mut tx, stream_id).await?;
        if actual != expected_version {
            if !events.is_empty()
                && Self::already_appended(&mut tx, stream_id, expected_version, events).await?
            {
                debug!(%stream_id, expected_version, "batch already appended");
                return Ok(expected_version + appended);
            }
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: stream_id,
                expected: expected_version,
                actual,
            });
        }
        if events.is_empty() {
            return Ok(actual);
        }

        if let Err(err) = Self::insert_events(&mut tx, events).await {
            if is_unique_violation(&err) {
                // A concurrent writer committed the same sequence numbers.
                drop(tx);
                let actual = self.stream_version(stream_id).await?;
                warn!(%stream_id, expected_version, actual, "lost append race");
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: stream_id,
                    expected: expected_version,
                    actual,
                });
            }
            return Err(map_sqlx_error(err));
        }

        let new_version = expected_version + appended;
        self.apply_projections(&mut tx, stream_id, new_version, events)
            .await?;
        let enqueued = self.enqueue_cascades(&mut tx, events).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(%stream_id, new_version, enqueued, "appended events");
        Ok(new_version)
    }
}

#[async_trait]
impl ReadModelStore for PgEventRepository {
    async fn load_document(
        &self,
        projection: &str,
        stream_id: Uuid,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        sqlx::query_scalar(
            "SELECT document FROM read_models WHERE projection = $1 AND stream_id = $2",
        )
        .bind(projection)
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

// The status predicate is repeated on the updated row so a concurrent
// relay that claimed the same head in the meantime wins the row.
const CLAIM_SQL: &str = "WITH heads AS ( \
         SELECT DISTINCT ON (ordering_key) id, position, status, claimed_at \
         FROM outbox_entries \
         WHERE status <> 'acknowledged' \
         ORDER BY ordering_key, position \
     ), eligible AS ( \
         SELECT id FROM heads \
         WHERE status = 'pending' \
            OR (status = 'dispatching' AND claimed_at <= $2) \
         ORDER BY position \
         LIMIT $3 \
     ) \
     UPDATE outbox_entries o \
     SET status = 'dispatching', claimed_at = $1, attempts = o.attempts + 1 \
     FROM eligible \
     WHERE o.id = eligible.id \
       AND (o.status = 'pending' \
            OR (o.status = 'dispatching' AND o.claimed_at <= $2)) \
     RETURNING o.*";

#[async_trait]
impl OutboxStore for PgEventRepository {
    #[instrument(skip(self))]
    async fn claim_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let limit = i64::try_from(limit)
            .map_err(|e| DomainError::Validation(format!("claim limit too large: {e}")))?;
        let lease_expired_before = now - lease;

        let rows = sqlx::query(CLAIM_SQL)
            .bind(now)
            .bind(lease_expired_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut entries = rows
            .iter()
            .map(row_to_outbox_entry)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.position);
        Ok(entries)
    }

    async fn acknowledge(&self, claim: &OutboxEntry) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE outbox_entries SET status = 'acknowledged' \
             WHERE id = $1 AND status = 'dispatching' AND claimed_at = $2",
        )
        .bind(claim.id)
        .bind(claim.claimed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, claim: &OutboxEntry, error: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE outbox_entries \
             SET status = 'pending', claimed_at = NULL, last_error = $3 \
             WHERE id = $1 AND status = 'dispatching' AND claimed_at = $2",
        )
        .bind(claim.id)
        .bind(claim.claimed_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn pending_count(&self) -> Result<u64, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_entries WHERE status <> 'acknowledged'")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        u64::try_from(count).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }
}

fn row_to_event(row: &PgRow) -> Result<StoredEvent, DomainError> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(map_sqlx_error)?,
        stream_id: row.try_get("stream_id").map_err(map_sqlx_error)?,
        event_type: row.try_get("event_type").map_err(map_sqlx_error)?,
        payload: row.try_get("payload").map_err(map_sqlx_error)?,
        sequence_number: row.try_get("sequence_number").map_err(map_sqlx_error)?,
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        causation_id: row.try_get("causation_id").map_err(map_sqlx_error)?,
        occurred_at: row.try_get("occurred_at").map_err(map_sqlx_error)?,
    })
}

fn row_to_outbox_entry(row: &PgRow) -> Result<OutboxEntry, DomainError> {
    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    Ok(OutboxEntry {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        position: row.try_get("position").map_err(map_sqlx_error)?,
        destination: row.try_get("destination").map_err(map_sqlx_error)?,
        message_type: row.try_get("message_type").map_err(map_sqlx_error)?,
        payload: row.try_get("payload").map_err(map_sqlx_error)?,
        ordering_key: row.try_get("ordering_key").map_err(map_sqlx_error)?,
        status: status.parse()?,
        attempts: row.try_get("attempts").map_err(map_sqlx_error)?,
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        causation_id: row.try_get("causation_id").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        claimed_at: row.try_get("claimed_at").map_err(map_sqlx_error)?,
        last_error: row.try_get("last_error").map_err(map_sqlx_error)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Maps a driver error onto the domain taxonomy: connection-level failures,
/// serialization failures, and deadlocks are transient; the rest are fatal.
fn map_sqlx_error(err: sqlx::Error) -> DomainError {
    let transient = match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code == "40001" || code == "40P01" || code.starts_with("08")),
        _ => false,
    };
    if transient {
        DomainError::Transient(err.to_string())
    } else {
        DomainError::Infrastructure(err.to_string())
    }
}
