//! `PostgreSQL` backend for guest check-in.
//!
//! Implements [`GuestBackend`] over a `guests` table and [`ChangeFeed`] over
//! `LISTEN`/`NOTIFY`. The check-in write is conditional
//! (`WHERE scanned = false`), which makes the table the single ordering
//! authority when several stations scan the same guest.
//!
//! # Example
//!
//! ```ignore
//! use checkin_postgres::{PostgresChangeFeed, PostgresGuestBackend};
//!
//! let backend = PostgresGuestBackend::connect("postgres://localhost/checkin", 5).await?;
//! backend.migrate().await?;
//!
//! let feed = PostgresChangeFeed::new(backend.pool().clone());
//! ```

use checkin_guests::ports::BackendFuture;
use checkin_guests::{
    BackendError, ChangeFeed, ChangeStream, GuestBackend, GuestChange, GuestId, GuestRecord,
    NewGuest,
    SHORT_CODE_LEN,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::FromRow;

/// Notification channel the `guests_notify_change` trigger publishes on.
pub const CHANGES_CHANNEL: &str = "guests_changes";

#[derive(Debug, FromRow)]
struct GuestRow {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    scanned: bool,
    registered_at: DateTime<Utc>,
    scanned_at: Option<DateTime<Utc>>,
}

impl From<GuestRow> for GuestRecord {
    fn from(row: GuestRow) -> Self {
        Self {
            id: GuestId::new(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            scanned: row.scanned,
            registered_at: row.registered_at,
            scanned_at: row.scanned_at,
        }
    }
}

/// Constraint violations are the caller's fault; everything else is an outage.
fn map_error(error: sqlx::Error) -> BackendError {
    match &error {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_check_violation()
                || db.is_foreign_key_violation() =>
        {
            BackendError::Validation(db.message().to_string())
        },
        sqlx::Error::RowNotFound => BackendError::NotFound,
        _ => BackendError::Unavailable(error.to_string()),
    }
}

/// Guest backend on a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PostgresGuestBackend {
    pool: PgPool,
}

impl PostgresGuestBackend {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| BackendError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Build a pool that connects on first use.
    ///
    /// A station started while the database is down still gets a backend;
    /// each call then fails with [`BackendError::Unavailable`] until it
    /// comes back.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] if `database_url` cannot be parsed.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect_lazy(database_url)
            .map_err(|e| BackendError::Validation(format!("Invalid database URL: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the `guests` table and its change trigger if missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), BackendError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BackendError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl GuestBackend for PostgresGuestBackend {
    fn fetch_all(&self) -> BackendFuture<'_, Vec<GuestRecord>> {
        Box::pin(async move {
            let rows: Vec<GuestRow> = sqlx::query_as(
                r"
                SELECT id, first_name, last_name, email, scanned, registered_at, scanned_at
                FROM guests
                ORDER BY registered_at DESC
                ",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_error)?;

            tracing::debug!(count = rows.len(), "Fetched guests");
            Ok(rows.into_iter().map(GuestRecord::from).collect())
        })
    }

    fn insert(&self, guest: NewGuest) -> BackendFuture<'_, GuestRecord> {
        Box::pin(async move {
            let row: GuestRow = sqlx::query_as(
                r"
                INSERT INTO guests (first_name, last_name, email)
                VALUES ($1, $2, $3)
                RETURNING id, first_name, last_name, email, scanned, registered_at, scanned_at
                ",
            )
            .bind(&guest.first_name)
            .bind(&guest.last_name)
            .bind(&guest.email)
            .fetch_one(&self.pool)
            .await
            .map_err(map_error)?;

            metrics::counter!("checkin.guests.registered").increment(1);
            Ok(row.into())
        })
    }

    fn mark_checked_in(
        &self,
        id: GuestId,
        scanned_at: DateTime<Utc>,
    ) -> BackendFuture<'_, GuestRecord> {
        Box::pin(async move {
            let updated: Option<GuestRow> = sqlx::query_as(
                r"
                UPDATE guests
                SET scanned = true, scanned_at = $2
                WHERE id = $1 AND scanned = false
                RETURNING id, first_name, last_name, email, scanned, registered_at, scanned_at
                ",
            )
            .bind(id.as_str())
            .bind(scanned_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_error)?;

            if let Some(row) = updated {
                return Ok(row.into());
            }

            // Zero rows: either the guest is gone or another station won.
            let current: Option<(Option<DateTime<Utc>>,)> =
                sqlx::query_as("SELECT scanned_at FROM guests WHERE id = $1")
                    .bind(id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_error)?;

            match current {
                None => Err(BackendError::NotFound),
                Some((Some(winner),)) => {
                    metrics::counter!("checkin.conflicts").increment(1);
                    Err(BackendError::ConflictLost { scanned_at: winner })
                },
                Some((None,)) => Err(BackendError::Unavailable(format!(
                    "check-in for {id} did not apply"
                ))),
            }
        })
    }

    fn find_by_id_or_prefix(&self, code: String) -> BackendFuture<'_, Option<GuestRecord>> {
        Box::pin(async move {
            if code.is_empty() {
                return Ok(None);
            }

            let rows: Vec<GuestRow> = sqlx::query_as(
                r"
                SELECT id, first_name, last_name, email, scanned, registered_at, scanned_at
                FROM guests
                WHERE id = $1 OR (char_length($1) = $2 AND starts_with(id, $1))
                ORDER BY (id = $1) DESC
                LIMIT 2
                ",
            )
            .bind(&code)
            .bind(i32::try_from(SHORT_CODE_LEN).unwrap_or(i32::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(map_error)?;

            let exact = rows.first().is_some_and(|row| row.id == code);
            if exact || rows.len() == 1 {
                return Ok(rows.into_iter().next().map(GuestRecord::from));
            }

            if rows.len() > 1 {
                tracing::debug!(code = %code, "Ambiguous guest code prefix");
            }
            Ok(None)
        })
    }
}

fn parse_change(payload: &str) -> Result<GuestChange, BackendError> {
    serde_json::from_str(payload)
        .map_err(|e| BackendError::Validation(format!("malformed change payload: {e}")))
}

/// Change feed over `LISTEN guests_changes`.
#[derive(Debug, Clone)]
pub struct PostgresChangeFeed {
    pool: PgPool,
}

impl PostgresChangeFeed {
    /// Feed using connections from `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ChangeFeed for PostgresChangeFeed {
    fn subscribe(&self) -> BackendFuture<'_, ChangeStream> {
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&self.pool).await.map_err(map_error)?;
            listener.listen(CHANGES_CHANNEL).await.map_err(map_error)?;

            let stream: ChangeStream = Box::pin(async_stream::stream! {
                loop {
                    match listener.try_recv().await {
                        Ok(Some(notification)) => {
                            yield parse_change(notification.payload());
                        },
                        // Connection lost; notifications sent meanwhile are gone.
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(map_error(e));
                            break;
                        },
                    }
                }
            });
            Ok(stream)
        })
    }
}
