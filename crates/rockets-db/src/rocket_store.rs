//! `PostgreSQL` implementation of [`RocketStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rockets_types::{Rocket, RocketId, SortKey};
use sqlx::PgPool;

use crate::error::DbError;
use crate::store::RocketStore;

/// Column list shared by every query that returns full rows.
const ROCKET_COLUMNS: &str = "id, kind, current_speed, mission, status, explosion_reason, \
                              launch_time, last_updated, last_applied_sequence";

/// Operations on the `rockets` table.
#[derive(Clone)]
pub struct PgRocketStore {
    pool: PgPool,
}

impl PgRocketStore {
    /// Create a new rocket store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `ORDER BY` clause for a listing.
///
/// Only static strings reach the query text; the sort key never does.
const fn order_clause(sort: Option<SortKey>) -> &'static str {
    match sort {
        None => "last_updated DESC, id",
        Some(SortKey::Kind) => "kind ASC, id",
        Some(SortKey::Speed) => "current_speed ASC, id",
        Some(SortKey::Mission) => "mission ASC, id",
        Some(SortKey::Status) => "status ASC, id",
        Some(SortKey::LaunchTime) => "launch_time ASC, id",
        Some(SortKey::LastUpdated) => "last_updated ASC, id",
    }
}

#[async_trait]
impl RocketStore for PgRocketStore {
    async fn get(&self, id: &RocketId) -> Result<Option<Rocket>, DbError> {
        let row = sqlx::query_as::<_, RocketRow>(&format!(
            "SELECT {ROCKET_COLUMNS} FROM rockets WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Rocket::try_from).transpose()
    }

    async fn list_all(&self, sort: Option<SortKey>) -> Result<Vec<Rocket>, DbError> {
        let rows = sqlx::query_as::<_, RocketRow>(&format!(
            "SELECT {ROCKET_COLUMNS} FROM rockets ORDER BY {}",
            order_clause(sort)
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Rocket::try_from).collect()
    }

    async fn conditional_upsert(&self, rocket: &Rocket) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"INSERT INTO rockets
                (id, kind, current_speed, mission, status, explosion_reason,
                 launch_time, last_updated, last_applied_sequence)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
              ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                current_speed = EXCLUDED.current_speed,
                mission = EXCLUDED.mission,
                status = EXCLUDED.status,
                explosion_reason = EXCLUDED.explosion_reason,
                launch_time = EXCLUDED.launch_time,
                last_updated = EXCLUDED.last_updated,
                last_applied_sequence = EXCLUDED.last_applied_sequence
              WHERE EXCLUDED.last_applied_sequence > rockets.last_applied_sequence",
        )
        .bind(rocket.id.as_str())
        .bind(&rocket.kind)
        .bind(rocket.current_speed)
        .bind(&rocket.mission)
        .bind(rocket.status.as_str())
        .bind(rocket.explosion_reason.as_deref())
        .bind(rocket.launch_time)
        .bind(rocket.last_updated)
        .bind(rocket.last_applied_sequence)
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() == 1;
        if !written {
            tracing::debug!(
                rocket_id = %rocket.id,
                sequence = rocket.last_applied_sequence,
                "Conditional upsert lost to a newer state"
            );
        }
        Ok(written)
    }
}

/// A row from the `rockets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RocketRow {
    /// Rocket identifier.
    pub id: String,
    /// Rocket model.
    pub kind: String,
    /// Current speed.
    pub current_speed: i64,
    /// Mission name.
    pub mission: String,
    /// Flight status as stored.
    pub status: String,
    /// Explosion reason.
    pub explosion_reason: Option<String>,
    /// Launch time.
    pub launch_time: DateTime<Utc>,
    /// Last state change.
    pub last_updated: DateTime<Utc>,
    /// Highest applied sequence number.
    pub last_applied_sequence: i64,
}

impl TryFrom<RocketRow> for Rocket {
    type Error = DbError;

    fn try_from(row: RocketRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RocketId(row.id),
            kind: row.kind,
            current_speed: row.current_speed,
            mission: row.mission,
            status: row.status.parse()?,
            explosion_reason: row.explosion_reason,
            launch_time: row.launch_time,
            last_updated: row.last_updated,
            last_applied_sequence: row.last_applied_sequence,
        })
    }
}
