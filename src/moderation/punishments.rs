/// Punishment management
///
/// Sanctions applied to an employee as the consequence of a moderation
/// decision. Rows are never deleted; revocation and expiry are status
/// transitions retained for audit.
use crate::{
    db,
    error::{HubError, HubResult},
    moderation::state::{punishment_transition, PunishmentEvent, PunishmentStatus},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Punishment kinds, in increasing order of weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentKind {
    Warning,
    Mute,
    Suspension,
    Ban,
}

impl PunishmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentKind::Warning => "warning",
            PunishmentKind::Mute => "mute",
            PunishmentKind::Suspension => "suspension",
            PunishmentKind::Ban => "ban",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "warning" => Ok(PunishmentKind::Warning),
            "mute" => Ok(PunishmentKind::Mute),
            "suspension" => Ok(PunishmentKind::Suspension),
            "ban" => Ok(PunishmentKind::Ban),
            _ => Err(HubError::Validation(format!(
                "Invalid punishment kind: {}",
                s
            ))),
        }
    }

    /// Infraction points accumulated by this sanction
    pub fn points(&self) -> i64 {
        match self {
            PunishmentKind::Warning => 1,
            PunishmentKind::Mute => 2,
            PunishmentKind::Suspension => 5,
            PunishmentKind::Ban => 10,
        }
    }

    /// Bans and suspensions block the account entirely
    pub fn is_blocking(&self) -> bool {
        matches!(self, PunishmentKind::Suspension | PunishmentKind::Ban)
    }
}

/// Duration of a sanction
#[derive(Debug, Clone, Copy)]
pub enum Sanction {
    For(Duration),
    Permanent,
}

/// Punishment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentRecord {
    pub id: i64,
    pub employee_id: String,
    pub record_id: Option<i64>,
    pub kind: PunishmentKind,
    pub status: PunishmentStatus,
    pub severity: String,
    pub reason: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub infraction_points: i64,
    pub revoked_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Punishment manager
#[derive(Clone)]
pub struct PunishmentManager {
    db: SqlitePool,
}

impl PunishmentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply a sanction. `severity` carries the moderation record's severity
    /// label for reporting.
    pub async fn apply(
        &self,
        employee_id: &str,
        record_id: Option<i64>,
        kind: PunishmentKind,
        severity: &str,
        reason: &str,
        sanction: Sanction,
    ) -> HubResult<PunishmentRecord> {
        let mut tx = self.db.begin().await?;
        let record = Self::apply_on(&mut tx, employee_id, record_id, kind, severity, reason, sanction)
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Transaction-composable variant used by the moderation and appeal
    /// workflows.
    pub async fn apply_on(
        conn: &mut SqliteConnection,
        employee_id: &str,
        record_id: Option<i64>,
        kind: PunishmentKind,
        severity: &str,
        reason: &str,
        sanction: Sanction,
    ) -> HubResult<PunishmentRecord> {
        let now = Utc::now();
        let (end_date, is_permanent) = match sanction {
            Sanction::For(d) => {
                if d <= Duration::zero() {
                    return Err(HubError::Validation(
                        "Punishment duration must be positive".to_string(),
                    ));
                }
                (Some(now + d), false)
            }
            Sanction::Permanent => (None, true),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO punishment
            (employee_id, record_id, kind, status, severity, reason,
             start_date, end_date, is_permanent, infraction_points)
            VALUES (?, ?, ?, 'active', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(record_id)
        .bind(kind.as_str())
        .bind(severity)
        .bind(reason)
        .bind(now.to_rfc3339())
        .bind(end_date.map(|dt| dt.to_rfc3339()))
        .bind(is_permanent)
        .bind(kind.points())
        .execute(conn)
        .await?;

        crate::metrics::PUNISHMENTS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        Ok(PunishmentRecord {
            id: result.last_insert_rowid(),
            employee_id: employee_id.to_string(),
            record_id,
            kind,
            status: PunishmentStatus::Active,
            severity: severity.to_string(),
            reason: reason.to_string(),
            start_date: now,
            end_date,
            is_permanent,
            infraction_points: kind.points(),
            revoked_by: None,
            revoked_at: None,
        })
    }

    /// Revoke an active punishment
    pub async fn revoke(&self, punishment_id: i64, revoked_by: &str) -> HubResult<()> {
        let mut tx = self.db.begin().await?;
        Self::revoke_on(&mut tx, punishment_id, revoked_by).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Transaction-composable revocation (used by overturned appeals)
    pub async fn revoke_on(
        conn: &mut SqliteConnection,
        punishment_id: i64,
        revoked_by: &str,
    ) -> HubResult<()> {
        let row = sqlx::query("SELECT status FROM punishment WHERE id = ?")
            .bind(punishment_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                HubError::NotFound(format!("Punishment {} not found", punishment_id))
            })?;

        let status = PunishmentStatus::from_str(&row.get::<String, _>("status"))?;
        let next = punishment_transition(status, PunishmentEvent::Revoke)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE punishment
            SET status = ?, revoked_by = ?, revoked_at = ?
            WHERE id = ?
            "#,
        )
        .bind(next.as_str())
        .bind(revoked_by)
        .bind(now.to_rfc3339())
        .bind(punishment_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Active punishments for an employee. A row past its end date is
    /// treated as expired at query time even before the sweep has run.
    pub async fn active_for(&self, employee_id: &str) -> HubResult<Vec<PunishmentRecord>> {
        let now = Utc::now().to_rfc3339();

        let rows = sqlx::query(
            r#"
            SELECT id, employee_id, record_id, kind, status, severity, reason,
                   start_date, end_date, is_permanent, infraction_points,
                   revoked_by, revoked_at
            FROM punishment
            WHERE employee_id = ?
              AND status = 'active'
              AND (end_date IS NULL OR end_date > ?)
            ORDER BY start_date DESC
            "#,
        )
        .bind(employee_id)
        .bind(&now)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_record).collect()
    }

    /// Whether the employee is currently banned or suspended
    pub async fn has_blocking(&self, employee_id: &str) -> HubResult<bool> {
        let active = self.active_for(employee_id).await?;
        Ok(active.iter().any(|p| p.kind.is_blocking()))
    }

    /// Full sanction history for an employee
    pub async fn history(&self, employee_id: &str) -> HubResult<Vec<PunishmentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, employee_id, record_id, kind, status, severity, reason,
                   start_date, end_date, is_permanent, infraction_points,
                   revoked_by, revoked_at
            FROM punishment
            WHERE employee_id = ?
            ORDER BY start_date DESC
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_record).collect()
    }

    /// Total infraction points accumulated by an employee (all time)
    pub async fn infraction_points(&self, employee_id: &str) -> HubResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(infraction_points) FROM punishment WHERE employee_id = ?",
        )
        .bind(employee_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Active punishment linked to a moderation record, if any
    pub async fn active_for_record(
        conn: &mut SqliteConnection,
        record_id: i64,
    ) -> HubResult<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM punishment WHERE record_id = ? AND status = 'active' LIMIT 1",
        )
        .bind(record_id)
        .fetch_optional(conn)
        .await?;

        Ok(id)
    }

    /// Mark stale active punishments Expired. Returns count transitioned.
    pub async fn sweep_expired(&self) -> HubResult<u64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE punishment
            SET status = 'expired'
            WHERE status = 'active'
              AND end_date IS NOT NULL
              AND end_date < ?
            "#,
        )
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    fn parse_record(row: sqlx::sqlite::SqliteRow) -> HubResult<PunishmentRecord> {
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let start_str: String = row.get("start_date");

        Ok(PunishmentRecord {
            id: row.get("id"),
            employee_id: row.get("employee_id"),
            record_id: row.get("record_id"),
            kind: PunishmentKind::from_str(&kind_str)?,
            status: PunishmentStatus::from_str(&status_str)?,
            severity: row.get("severity"),
            reason: row.get("reason"),
            start_date: db::parse_timestamp(&start_str)?,
            end_date: db::parse_opt_timestamp(row.try_get("end_date").ok()),
            is_permanent: row.get("is_permanent"),
            infraction_points: row.get("infraction_points"),
            revoked_by: row.get("revoked_by"),
            revoked_at: db::parse_opt_timestamp(row.try_get("revoked_at").ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_permanent_ban_has_no_end_date() {
        let manager = PunishmentManager::new(test_pool().await);

        let record = manager
            .apply(
                "emp-1",
                None,
                PunishmentKind::Ban,
                "critical",
                "Repeated harassment",
                Sanction::Permanent,
            )
            .await
            .unwrap();

        assert!(record.is_permanent);
        assert!(record.end_date.is_none());
        assert!(manager.has_blocking("emp-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_temporary_suspension_end_after_start() {
        let manager = PunishmentManager::new(test_pool().await);

        let record = manager
            .apply(
                "emp-2",
                None,
                PunishmentKind::Suspension,
                "high",
                "Spam",
                Sanction::For(Duration::days(7)),
            )
            .await
            .unwrap();

        assert!(!record.is_permanent);
        assert!(record.end_date.unwrap() > record.start_date);
    }

    #[tokio::test]
    async fn test_warning_does_not_block() {
        let manager = PunishmentManager::new(test_pool().await);

        manager
            .apply(
                "emp-3",
                None,
                PunishmentKind::Warning,
                "low",
                "First offense",
                Sanction::For(Duration::days(30)),
            )
            .await
            .unwrap();

        assert!(!manager.has_blocking("emp-3").await.unwrap());
        assert_eq!(manager.infraction_points("emp-3").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_then_revoke_again_conflicts() {
        let manager = PunishmentManager::new(test_pool().await);

        let record = manager
            .apply(
                "emp-4",
                None,
                PunishmentKind::Ban,
                "critical",
                "Mistake",
                Sanction::Permanent,
            )
            .await
            .unwrap();

        manager.revoke(record.id, "admin-1").await.unwrap();
        assert!(!manager.has_blocking("emp-4").await.unwrap());

        // Second revoke is an illegal transition
        let err = manager.revoke(record.id, "admin-1").await.unwrap_err();
        assert!(matches!(err, HubError::Transition(_)));
    }

    #[tokio::test]
    async fn test_sweep_expires_stale_rows() {
        let pool = test_pool().await;
        let manager = PunishmentManager::new(pool.clone());

        let record = manager
            .apply(
                "emp-5",
                None,
                PunishmentKind::Mute,
                "medium",
                "Noise",
                Sanction::For(Duration::days(1)),
            )
            .await
            .unwrap();

        // Backdate the end
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        sqlx::query("UPDATE punishment SET end_date = ? WHERE id = ?")
            .bind(&past)
            .bind(record.id)
            .execute(&pool)
            .await
            .unwrap();

        // Query-time filter already hides it
        assert!(manager.active_for("emp-5").await.unwrap().is_empty());

        let swept = manager.sweep_expired().await.unwrap();
        assert_eq!(swept, 1);

        let history = manager.history("emp-5").await.unwrap();
        assert_eq!(history[0].status, PunishmentStatus::Expired);
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let manager = PunishmentManager::new(test_pool().await);

        let err = manager
            .apply(
                "emp-6",
                None,
                PunishmentKind::Mute,
                "low",
                "Bad input",
                Sanction::For(Duration::zero()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }
}
