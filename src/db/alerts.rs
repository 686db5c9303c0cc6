use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_alert_row;

const SELECT_ALERT: &str = r#"
    SELECT id, policy_id, device_id, alert_type, severity, details, status,
           acknowledged_by, acknowledged_at, created_at, updated_at
    FROM policy_alerts
"#;

/// Policy alert operations
pub struct AlertRepo;

impl AlertRepo {
    pub async fn create(pool: &Pool<Sqlite>, new: &NewAlert) -> Result<PolicyAlert> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO policy_alerts (policy_id, device_id, alert_type, severity, details, status,
                                       created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'new', ?, ?)
            "#,
        )
        .bind(new.policy_id)
        .bind(new.device_id)
        .bind(new.alert_type)
        .bind(new.severity)
        .bind(serde_json::to_string(&new.details)?)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        Self::get(pool, id)
            .await?
            .context("Alert not found after creation")
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<PolicyAlert>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ALERT))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_alert_row))
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &AlertFilter, limit: i32) -> Result<Vec<PolicyAlert>> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR policy_id = ?)
              AND (? IS NULL OR device_id = ?)
            ORDER BY id DESC LIMIT ?"#,
            SELECT_ALERT
        ))
        .bind(&filter.status)
        .bind(&filter.status)
        .bind(filter.policy_id)
        .bind(filter.policy_id)
        .bind(filter.device_id)
        .bind(filter.device_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_alert_row).collect())
    }

    /// An alert of this type for the pair that nobody has resolved yet
    pub async fn find_open(
        pool: &Pool<Sqlite>,
        policy_id: Option<i64>,
        device_id: Option<i64>,
        alert_type: &str,
    ) -> Result<Option<PolicyAlert>> {
        let row = sqlx::query(&format!(
            r#"{}
            WHERE alert_type = ? AND status != 'resolved'
              AND policy_id IS ? AND device_id IS ?
            ORDER BY id DESC LIMIT 1"#,
            SELECT_ALERT
        ))
        .bind(alert_type)
        .bind(policy_id)
        .bind(device_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_alert_row))
    }

    pub async fn acknowledge(pool: &Pool<Sqlite>, id: i64, user_id: Option<i64>) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE policy_alerts SET status = 'acknowledged', acknowledged_by = ?, acknowledged_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn resolve(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        sqlx::query("UPDATE policy_alerts SET status = 'resolved', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
