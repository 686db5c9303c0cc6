use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_audit_row;

/// Policy audit log operations
pub struct AuditRepo;

impl AuditRepo {
    pub async fn create(
        pool: &Pool<Sqlite>,
        policy_id: i64,
        user_id: Option<i64>,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO policy_audit_logs (policy_id, user_id, action, details, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(policy_id)
        .bind(user_id)
        .bind(action)
        .bind(serde_json::to_string(details)?)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_policy(pool: &Pool<Sqlite>, policy_id: i64) -> Result<Vec<PolicyAuditLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, policy_id, user_id, action, details, created_at
            FROM policy_audit_logs WHERE policy_id = ? ORDER BY id
            "#,
        )
        .bind(policy_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_audit_row).collect())
    }
}
