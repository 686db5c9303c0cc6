use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Decode a JSON text column; malformed or empty text becomes `Value::Null`
pub fn json_column(raw: Option<String>) -> serde_json::Value {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

/// Map a SQLite row to a Device struct
pub fn map_device_row(row: &SqliteRow) -> Device {
    Device {
        id: row.get("id"),
        name: row.get("name"),
        ip_address: row.get("ip_address"),
        manufacturer: row.get("manufacturer"),
        model: row.get("model"),
        username: row.get("username"),
        password: row.get("password"),
        snmp_community: row.get("snmp_community"),
        port: row.get("port"),
        connection_protocol: row.get("connection_protocol"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Policy struct
pub fn map_policy_row(row: &SqliteRow) -> Policy {
    Policy {
        id: row.get("id"),
        name: row.get("name"),
        policy_type: row.get("policy_type"),
        description: row.get("description"),
        config: json_column(row.get("config")),
        status: row.get("status"),
        created_by: row.try_get::<Option<i64>, _>("created_by").ok().flatten(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a PolicyDeployment struct
pub fn map_deployment_row(row: &SqliteRow) -> PolicyDeployment {
    let result = json_column(row.get("result"));
    PolicyDeployment {
        id: row.get("id"),
        policy_id: row.get("policy_id"),
        device_id: row.get("device_id"),
        operation: row.get("operation"),
        status: row.get("status"),
        deployed_at: row.get("deployed_at"),
        deployed_by: row.try_get::<Option<i64>, _>("deployed_by").ok().flatten(),
        config_snapshot: json_column(row.get("config_snapshot")),
        result: if result.is_null() { None } else { Some(result) },
    }
}

/// Map a SQLite row to a PolicyAlert struct
pub fn map_alert_row(row: &SqliteRow) -> PolicyAlert {
    PolicyAlert {
        id: row.get("id"),
        policy_id: row.try_get::<Option<i64>, _>("policy_id").ok().flatten(),
        device_id: row.try_get::<Option<i64>, _>("device_id").ok().flatten(),
        alert_type: row.get("alert_type"),
        severity: row.get("severity"),
        details: json_column(row.get("details")),
        status: row.get("status"),
        acknowledged_by: row.try_get::<Option<i64>, _>("acknowledged_by").ok().flatten(),
        acknowledged_at: row.get("acknowledged_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a PolicyAuditLog struct
pub fn map_audit_row(row: &SqliteRow) -> PolicyAuditLog {
    PolicyAuditLog {
        id: row.get("id"),
        policy_id: row.get("policy_id"),
        user_id: row.try_get::<Option<i64>, _>("user_id").ok().flatten(),
        action: row.get("action"),
        details: json_column(row.get("details")),
        created_at: row.get("created_at"),
    }
}
