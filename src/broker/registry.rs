//! Broker catalog and user-broker link management (spec §6: `/brokers`,
//! `/user-brokers`, `/data-broker`), grounded on `auth/user_store.rs`'s
//! versioned-record CRUD shape — the same soft-delete-then-insert pattern
//! used throughout this crate for mutable entities.

use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{current_version, soft_delete_current, Store};
use crate::error::AppError;
use crate::models::broker::{
    Broker, BrokerCapabilities, BrokerStatus, RiskPolicy, UserBroker, UserBrokerRole, UserBrokerStatus,
};

fn row_to_broker(row: &Row) -> rusqlite::Result<Broker> {
    let capabilities: BrokerCapabilities = serde_json::from_str(&row.get::<_, String>("capabilities_json")?)
        .unwrap_or_default();
    Ok(Broker {
        broker_id: Uuid::parse_str(&row.get::<_, String>("broker_id")?).unwrap_or_default(),
        broker_code: row.get("broker_code")?,
        broker_name: row.get("broker_name")?,
        adapter_class: row.get("adapter_class")?,
        capabilities,
        status: BrokerStatus::from_str(&row.get::<_, String>("status")?),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

fn row_to_user_broker(row: &Row) -> rusqlite::Result<UserBroker> {
    let risk_policy: RiskPolicy =
        serde_json::from_str(&row.get::<_, String>("risk_policy_json")?).unwrap_or_default();
    Ok(UserBroker {
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        user_id: Uuid::parse_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
        broker_id: Uuid::parse_str(&row.get::<_, String>("broker_id")?).unwrap_or_default(),
        role: UserBrokerRole::from_str(&row.get::<_, String>("role")?),
        credentials: row.get("credentials")?,
        connected: row.get::<_, i64>("connected")? != 0,
        last_connected: row.get::<_, Option<String>>("last_connected")?.and_then(|s| s.parse().ok()),
        connection_error: row.get("connection_error")?,
        risk_policy,
        status: UserBrokerStatus::from_str(&row.get::<_, String>("status")?),
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

#[derive(Debug, Clone)]
pub struct UserBrokerInput {
    pub user_id: Uuid,
    pub broker_id: Uuid,
    pub role: UserBrokerRole,
    pub credentials: String,
    pub risk_policy: RiskPolicy,
}

impl Store {
    pub fn register_broker(
        &self,
        broker_code: &str,
        broker_name: &str,
        adapter_class: &str,
        capabilities: BrokerCapabilities,
    ) -> Result<Broker, AppError> {
        let conn = self.conn.lock();
        let broker_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let capabilities_json = serde_json::to_string(&capabilities).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO brokers (
                broker_id, broker_code, broker_name, adapter_class, capabilities_json,
                status, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'ACTIVE', ?6, ?6, NULL, 1)",
            params![broker_id.to_string(), broker_code, broker_name, adapter_class, capabilities_json, now],
        )?;
        conn.query_row(
            "SELECT * FROM brokers WHERE broker_id = ?1 AND deleted_at IS NULL",
            params![broker_id.to_string()],
            row_to_broker,
        )
        .map_err(AppError::from)
    }

    pub fn list_brokers(&self) -> Result<Vec<Broker>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM brokers WHERE deleted_at IS NULL ORDER BY broker_name ASC")?;
        let rows = stmt.query_map([], row_to_broker)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Links a user to a broker. A `DATA`-role link is rejected with
    /// `ConflictState` if an enabled `ACTIVE` `DATA` link already exists
    /// system-wide (spec §3, §9: single system data broker).
    pub fn link_user_broker(&self, input: UserBrokerInput) -> Result<UserBroker, AppError> {
        let conn = self.conn.lock();
        let user_broker_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let risk_policy_json =
            serde_json::to_string(&input.risk_policy).map_err(|e| AppError::Internal(e.to_string()))?;
        let result = conn.execute(
            "INSERT INTO user_brokers (
                user_broker_id, user_id, broker_id, role, credentials, connected, last_connected,
                connection_error, risk_policy_json, status, enabled, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, NULL, ?6, 'ACTIVE', 1, ?7, ?7, NULL, 1)",
            params![
                user_broker_id.to_string(),
                input.user_id.to_string(),
                input.broker_id.to_string(),
                input.role.as_str(),
                input.credentials,
                risk_policy_json,
                now,
            ],
        );
        if let Err(rusqlite::Error::SqliteFailure(e, _)) = &result {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return Err(AppError::ConflictState(
                    "a DATA-role user-broker is already active system-wide".to_string(),
                ));
            }
        }
        result?;
        conn.query_row(
            "SELECT * FROM user_brokers WHERE user_broker_id = ?1 AND deleted_at IS NULL",
            params![user_broker_id.to_string()],
            row_to_user_broker,
        )
        .map_err(AppError::from)
    }

    pub fn list_user_brokers(&self, user_id: Uuid) -> Result<Vec<UserBroker>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM user_brokers WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_user_broker)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn find_user_broker(&self, user_broker_id: Uuid) -> Result<UserBroker, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM user_brokers WHERE user_broker_id = ?1 AND deleted_at IS NULL",
            params![user_broker_id.to_string()],
            row_to_user_broker,
        )
        .map_err(AppError::from)
    }

    pub fn unlink_user_broker(&self, user_broker_id: Uuid) -> Result<(), AppError> {
        let conn = self.conn.lock();
        let id = user_broker_id.to_string();
        let version = current_version(&conn, "user_brokers", "user_broker_id", &id)?;
        let now = Utc::now().to_rfc3339();
        soft_delete_current(&conn, "user_brokers", "user_broker_id", &id, version, &now)
    }

    /// Flips `enabled`, versioning the row (spec §6 `/user-brokers/{id}/toggle`).
    pub fn toggle_user_broker(&self, user_broker_id: Uuid, enabled: bool) -> Result<UserBroker, AppError> {
        let conn = self.conn.lock();
        let id = user_broker_id.to_string();
        let version = current_version(&conn, "user_brokers", "user_broker_id", &id)?;
        let current = conn.query_row(
            "SELECT * FROM user_brokers WHERE user_broker_id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_user_broker,
        )?;
        let now = Utc::now().to_rfc3339();
        soft_delete_current(&conn, "user_brokers", "user_broker_id", &id, version, &now)?;
        conn.execute(
            "INSERT INTO user_brokers (
                user_broker_id, user_id, broker_id, role, credentials, connected, last_connected,
                connection_error, risk_policy_json, status, enabled, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, ?14)",
            params![
                id,
                current.user_id.to_string(),
                current.broker_id.to_string(),
                current.role.as_str(),
                current.credentials,
                current.connected as i64,
                current.last_connected.map(|d| d.to_rfc3339()),
                current.connection_error,
                serde_json::to_string(&current.risk_policy).map_err(|e| AppError::Internal(e.to_string()))?,
                current.status.as_str(),
                enabled as i64,
                current.created_at.to_rfc3339(),
                now,
                version + 1,
            ],
        )?;
        conn.query_row(
            "SELECT * FROM user_brokers WHERE user_broker_id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_user_broker,
        )
        .map_err(AppError::from)
    }

    /// The system's single enabled `DATA`-role user-broker, if any (spec §6
    /// `/data-broker`).
    pub fn find_data_broker(&self) -> Result<Option<UserBroker>, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM user_brokers
             WHERE deleted_at IS NULL AND role = 'DATA' AND status = 'ACTIVE' AND enabled = 1",
            [],
            row_to_user_broker,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::from(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_broker(store: &Store) -> Uuid {
        store
            .register_broker("FYERS", "Fyers", "FyersAdapter", BrokerCapabilities::default())
            .unwrap()
            .broker_id
    }

    #[test]
    fn only_one_enabled_active_data_broker_allowed() {
        let store = Store::open_in_memory().unwrap();
        let broker_id = make_broker(&store);
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        store
            .link_user_broker(UserBrokerInput {
                user_id: user_a,
                broker_id,
                role: UserBrokerRole::Data,
                credentials: "a".to_string(),
                risk_policy: RiskPolicy::default(),
            })
            .unwrap();

        let second = store.link_user_broker(UserBrokerInput {
            user_id: user_b,
            broker_id,
            role: UserBrokerRole::Data,
            credentials: "b".to_string(),
            risk_policy: RiskPolicy::default(),
        });
        assert!(matches!(second, Err(AppError::ConflictState(_))));
    }

    #[test]
    fn toggle_user_broker_bumps_version() {
        let store = Store::open_in_memory().unwrap();
        let broker_id = make_broker(&store);
        let user_id = Uuid::new_v4();
        let link = store
            .link_user_broker(UserBrokerInput {
                user_id,
                broker_id,
                role: UserBrokerRole::Exec,
                credentials: "c".to_string(),
                risk_policy: RiskPolicy::default(),
            })
            .unwrap();

        let toggled = store.toggle_user_broker(link.user_broker_id, false).unwrap();
        assert!(!toggled.enabled);
        assert_eq!(toggled.version, 2);
    }

    #[test]
    fn find_data_broker_returns_none_when_unset() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_data_broker().unwrap().is_none());
    }
}
