//! OAuth exchange (spec §4.7): turning a broker's callback `auth_code`
//! into an active `UserBrokerSession`. Idempotent on `auth_code` — a
//! broker redirect retried by a flaky browser must not open two sessions.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::broker::adapter::BrokerAdapter;
use crate::db::Store;
use crate::error::AppError;
use crate::events::append_tx;
use crate::models::broker::{SessionStatus, UserBrokerSession};
use crate::models::event::NewTradeEvent;

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<UserBrokerSession> {
    let status_raw: String = row.get("session_status")?;
    Ok(UserBrokerSession {
        session_id: Uuid::parse_str(&row.get::<_, String>("session_id")?).unwrap_or_default(),
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        access_token: row.get("access_token")?,
        token_valid_till: row.get::<_, String>("token_valid_till")?.parse().unwrap_or_else(|_| Utc::now()),
        session_status: SessionStatus::from_str(&status_raw),
        started_at: row.get::<_, String>("started_at")?.parse().unwrap_or_else(|_| Utc::now()),
        ended_at: row.get::<_, Option<String>>("ended_at")?.and_then(|s| s.parse().ok()),
        auth_code: row.get("auth_code")?,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

impl Store {
    /// Exchanges `auth_code` for an access token and opens a session.
    /// If an ACTIVE session already exists for this `(user_broker_id,
    /// auth_code)` pair, returns it unchanged instead of calling the
    /// adapter again (spec §4.7: idempotent OAuth exchange).
    pub async fn exchange_oauth_code(
        &self,
        user_broker_id: Uuid,
        auth_code: &str,
        adapter: &dyn BrokerAdapter,
        token_ttl: chrono::Duration,
    ) -> Result<UserBrokerSession, AppError> {
        {
            let conn = self.conn.lock();
            let existing = conn
                .query_row(
                    "SELECT * FROM user_broker_sessions
                     WHERE user_broker_id = ?1 AND auth_code = ?2 AND session_status = 'ACTIVE' AND deleted_at IS NULL",
                    params![user_broker_id.to_string(), auth_code],
                    row_to_session,
                )
                .ok();
            if let Some(session) = existing {
                return Ok(session);
            }
        }

        let access_token = adapter.exchange_auth_code(auth_code).await?;

        let conn = self.conn.lock();
        let now = Utc::now();
        let valid_till = now + token_ttl;

        let prior_active: Option<(String, i64)> = conn
            .query_row(
                "SELECT session_id, version FROM user_broker_sessions
                 WHERE user_broker_id = ?1 AND session_status = 'ACTIVE' AND deleted_at IS NULL",
                params![user_broker_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        if let Some((id, version)) = prior_active {
            conn.execute(
                "UPDATE user_broker_sessions SET deleted_at = ?1 WHERE session_id = ?2 AND version = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), id, version],
            )?;
            conn.execute(
                "INSERT INTO user_broker_sessions (session_id, user_broker_id, access_token, token_valid_till, session_status, started_at, ended_at, auth_code, created_at, updated_at, deleted_at, version)
                 SELECT session_id, user_broker_id, access_token, token_valid_till, 'REVOKED', started_at, ?1, auth_code, created_at, ?1, NULL, ?2
                 FROM user_broker_sessions WHERE session_id = ?3 AND version = ?4",
                params![now.to_rfc3339(), version + 1, id, version],
            )?;
        }

        let session_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO user_broker_sessions (
                session_id, user_broker_id, access_token, token_valid_till, session_status,
                started_at, ended_at, auth_code, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, 'ACTIVE', ?5, NULL, ?6, ?5, ?5, NULL, 1)",
            params![
                session_id.to_string(),
                user_broker_id.to_string(),
                access_token,
                valid_till.to_rfc3339(),
                now.to_rfc3339(),
                auth_code,
            ],
        )?;

        append_tx(
            &conn,
            &NewTradeEvent::user_broker("OAUTH_SESSION_OPENED", user_broker_id, "system"),
        )?;

        conn.query_row(
            "SELECT * FROM user_broker_sessions WHERE session_id = ?1 AND deleted_at IS NULL",
            params![session_id.to_string()],
            row_to_session,
        )
        .map_err(AppError::from)
    }

    pub fn revoke_session(&self, session_id: Uuid) -> Result<(), AppError> {
        let conn = self.conn.lock();
        let id = session_id.to_string();
        let version = crate::db::current_version(&conn, "user_broker_sessions", "session_id", &id)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE user_broker_sessions SET deleted_at = ?1 WHERE session_id = ?2 AND version = ?3 AND deleted_at IS NULL",
            params![now, id, version],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("user_broker_sessions({id}, version={version})")));
        }
        conn.execute(
            "INSERT INTO user_broker_sessions (session_id, user_broker_id, access_token, token_valid_till, session_status, started_at, ended_at, auth_code, created_at, updated_at, deleted_at, version)
             SELECT session_id, user_broker_id, access_token, token_valid_till, 'REVOKED', started_at, ?1, auth_code, created_at, ?1, NULL, ?2
             FROM user_broker_sessions WHERE session_id = ?3 AND version = ?4",
            params![now, version + 1, id, version],
        )?;
        Ok(())
    }

    /// The current `ACTIVE` session for a user-broker, if any (spec §6
    /// `/brokers/{ubId}/session`).
    pub fn find_active_session_for_user_broker(
        &self,
        user_broker_id: Uuid,
    ) -> Result<Option<UserBrokerSession>, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM user_broker_sessions
             WHERE user_broker_id = ?1 AND session_status = 'ACTIVE' AND deleted_at IS NULL",
            params![user_broker_id.to_string()],
            row_to_session,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::from(other)),
        })
    }

    /// Revokes every `ACTIVE` session for a user-broker (spec §6
    /// `/brokers/{ubId}/disconnect`).
    pub fn revoke_sessions_for_user_broker(&self, user_broker_id: Uuid) -> Result<(), AppError> {
        let ids: Vec<Uuid> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT session_id FROM user_broker_sessions
                 WHERE user_broker_id = ?1 AND session_status = 'ACTIVE' AND deleted_at IS NULL",
            )?;
            let rows = stmt.query_map(params![user_broker_id.to_string()], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .filter_map(|s| Uuid::parse_str(&s).ok())
                .collect();
            rows
        };
        for session_id in ids {
            self.revoke_session(session_id)?;
        }
        Ok(())
    }

    /// Sessions whose `token_valid_till` has passed but are still `ACTIVE`,
    /// for the reconciler background task to revoke.
    pub fn find_expired_session_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT session_id FROM user_broker_sessions
             WHERE deleted_at IS NULL AND session_status = 'ACTIVE' AND token_valid_till < ?1",
        )?;
        let ids = stmt
            .query_map(params![now], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::adapter::{PaperBrokerAdapter, PaperBrokerConfig};

    fn make_user_broker(store: &Store) -> Uuid {
        let conn = store.conn.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO user_brokers (user_broker_id, user_id, broker_id, role, credentials, connected, last_connected, connection_error, risk_policy_json, status, enabled, created_at, updated_at, deleted_at, version)
             VALUES (?1, ?2, ?3, 'EXEC', 'x', 0, NULL, NULL, '{}', 'ACTIVE', 1, ?4, ?4, NULL, 1)",
            params![id.to_string(), Uuid::new_v4().to_string(), Uuid::new_v4().to_string(), now],
        ).unwrap();
        id
    }

    #[tokio::test]
    async fn repeated_auth_code_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        let ub = make_user_broker(&store);
        let adapter = PaperBrokerAdapter::new(PaperBrokerConfig {
            simulated_latency_ms: 0,
            slippage_bps: rust_decimal::Decimal::ZERO,
            rejection_rate_pct: rust_decimal::Decimal::ZERO,
        });
        let s1 = store
            .exchange_oauth_code(ub, "code-abc", &adapter, chrono::Duration::hours(8))
            .await
            .unwrap();
        let s2 = store
            .exchange_oauth_code(ub, "code-abc", &adapter, chrono::Duration::hours(8))
            .await
            .unwrap();
        assert_eq!(s1.session_id, s2.session_id);
    }
}
