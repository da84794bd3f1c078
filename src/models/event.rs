use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventScope {
    Global,
    User,
    UserBroker,
}

impl EventScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventScope::Global => "GLOBAL",
            EventScope::User => "USER",
            EventScope::UserBroker => "USER_BROKER",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "USER" => EventScope::User,
            "USER_BROKER" => EventScope::UserBroker,
            _ => EventScope::Global,
        }
    }
}

/// A new event to append; `seq` is server-assigned at insert (spec §4.2).
#[derive(Debug, Clone)]
pub struct NewTradeEvent {
    pub event_type: String,
    pub scope: EventScope,
    pub user_id: Option<Uuid>,
    pub broker_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub signal_id: Option<Uuid>,
    pub intent_id: Option<Uuid>,
    pub trade_id: Option<Uuid>,
    pub order_id: Option<String>,
    pub created_by: String,
}

impl NewTradeEvent {
    pub fn global(event_type: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            scope: EventScope::Global,
            user_id: None,
            broker_id: None,
            user_broker_id: None,
            payload: serde_json::Value::Null,
            signal_id: None,
            intent_id: None,
            trade_id: None,
            order_id: None,
            created_by: created_by.into(),
        }
    }

    pub fn user_broker(
        event_type: impl Into<String>,
        user_broker_id: Uuid,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            scope: EventScope::UserBroker,
            user_broker_id: Some(user_broker_id),
            ..Self::global(event_type, created_by)
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_signal(mut self, signal_id: Uuid) -> Self {
        self.signal_id = Some(signal_id);
        self
    }

    pub fn with_intent(mut self, intent_id: Uuid) -> Self {
        self.intent_id = Some(intent_id);
        self
    }

    pub fn with_trade(mut self, trade_id: Uuid) -> Self {
        self.trade_id = Some(trade_id);
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub seq: i64,
    pub event_type: String,
    pub scope: EventScope,
    pub user_id: Option<Uuid>,
    pub broker_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub signal_id: Option<Uuid>,
    pub intent_id: Option<Uuid>,
    pub trade_id: Option<Uuid>,
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Scope predicate a reader supplies when tailing the log (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
}
