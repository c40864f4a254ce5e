//! Wire envelope for the broadcast protocol. One JSON message per
//! websocket frame, discriminated by a `type` field on both directions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event channels carried in v1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    StockUpdate,
    NewSale,
    LowStockAlert,
    NewDelivery,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::StockUpdate => "stock_update",
            Channel::NewSale => "new_sale",
            Channel::LowStockAlert => "low_stock_alert",
            Channel::NewDelivery => "new_delivery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalTag {
    #[serde(rename = "global")]
    Global,
}

/// Scope of an event or a subscription filter. Serializes as either the
/// string `"global"` or an object `{ "branch_id": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scope {
    Branch { branch_id: String },
    Global(GlobalTag),
}

impl Scope {
    pub fn global() -> Self {
        Scope::Global(GlobalTag::Global)
    }

    pub fn branch(branch_id: impl Into<String>) -> Self {
        Scope::Branch {
            branch_id: branch_id.into(),
        }
    }

    pub fn branch_id(&self) -> Option<&str> {
        match self {
            Scope::Branch { branch_id } => Some(branch_id),
            Scope::Global(_) => None,
        }
    }
}

/// A domain event in flight through the hub.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub channel: Channel,
    pub timestamp: i64,
    pub scope: Scope,
    pub payload: Value,
}

impl Event {
    pub fn new(channel: Channel, scope: Scope, payload: Value) -> Self {
        Self {
            channel,
            timestamp: Utc::now().timestamp_millis(),
            scope,
            payload,
        }
    }

    /// Coalescing identity for stock updates. Other channels never
    /// coalesce.
    pub fn coalesce_key(&self) -> Option<(String, String)> {
        if self.channel != Channel::StockUpdate {
            return None;
        }
        let branch_id = self.scope.branch_id()?.to_string();
        let product_id = self.payload.get("product_id")?.as_str()?.to_string();
        Some((branch_id, product_id))
    }
}

/// Client to server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        timestamp: f64,
    },
    Subscribe {
        channels: Vec<Channel>,
        /// Absent scope means "my session's selected branch", falling
        /// back to global when none is selected.
        #[serde(default)]
        scope: Option<Scope>,
    },
    Unsubscribe {
        channels: Vec<Channel>,
    },
}

/// Server to client control frames. Domain events go out as [`Event`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Pong { timestamp: f64 },
    Subscribed { channels: Vec<Channel> },
    ServerDraining,
}

/// One item on a subscription's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    Control(ControlMessage),
    Event(Event),
}

impl Outbound {
    pub fn to_json(&self) -> String {
        let serialized = match self {
            Outbound::Control(msg) => serde_json::to_string(msg),
            Outbound::Event(event) => serde_json::to_string(event),
        };
        match serialized {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound frame");
                String::from("{\"type\":\"error\"}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_wire_shapes() {
        assert_eq!(serde_json::to_value(Scope::global()).unwrap(), json!("global"));
        assert_eq!(
            serde_json::to_value(Scope::branch("B1")).unwrap(),
            json!({ "branch_id": "B1" })
        );
        let parsed: Scope = serde_json::from_value(json!("global")).unwrap();
        assert_eq!(parsed, Scope::global());
        let parsed: Scope = serde_json::from_value(json!({ "branch_id": "B2" })).unwrap();
        assert_eq!(parsed, Scope::branch("B2"));
    }

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "ping", "timestamp": 17.5 })).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { timestamp } if timestamp == 17.5));

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "subscribe",
            "channels": ["stock_update", "new_sale"],
            "scope": { "branch_id": "B1" }
        }))
        .unwrap();
        match msg {
            ClientMessage::Subscribe { channels, scope } => {
                assert_eq!(channels, vec![Channel::StockUpdate, Channel::NewSale]);
                assert_eq!(scope, Some(Scope::branch("B1")));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        // Scope may be omitted.
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "subscribe",
            "channels": ["new_delivery"]
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { scope: None, .. }));
    }

    #[test]
    fn event_frame_carries_type_field() {
        let event = Event::new(
            Channel::StockUpdate,
            Scope::branch("B1"),
            json!({ "product_id": "dried-mango", "quantity": 80 }),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stock_update");
        assert_eq!(value["scope"]["branch_id"], "B1");
        assert_eq!(value["payload"]["quantity"], 80);
    }

    #[test]
    fn control_frames() {
        let value = serde_json::to_value(ControlMessage::ServerDraining).unwrap();
        assert_eq!(value, json!({ "type": "server_draining" }));
        let value = serde_json::to_value(ControlMessage::Subscribed {
            channels: vec![Channel::NewSale],
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "subscribed", "channels": ["new_sale"] }));
    }

    #[test]
    fn coalesce_key_only_for_stock_updates() {
        let stock = Event::new(
            Channel::StockUpdate,
            Scope::branch("B1"),
            json!({ "product_id": "p1", "quantity": 5 }),
        );
        assert_eq!(stock.coalesce_key(), Some(("B1".into(), "p1".into())));

        let sale = Event::new(Channel::NewSale, Scope::branch("B1"), json!({ "sale_id": "s" }));
        assert_eq!(sale.coalesce_key(), None);
    }
}
