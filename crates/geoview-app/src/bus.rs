// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Cross-window event bus.
//!
//! Windows may live behind a process boundary, so every emission is encoded
//! once into a versioned JSON envelope and each listener decodes its own copy.
//! Delivery is at-most-once and fire-and-forget; each listener owns a FIFO
//! channel, which keeps per-listener emission order.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::ids::{FeatureIndex, LayerId};
use crate::model::{Extent, Point};

pub const BUS_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BusMessage {
    LayerCreated {
        id: LayerId,
        title: String,
        points: Vec<Point>,
        extent: Extent,
    },
    FeatureSelected {
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
    FeatureUnselected {
        layer_id: LayerId,
        feature_id: FeatureIndex,
    },
    AllFeaturesSelected {
        layer_id: LayerId,
    },
    AllFeaturesUnselected {
        layer_id: LayerId,
    },
    LayerDeleted {
        layer_id: LayerId,
    },
    FeatureZoomed {
        layer_id: LayerId,
        feature_id: FeatureIndex,
        extent: Extent,
    },
}

impl BusMessage {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LayerCreated { .. } => "layer-created",
            Self::FeatureSelected { .. } => "feature-selected",
            Self::FeatureUnselected { .. } => "feature-unselected",
            Self::AllFeaturesSelected { .. } => "all-features-selected",
            Self::AllFeaturesUnselected { .. } => "all-features-unselected",
            Self::LayerDeleted { .. } => "layer-deleted",
            Self::FeatureZoomed { .. } => "feature-zoomed",
        }
    }

    /// The layer a listener scopes this message by.
    pub fn layer_id(&self) -> &LayerId {
        match self {
            Self::LayerCreated { id, .. } => id,
            Self::FeatureSelected { layer_id, .. }
            | Self::FeatureUnselected { layer_id, .. }
            | Self::AllFeaturesSelected { layer_id }
            | Self::AllFeaturesUnselected { layer_id }
            | Self::LayerDeleted { layer_id }
            | Self::FeatureZoomed { layer_id, .. } => layer_id,
        }
    }
}

/// Wire form of one emission: `{"version":1,"event":"...","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

pub fn encode(message: &BusMessage) -> serde_json::Result<String> {
    let mut tagged = serde_json::to_value(message)?;
    let payload = tagged
        .get_mut("payload")
        .map(serde_json::Value::take)
        .unwrap_or_default();
    serde_json::to_string(&Envelope {
        version: BUS_PROTOCOL_VERSION,
        event: message.kind().to_owned(),
        payload,
    })
}

/// Decodes one envelope. Unknown versions are reported as `Ok(None)`.
pub fn decode(raw: &str) -> serde_json::Result<Option<BusMessage>> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.version != BUS_PROTOCOL_VERSION {
        return Ok(None);
    }
    let tagged = serde_json::json!({
        "event": envelope.event,
        "payload": envelope.payload,
    });
    serde_json::from_value(tagged).map(Some)
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<String>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> BusListener {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        BusListener { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Encodes `message` once and fans it out. Listeners that went away are
    /// pruned. Returns the number of listeners reached.
    pub fn publish(&mut self, message: &BusMessage) -> usize {
        let raw = match encode(message) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(kind = message.kind(), %error, "encode bus message");
                return 0;
            }
        };
        self.subscribers.retain(|tx| tx.send(raw.clone()).is_ok());
        debug!(
            kind = message.kind(),
            listeners = self.subscribers.len(),
            "bus publish"
        );
        self.subscribers.len()
    }

    /// Subscribes and also returns a direct sender into the new listener.
    pub fn subscribe_with_sender(&mut self) -> (BusSender, BusListener) {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx.clone());
        (BusSender { tx }, BusListener { rx })
    }
}

/// Direct line into a single listener, e.g. for replaying state into a new
/// window.
#[derive(Debug, Clone)]
pub struct BusSender {
    tx: Sender<String>,
}

impl BusSender {
    pub fn send(&self, message: &BusMessage) -> bool {
        match encode(message) {
            Ok(raw) => self.tx.send(raw).is_ok(),
            Err(error) => {
                warn!(kind = message.kind(), %error, "encode bus message");
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct BusListener {
    rx: Receiver<String>,
}

impl BusListener {
    /// Everything delivered so far, in emission order. Undecodable or
    /// foreign-version envelopes are logged and skipped.
    pub fn drain(&self) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(raw) => match decode(&raw) {
                    Ok(Some(message)) => messages.push(message),
                    Ok(None) => warn!(%raw, "skip bus envelope with unknown version"),
                    Err(error) => warn!(%error, "skip undecodable bus envelope"),
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::{BusMessage, EventBus, decode, encode};
    use crate::ids::{FeatureIndex, LayerId};
    use crate::model::{Extent, Point};

    fn selected(layer: &str, feature: usize) -> BusMessage {
        BusMessage::FeatureSelected {
            layer_id: LayerId::from(layer),
            feature_id: FeatureIndex::new(feature),
        }
    }

    #[test]
    fn envelope_wire_shape() {
        let raw = encode(&selected("L1", 3)).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["version"], 1);
        assert_eq!(value["event"], "feature-selected");
        assert_eq!(value["payload"]["layer_id"], "L1");
        assert_eq!(value["payload"]["feature_id"], 3);
    }

    #[test]
    fn layer_created_payload_decodes() {
        let raw = r#"{"version":1,"event":"layer-created","payload":{
            "id":"L1","title":"towns","points":[{"lng":1.0,"lat":2.0}],
            "extent":{"west":0.0,"south":0.0,"east":2.0,"north":2.0}}}"#;
        let message = decode(raw).expect("decode").expect("known version");
        assert_eq!(
            message,
            BusMessage::LayerCreated {
                id: LayerId::from("L1"),
                title: "towns".to_owned(),
                points: vec![Point::new(1.0, 2.0)],
                extent: Extent::new(0.0, 0.0, 2.0, 2.0),
            }
        );
    }

    #[test]
    fn foreign_version_is_skipped() {
        let raw = r#"{"version":9,"event":"layer-deleted","payload":{"layer_id":"L1"}}"#;
        assert_eq!(decode(raw).expect("decode"), None);
    }

    #[test]
    fn unknown_kind_is_an_error_not_a_message() {
        let raw = r#"{"version":1,"event":"layer-renamed","payload":{"layer_id":"L1"}}"#;
        assert!(decode(raw).is_err());
    }

    #[test]
    fn each_listener_sees_emission_order() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(&selected("L1", 1));
        bus.publish(&selected("L1", 2));
        bus.publish(&selected("L1", 3));

        let expected = vec![selected("L1", 1), selected("L1", 2), selected("L1", 3)];
        assert_eq!(first.drain(), expected);
        assert_eq!(second.drain(), expected);
        assert!(first.drain().is_empty(), "at most once");
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        assert_eq!(bus.publish(&selected("L1", 0)), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.drain().len(), 1);
    }

    #[test]
    fn direct_send_reaches_only_that_listener() {
        let mut bus = EventBus::new();
        let other = bus.subscribe();
        let (sender, listener) = bus.subscribe_with_sender();

        assert!(sender.send(&selected("L1", 4)));
        assert_eq!(listener.drain(), vec![selected("L1", 4)]);
        assert!(other.drain().is_empty());
    }
}
