//! Pure routing of MQTT event loop results into broker notices
//!
//! The run loop only cares about connection handshakes and drops; every
//! other packet is infrastructure traffic handled inside rumqttc.

use crate::transport::BrokerNotice;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, ConnectionError, Event};
use tracing::debug;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route the result of one event loop poll (pure routing decision)
    ///
    /// A refused connection becomes a ConnAck with its non-zero result code
    /// so the run loop can treat it as fatal; any other connection error is
    /// a transient drop.
    pub fn route_poll_result(result: Result<Event, ConnectionError>) -> Option<BrokerNotice> {
        match result {
            Ok(event) => Self::route_mqtt_event(event),
            Err(ConnectionError::ConnectionRefused(code)) => {
                Some(BrokerNotice::ConnAck(code as u8))
            }
            Err(e) => {
                debug!(target: "mqtt_transport", "MQTT connection error: {}", e);
                Some(BrokerNotice::Disconnected)
            }
        }
    }

    /// Route MQTT event to a connection notice, if it is one
    pub fn route_mqtt_event(event: Event) -> Option<BrokerNotice> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => Some(BrokerNotice::ConnAck(ack.code as u8)),
            Event::Incoming(Packet::Disconnect(_)) => Some(BrokerNotice::Disconnected),
            Event::Incoming(other) => {
                debug!(target: "mqtt_transport", "MQTT event: {:?}", other);
                None
            }
            Event::Outgoing(_) => None,
        }
    }

    /// QoS used for sensor readings (pure function)
    ///
    /// Readings are periodic and superseded by the next one, so they are
    /// sent at most once.
    pub fn reading_qos() -> QoS {
        QoS::AtMostOnce
    }
}
