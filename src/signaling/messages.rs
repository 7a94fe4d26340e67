use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::value::RawValue;

use super::types::SignalingError;

/// Resource answered by a GET request.
pub const PEER_CONNECTION_RESOURCE: &str = "/peerconnection";

/// ICE server handed out when none are configured.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Opaque negotiation payload, kept as the exact JSON text the sender wrote.
pub type Payload = Box<RawValue>;

/// Messages sent from client to server
#[derive(Debug)]
pub enum ClientMessage {
    /// `{"method":"GET","resource":"/peerconnection","msg_id"?:..}`
    GetConfig { msg_id: Option<Payload> },

    /// `{"method":"NOTIFY","data":..}`
    Notify { data: Payload },

    /// Well-formed object that is neither of the above
    Unrecognized { reason: String },
}

impl ClientMessage {
    /// Parse one inbound text frame.
    ///
    /// Fails only when the text is not a JSON object. Unknown methods and
    /// missing fields come back as [`ClientMessage::Unrecognized`].
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        let mut fields: BTreeMap<String, Payload> = serde_json::from_str(text)?;

        let method = match fields.get("method") {
            Some(raw) => match serde_json::from_str::<String>(raw.get()) {
                Ok(method) => method,
                Err(_) => {
                    return Ok(Self::Unrecognized {
                        reason: format!("method is not a string: {}", raw.get()),
                    });
                }
            },
            None => {
                return Ok(Self::Unrecognized {
                    reason: "missing method".to_string(),
                });
            }
        };

        match method.as_str() {
            "GET" => {
                let resource = fields
                    .get("resource")
                    .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok());
                if resource.as_deref() == Some(PEER_CONNECTION_RESOURCE) {
                    Ok(Self::GetConfig {
                        msg_id: fields.remove("msg_id"),
                    })
                } else {
                    Ok(Self::Unrecognized {
                        reason: format!("unknown GET resource {:?}", resource),
                    })
                }
            }
            "NOTIFY" => match fields.remove("data") {
                Some(data) => Ok(Self::Notify { data }),
                None => Ok(Self::Unrecognized {
                    reason: "NOTIFY without data".to_string(),
                }),
            },
            other => Ok(Self::Unrecognized {
                reason: format!("unknown method {:?}", other),
            }),
        }
    }
}

/// One entry of `iceServers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IceServer {
    pub url: String,
}

/// Configuration object for `RTCPeerConnection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerConnectionConfig {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

impl PeerConnectionConfig {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ice_servers: urls
                .into_iter()
                .map(|url| IceServer { url: url.into() })
                .collect(),
        }
    }
}

impl Default for PeerConnectionConfig {
    fn default() -> Self {
        Self::new([DEFAULT_ICE_SERVER])
    }
}

/// Messages sent from server to client
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServerMessage<'a> {
    /// Relayed negotiation data, same shape in both directions
    Notify {
        method: &'static str,
        data: &'a RawValue,
    },

    /// Answer to GET /peerconnection
    Config {
        code: &'static str,
        result: ConfigResult<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg_id: Option<&'a RawValue>,
    },
}

#[derive(Debug, Serialize)]
pub struct ConfigResult<'a> {
    pub configuration: &'a PeerConnectionConfig,
}

impl<'a> ServerMessage<'a> {
    pub fn notify(data: &'a RawValue) -> Self {
        Self::Notify {
            method: "NOTIFY",
            data,
        }
    }

    pub fn config(configuration: &'a PeerConnectionConfig, msg_id: Option<&'a RawValue>) -> Self {
        Self::Config {
            code: "success",
            result: ConfigResult { configuration },
            msg_id,
        }
    }

    pub fn to_json(&self) -> Result<String, SignalingError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_config_with_msg_id() {
        let json = r#"{"method": "GET", "msg_id": 1, "resource": "/peerconnection"}"#;
        match ClientMessage::parse(json).unwrap() {
            ClientMessage::GetConfig { msg_id } => assert_eq!(msg_id.unwrap().get(), "1"),
            other => panic!("Expected GetConfig, got {:?}", other),
        }
    }

    #[test]
    fn parse_get_config_without_msg_id() {
        let json = r#"{"method": "GET", "resource": "/peerconnection"}"#;
        assert!(matches!(
            ClientMessage::parse(json).unwrap(),
            ClientMessage::GetConfig { msg_id: None }
        ));
    }

    #[test]
    fn parse_notify_keeps_data_verbatim() {
        let json = r#"{"method":"NOTIFY","data":{"type": "offer", "sdp":"v=0\r\n", "n": 1.50}}"#;
        match ClientMessage::parse(json).unwrap() {
            ClientMessage::Notify { data } => {
                assert_eq!(data.get(), r#"{"type": "offer", "sdp":"v=0\r\n", "n": 1.50}"#)
            }
            other => panic!("Expected Notify, got {:?}", other),
        }
    }

    #[test]
    fn parse_notify_with_null_data() {
        let json = r#"{"method":"NOTIFY","data":null}"#;
        match ClientMessage::parse(json).unwrap() {
            ClientMessage::Notify { data } => assert_eq!(data.get(), "null"),
            other => panic!("Expected Notify, got {:?}", other),
        }
    }

    #[test]
    fn parse_unknown_method_is_unrecognized() {
        let json = r#"{"method":"PUT","resource":"/peerconnection"}"#;
        assert!(matches!(
            ClientMessage::parse(json).unwrap(),
            ClientMessage::Unrecognized { .. }
        ));
    }

    #[test]
    fn parse_missing_fields_is_unrecognized() {
        for json in [
            r#"{}"#,
            r#"{"method":"NOTIFY"}"#,
            r#"{"method":"GET"}"#,
            r#"{"method":"GET","resource":"/other"}"#,
            r#"{"method":7}"#,
        ] {
            assert!(
                matches!(
                    ClientMessage::parse(json).unwrap(),
                    ClientMessage::Unrecognized { .. }
                ),
                "{}",
                json
            );
        }
    }

    #[test]
    fn parse_non_object_is_protocol_error() {
        for text in ["not json", "[1,2]", "\"NOTIFY\"", "42", ""] {
            assert!(
                matches!(ClientMessage::parse(text), Err(SignalingError::Protocol(_))),
                "{}",
                text
            );
        }
    }

    #[test]
    fn serialize_config_response_with_msg_id() {
        let config = PeerConnectionConfig::default();
        let msg_id = RawValue::from_string("1".to_string()).unwrap();
        let json = ServerMessage::config(&config, Some(&*msg_id))
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "msg_id": 1,
                "code": "success",
                "result": {"configuration": {"iceServers": [{"url": "stun:stun.l.google.com:19302"}]}}
            })
        );
    }

    #[test]
    fn serialize_config_response_without_msg_id() {
        let config = PeerConnectionConfig::default();
        let json = ServerMessage::config(&config, None).to_json().unwrap();
        assert!(!json.contains("msg_id"));
        assert!(json.contains("\"code\":\"success\""));
    }

    #[test]
    fn serialize_notify_embeds_raw_data() {
        let data = RawValue::from_string(r#"{"candidate": "a=1"}"#.to_string()).unwrap();
        let json = ServerMessage::notify(&data).to_json().unwrap();
        assert_eq!(json, r#"{"method":"NOTIFY","data":{"candidate": "a=1"}}"#);
    }

    #[test]
    fn peer_connection_config_from_urls() {
        let config = PeerConnectionConfig::new(["stun:a", "turn:b"]);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[1].url, "turn:b");
    }
}
