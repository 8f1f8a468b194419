use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
pub const RESPONSE_AUDIO_DONE: &str = "response.audio.done";
pub const SERVER_ERROR: &str = "error";

/// Messages sent to the speech endpoint.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent<'a> {
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseParams<'a> },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
}

#[derive(Debug, Serialize)]
pub struct ResponseParams<'a> {
    pub modalities: &'a [String],
    pub instructions: &'a str,
}

impl<'a> ClientEvent<'a> {
    pub fn response_create(modalities: &'a [String], instructions: &'a str) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseParams {
                modalities,
                instructions,
            },
        }
    }

    /// Wrap one PCM frame, base64 encoded.
    pub fn audio_append(pcm: &[u8]) -> Self {
        ClientEvent::InputAudioAppend {
            audio: general_purpose::STANDARD.encode(pcm),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// Wire shape of every inbound event; only the fields this client reads.
#[derive(Deserialize, Debug)]
struct ServerMessage {
    #[serde(rename = "type")]
    msg_type: String,
    delta: Option<String>,
    error: Option<ServerErrorBody>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ServerErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Inbound events, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Raw PCM bytes of one `response.audio.delta`.
    AudioDelta(Vec<u8>),
    AudioDone,
    Error(ServerErrorBody),
    /// Any other event type; carried for logging only.
    Other(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} without a delta field")]
    MissingDelta(&'static str),
    #[error("invalid base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let msg: ServerMessage = serde_json::from_str(text)?;
        let event = match msg.msg_type.as_str() {
            RESPONSE_AUDIO_DELTA => {
                let delta = msg
                    .delta
                    .ok_or(DecodeError::MissingDelta(RESPONSE_AUDIO_DELTA))?;
                ServerEvent::AudioDelta(general_purpose::STANDARD.decode(delta)?)
            }
            RESPONSE_AUDIO_DONE => ServerEvent::AudioDone,
            SERVER_ERROR => ServerEvent::Error(msg.error.unwrap_or_default()),
            _ => ServerEvent::Other(msg.msg_type),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn response_create_shape() {
        let modalities = vec!["audio".to_string(), "text".to_string()];
        let text = ClientEvent::response_create(&modalities, "Be kind.")
            .to_json()
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "response.create",
                "response": { "modalities": ["audio", "text"], "instructions": "Be kind." }
            })
        );
    }

    #[test]
    fn audio_append_is_base64() {
        let text = ClientEvent::audio_append(&[0x01, 0x02, 0xff]).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "input_audio_buffer.append");
        assert_eq!(value["audio"], "AQL/");
    }

    #[test]
    fn parses_audio_delta() {
        let event = ServerEvent::parse(r#"{"type":"response.audio.delta","delta":"AQL/","item_id":"x"}"#)
            .unwrap();
        assert_eq!(event, ServerEvent::AudioDelta(vec![0x01, 0x02, 0xff]));
    }

    #[test]
    fn parses_done_and_unknown() {
        assert_eq!(
            ServerEvent::parse(r#"{"type":"response.audio.done"}"#).unwrap(),
            ServerEvent::AudioDone
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"session.created","session":{}}"#).unwrap(),
            ServerEvent::Other("session.created".to_string())
        );
    }

    #[test]
    fn parses_server_error() {
        let event = ServerEvent::parse(
            r#"{"type":"error","error":{"code":"invalid_api_key","message":"nope"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Error(body) => assert_eq!(body.message.as_deref(), Some("nope")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(ServerEvent::parse("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            ServerEvent::parse(r#"{"type":"response.audio.delta"}"#),
            Err(DecodeError::MissingDelta(_))
        ));
        assert!(matches!(
            ServerEvent::parse(r#"{"type":"response.audio.delta","delta":"%%%"}"#),
            Err(DecodeError::Base64(_))
        ));
        assert!(ServerEvent::parse(r#"{"delta":"AQL/"}"#).is_err());
    }
}
