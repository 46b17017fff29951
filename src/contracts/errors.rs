//! Failure taxonomy of the delivery pipeline.
//!
//! Every failure raised while handling one delivery ends up inside a
//! [`DeliveryError`]. The original cause stays reachable through
//! [`std::error::Error::source`]:
//!
//! - decode failures: `DeliveryError` -> [`DecodeTransportError`] -> [`CodecError`]
//! - handler failures: `DeliveryError` -> [`HandleMessageError`] -> handler's own error
//! - publish failures: `DeliveryError` -> [`OrizuruPublisherError`] ->
//!   [`EncodeTransportError`] or [`ChannelError`]
//!
//! Deliveries are auto-acknowledged, so none of these lead to redelivery.

use super::codec::CodecError;
use crate::messaging::ChannelError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode message")]
pub struct DecodeTransportError {
    schema: &'static str,
    #[source]
    source: CodecError,
}

impl DecodeTransportError {
    pub fn new(schema: &'static str, source: CodecError) -> Self {
        Self { schema, source }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to encode message")]
pub struct EncodeTransportError {
    schema: &'static str,
    #[source]
    source: CodecError,
}

impl EncodeTransportError {
    pub fn new(schema: &'static str, source: CodecError) -> Self {
        Self { schema, source }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }
}

/// Failure reported by an application [`MessageHandler`](crate::messaging::MessageHandler).
#[derive(Debug, thiserror::Error)]
#[error("Failed to handle message: {reason}")]
pub struct HandleMessageError {
    reason: String,
    #[source]
    source: Option<BoxError>,
}

impl HandleMessageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrizuruPublisherError {
    #[error("Failed to publish message")]
    Encode(#[source] EncodeTransportError),

    #[error("Failed to publish message")]
    Send(#[source] ChannelError),
}

/// Business-level failure of one consume cycle.
#[derive(Debug, thiserror::Error)]
pub enum OrizuruError {
    #[error(transparent)]
    Decode(#[from] DecodeTransportError),

    #[error(transparent)]
    Handle(#[from] HandleMessageError),

    #[error(transparent)]
    Publish(#[from] OrizuruPublisherError),
}

impl OrizuruError {
    /// Pipeline stage that failed, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Handle(_) => "handle",
            Self::Publish(_) => "publish",
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }

    pub fn is_publish(&self) -> bool {
        matches!(self, Self::Publish(_))
    }
}

/// Transport-level failure returned from the broker delivery callback.
///
/// `source()` yields the concrete decode, handler or publisher error rather
/// than the [`OrizuruError`] wrapper, so callers can `downcast_ref` each link.
#[derive(Debug)]
pub struct DeliveryError {
    cause: OrizuruError,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Failed to consume message")
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            OrizuruError::Decode(e) => Some(e),
            OrizuruError::Handle(e) => Some(e),
            OrizuruError::Publish(e) => Some(e),
        }
    }
}

impl DeliveryError {
    pub fn new(cause: OrizuruError) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &OrizuruError {
        &self.cause
    }

    pub fn into_cause(self) -> OrizuruError {
        self.cause
    }
}

impl From<OrizuruError> for DeliveryError {
    fn from(cause: OrizuruError) -> Self {
        Self::new(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn garbage_codec_error() -> CodecError {
        CodecError::NotARecord { schema: "Ping" }
    }

    #[test]
    fn test_decode_error_stage() {
        let err = OrizuruError::from(DecodeTransportError::new("Ping", garbage_codec_error()));
        assert!(err.is_decode());
        assert!(!err.is_handle());
        assert_eq!(err.stage(), "decode");
        assert_eq!(err.to_string(), "Failed to decode message");
    }

    #[test]
    fn test_handle_error_keeps_reason_and_source() {
        let err = HandleMessageError::with_source("lookup failed", "account 42 not found");
        assert_eq!(err.reason(), "lookup failed");
        assert_eq!(err.to_string(), "Failed to handle message: lookup failed");
        assert_eq!(err.source().unwrap().to_string(), "account 42 not found");

        let err = OrizuruError::from(err);
        assert!(err.is_handle());
        assert_eq!(err.stage(), "handle");
    }

    #[test]
    fn test_delivery_error_preserves_three_level_publish_chain() {
        let encode = EncodeTransportError::new("Pong", garbage_codec_error());
        let err = DeliveryError::from(OrizuruError::from(OrizuruPublisherError::Encode(encode)));

        assert_eq!(err.to_string(), "Failed to consume message");
        assert!(err.cause().is_publish());
        assert_eq!(err.cause().stage(), "publish");

        let publisher_level = err.source().unwrap();
        assert_eq!(publisher_level.to_string(), "Failed to publish message");
        assert!(matches!(
            publisher_level.downcast_ref::<OrizuruPublisherError>(),
            Some(OrizuruPublisherError::Encode(_))
        ));

        let encode_level = publisher_level.source().unwrap();
        let encode = encode_level.downcast_ref::<EncodeTransportError>().unwrap();
        assert_eq!(encode.schema(), "Pong");

        let codec_level = encode_level.source().unwrap();
        assert!(codec_level.downcast_ref::<CodecError>().is_some());
    }

    #[test]
    fn test_delivery_error_source_is_typed_decode_error() {
        let err = DeliveryError::from(OrizuruError::from(DecodeTransportError::new(
            "Ping",
            garbage_codec_error(),
        )));

        let decode = err
            .source()
            .and_then(|e| e.downcast_ref::<DecodeTransportError>())
            .unwrap();
        assert_eq!(decode.schema(), "Ping");
        assert!(err.source().unwrap().downcast_ref::<OrizuruError>().is_none());
    }

    #[test]
    fn test_delivery_error_source_is_typed_handler_error_without_inner_cause() {
        let err = DeliveryError::from(OrizuruError::from(HandleMessageError::new("rejected")));

        let handle = err
            .source()
            .and_then(|e| e.downcast_ref::<HandleMessageError>())
            .unwrap();
        assert_eq!(handle.reason(), "rejected");
        assert!(handle.source().is_none());
    }

    #[test]
    fn test_send_failure_is_a_publisher_error() {
        let err = OrizuruPublisherError::Send(ChannelError::Closed);
        assert_eq!(err.to_string(), "Failed to publish message");
        assert!(err.source().unwrap().downcast_ref::<ChannelError>().is_some());
    }
}
