pub mod codec;
pub mod errors;
pub mod schema;

pub use codec::CodecError;
pub use errors::{
    DecodeTransportError, DeliveryError, EncodeTransportError, HandleMessageError,
    OrizuruError, OrizuruPublisherError,
};
pub use schema::{Context, Message, Schema};
