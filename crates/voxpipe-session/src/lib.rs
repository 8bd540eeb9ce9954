pub mod session;
pub mod wire;

pub use session::{
    api_key_provider, CredentialProvider, RecognitionSession, SessionEvent, SessionHandle,
};
pub use wire::{OutboundMessage, StreamingRecognizeResponse};
