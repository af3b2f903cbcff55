//! Protocol module containing command codes, frame types, the binary codec
//! and the handshake digests.

pub mod auth;
pub mod codec;
pub mod messages;

pub use codec::{decode_frame, encode_frame, write_payload, FieldReader, FieldWriter, FrameError};
pub use messages::*;
