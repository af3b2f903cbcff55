//! Identity token and password digest used during the handshake.
//!
//! Both values are derived with MD5.  The identity token is the lowercase
//! hexadecimal rendering of the digest of [`PROTOCOL_NAME`] (32 ASCII bytes),
//! so both sides can check they speak the same protocol before anything
//! else is exchanged.  The password digest is the raw 16-byte digest of the
//! UTF-8 password.

use md5::{Digest, Md5};

use crate::protocol::messages::{IDENTITY_TOKEN_LEN, PASSWORD_DIGEST_LEN};

/// Name hashed into the identity token.
pub const PROTOCOL_NAME: &str = "HUD Race Director";

/// Returns the 32-byte lowercase hex MD5 of `name`.
pub fn identity_token(name: &str) -> [u8; IDENTITY_TOKEN_LEN] {
    let mut out = [0u8; IDENTITY_TOKEN_LEN];
    out.copy_from_slice(hex::encode(Md5::digest(name.as_bytes())).as_bytes());
    out
}

/// Returns the identity token for this protocol.
pub fn protocol_identity() -> [u8; IDENTITY_TOKEN_LEN] {
    identity_token(PROTOCOL_NAME)
}

/// Returns the raw MD5 digest of `password`.
pub fn password_digest(password: &str) -> [u8; PASSWORD_DIGEST_LEN] {
    let mut out = [0u8; PASSWORD_DIGEST_LEN];
    out.copy_from_slice(&Md5::digest(password.as_bytes()));
    out
}

/// What the connecting side presents during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Send an IDENTITY frame before waiting for the peer.
    pub identity_check: bool,
    /// Digest sent in reply to PASSWORD_REQUEST.
    pub password_digest: [u8; PASSWORD_DIGEST_LEN],
}

impl Credentials {
    /// Builds credentials from an optional plain-text password.
    ///
    /// A missing password digests the empty string, which only succeeds
    /// against a peer that does not ask for one.
    pub fn new(password: Option<&str>, identity_check: bool) -> Self {
        Self {
            identity_check,
            password_digest: password_digest(password.unwrap_or("")),
        }
    }
}

/// What the accepting side requires from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Require a matching IDENTITY frame first.
    pub identity_check: bool,
    /// Ask for a password whose digest must equal this value.
    pub password_digest: Option<[u8; PASSWORD_DIGEST_LEN]>,
}

impl AuthPolicy {
    pub fn new(password: Option<&str>, identity_check: bool) -> Self {
        Self {
            identity_check,
            password_digest: password.filter(|p| !p.is_empty()).map(password_digest),
        }
    }

    /// Open policy: no identity check, no password.
    pub fn open() -> Self {
        Self {
            identity_check: false,
            password_digest: None,
        }
    }
}
