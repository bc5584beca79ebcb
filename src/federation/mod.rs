//! ActivityPub federation module
//!
//! Handles:
//! - HTTP Signatures (draft-cavage)
//! - Public key resolution
//! - Remote actor fetching (trust on first use)
//! - Inbox ingestion

mod accounts;
mod inbox;
mod key_resolver;
mod signature;

pub use accounts::{AccountStore, Accounts, ActorDocument, ActorFetcher, ActorPublicKey};
pub use inbox::{InboxHandler, InboxOptions, classify};
pub use key_resolver::{KeyResolver, ResolvedKey, public_key_from_pem, trim_key_id};
pub use signature::{
    InboundRequest, SignatureHeaders, SignatureParams, SignatureVerifier, build_signing_string,
    extract_signature_header, generate_digest, parse_signature_header, sign_request,
    verify_rsa_sha256,
};
