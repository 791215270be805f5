//! ============================================================================
//! Auth Module - Credentials and Session Flow
//! ============================================================================
//! Minimal identity gate in front of the roast pipeline:
//! - Unsalted SHA-256 password digests
//! - Register-if-absent / authenticate over any credential backend
//! - Explicit session context for the login / signup / logout flow
//! ============================================================================

mod identity;
mod password;
mod session;

pub use identity::{validate_credentials, IdentityService, MAX_USERNAME_LEN};
pub use password::{hash_password, is_digest, DIGEST_LEN};
pub use session::{AuthOutcome, Page, SessionContext};
