//! Type definitions for the auth session
//!
//! Configuration, token, claim, projection and flag types shared by every
//! component.

pub mod claims;
pub mod flags;
pub mod options;
pub mod tokens;
pub mod user;

pub use claims::{ClaimMap, ClaimValue};
pub use flags::{Flag, FlagType, FlagValue};
pub use options::{AuthRequestOptions, DEFAULT_SCOPE, DEFAULT_STORAGE_KEY, Prompt, SessionConfig};
pub use tokens::{EXPIRY_BUFFER_SECS, TokenSet};
pub use user::{Organization, Permissions, User, UserOrganizations};
