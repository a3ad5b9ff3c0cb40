pub mod errors;
pub mod identifier;
pub mod payload;

pub use errors::{IgnoreReason, WebhookError};
pub use identifier::{canonicalize, find_identifier, is_group, GROUP_MARKER, USER_DOMAIN};
pub use payload::{normalize_payload, normalize_request, NormalizedPayload};
