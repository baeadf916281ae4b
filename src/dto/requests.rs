use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::{validate_code, validate_digits, validate_name};

/// Host a new room under the given display name.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Display name of the host.
    #[validate(custom(function = "validate_name"))]
    pub name: String,
}

/// Join an existing room by its invite code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Display name of the joining participant.
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    /// Invite code, case-insensitive.
    #[validate(custom(function = "validate_code"))]
    pub code: String,
}

/// Four digits submitted as a secret or as a guess.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct DigitsRequest {
    /// Exactly four ASCII digits.
    #[validate(custom(function = "validate_digits"))]
    pub digits: String,
}
