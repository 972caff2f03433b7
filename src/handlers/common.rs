use crate::errors::ServiceError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserializes an already-parsed JSON body into the endpoint's request type,
/// mapping shape mismatches to a 400 rather than axum's default 422.
pub fn parse_body<T: DeserializeOwned>(value: Value) -> Result<T, ServiceError> {
    serde_json::from_value(value)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid request body: {}", e)))
}
