//! Response envelope and error to status code mapping.

use super::ApiResponse;
use crate::error::{JaspelError, ValidationErrors};
use serde::Serialize;

const GENERIC_ERROR: &str = "Terjadi kesalahan pada server";

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: None,
        }
    }
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> ApiResponse {
    ApiResponse::json(200, &Envelope::success(message, data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> ApiResponse {
    ApiResponse::json(201, &Envelope::success(message, data))
}

pub fn failure(status: u16, message: impl Into<String>) -> ApiResponse {
    ApiResponse::json(
        status,
        &Envelope::<()> {
            success: false,
            message: message.into(),
            data: None,
            errors: None,
        },
    )
}

pub fn status_for(err: &JaspelError) -> u16 {
    match err {
        JaspelError::Unauthenticated => 401,
        JaspelError::Forbidden(_) => 403,
        JaspelError::NotFound { .. } => 404,
        JaspelError::BadRequest(_) => 400,
        JaspelError::UnknownStatus(_)
        | JaspelError::InvalidTransition { .. }
        | JaspelError::Validation(_)
        | JaspelError::NoFeeFormula { .. } => 422,
        JaspelError::Export(_) | JaspelError::Store(_) => 500,
    }
}

/// Render `err` as an envelope. Internal failures are logged and, unless
/// `debug` is set, reported with a generic message.
pub fn from_error(err: &JaspelError, debug: bool) -> ApiResponse {
    let status = status_for(err);
    let errors = match err {
        JaspelError::Validation(errors) => Some(errors.clone()),
        JaspelError::UnknownStatus(_) | JaspelError::InvalidTransition { .. } => {
            Some(ValidationErrors::single("status", err.to_string()))
        }
        _ => None,
    };

    let message = if status >= 500 {
        log::error!(target: "jaspel::api", "request failed: {}", err);
        if debug {
            err.to_string()
        } else {
            GENERIC_ERROR.to_string()
        }
    } else {
        err.to_string()
    };

    ApiResponse::json(
        status,
        &Envelope::<()> {
            success: false,
            message,
            data: None,
            errors,
        },
    )
}
