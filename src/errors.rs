use crate::filter::ExclusionReport;
use actix_web::{error::JsonPayloadError, http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

const ERROR_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    NoRouteFound,
    UnknownLocation,
    InvalidContractTerm,
    MissingExchangeRate,
    InvalidBandwidthSpec,
    InvalidRequest,
    InvalidPricingConfig,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoRouteFound => "NO_ROUTE_FOUND",
            ErrorCode::UnknownLocation => "UNKNOWN_LOCATION",
            ErrorCode::InvalidContractTerm => "INVALID_CONTRACT_TERM",
            ErrorCode::MissingExchangeRate => "MISSING_EXCHANGE_RATE",
            ErrorCode::InvalidBandwidthSpec => "INVALID_BANDWIDTH_SPEC",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidPricingConfig => "INVALID_PRICING_CONFIG",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NoRouteFound | ErrorCode::UnknownLocation => StatusCode::NOT_FOUND,
            ErrorCode::InvalidContractTerm
            | ErrorCode::InvalidBandwidthSpec
            | ErrorCode::InvalidRequest
            | ErrorCode::InvalidPricingConfig => StatusCode::BAD_REQUEST,
            ErrorCode::MissingExchangeRate => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    // field named `source` would collide with thiserror's Error::source
    #[error("no route found from {from} to {to}")]
    NoRouteFound {
        from: String,
        to: String,
        exclusions: Box<ExclusionReport>,
    },
    #[error("location not known: {0}")]
    UnknownLocation(String),
    #[error("contract term must be 12, 24 or 36 months, got {0}")]
    InvalidContractTerm(u32),
    #[error("no exchange rate for currency: {0}")]
    MissingExchangeRate(String),
    #[error("invalid bandwidth spec: {0}")]
    InvalidBandwidthSpec(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid pricing config: {0}")]
    InvalidPricingConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NoRouteFound { .. } => ErrorCode::NoRouteFound,
            EngineError::UnknownLocation(_) => ErrorCode::UnknownLocation,
            EngineError::InvalidContractTerm(_) => ErrorCode::InvalidContractTerm,
            EngineError::MissingExchangeRate(_) => ErrorCode::MissingExchangeRate,
            EngineError::InvalidBandwidthSpec(_) => ErrorCode::InvalidBandwidthSpec,
            EngineError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            EngineError::InvalidPricingConfig(_) => ErrorCode::InvalidPricingConfig,
            EngineError::Io(_) | EngineError::Any(_) => ErrorCode::InternalError,
        }
    }

    /// Structured payload rendered under `details` in the error envelope.
    /// NoRouteFound always carries its exclusion report so a caller can
    /// explain the failure without a second request.
    pub fn details(&self) -> Option<Value> {
        match self {
            EngineError::NoRouteFound { exclusions, .. } => {
                serde_json::to_value(exclusions.as_ref()).ok()
            }
            EngineError::MissingExchangeRate(code) => {
                Some(serde_json::json!({ "currency": code }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub request_id: Option<String>,
    pub dataset_revision: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    inner: EngineError,
    context: ErrorContext,
}

impl ApiError {
    pub fn new(inner: EngineError) -> Self {
        Self {
            inner,
            context: ErrorContext::default(),
        }
    }

    pub fn with_context(inner: EngineError, context: ErrorContext) -> Self {
        Self { inner, context }
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        ApiError::new(value)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.inner.code().status()
    }

    fn error_response(&self) -> HttpResponse {
        #[derive(Debug, Serialize)]
        struct ErrorBody {
            schema_version: &'static str,
            code: &'static str,
            message: String,
            request_id: String,
            dataset_revision: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<Value>,
        }

        let request_id = self
            .context
            .request_id
            .clone()
            .unwrap_or_else(|| "unknown".into());
        let dataset_revision = self
            .context
            .dataset_revision
            .clone()
            .unwrap_or_else(|| "unknown".into());
        let body = ErrorBody {
            schema_version: ERROR_SCHEMA_VERSION,
            code: self.inner.code().as_str(),
            message: self.inner.to_string(),
            request_id,
            dataset_revision,
            details: self.inner.details(),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub fn json_error(err: JsonPayloadError) -> actix_web::Error {
    ApiError::new(EngineError::InvalidRequest(err.to_string())).into()
}

pub fn with_context(
    err: EngineError,
    request_id: Option<String>,
    dataset_revision: Option<String>,
) -> ApiError {
    ApiError::with_context(
        err,
        ErrorContext {
            request_id,
            dataset_revision,
        },
    )
}
