//! Response contract validation
//!
//! Classifies one attempt:
//! - 202 and every body check passes -> `Success`
//! - 400 -> `ValidationFailure`
//! - 409 -> `DuplicateConflict`
//! - anything else (other status, no response, or a 202 whose body breaks
//!   the contract) -> `TransportFailure`
//!
//! Body checks for a 202: JSON object, non-null `order_id`, `status` in the
//! accepted set, `items` length equal to the items actually sent, and
//! `fulfillment_policy` / `fulfillment_action` keys present.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::client::ApiResponse;
use crate::order::OrderRequest;

pub const STATUS_ACCEPTED: u16 = 202;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_CONFLICT: u16 = 409;

/// Result of one request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success { latency: Duration },
    ValidationFailure { latency: Duration },
    DuplicateConflict { latency: Duration },
    TransportFailure { latency: Duration },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::ValidationFailure { .. } => OutcomeKind::ValidationFailure,
            Self::DuplicateConflict { .. } => OutcomeKind::DuplicateConflict,
            Self::TransportFailure { .. } => OutcomeKind::TransportFailure,
        }
    }

    pub fn latency(&self) -> Duration {
        match *self {
            Self::Success { latency }
            | Self::ValidationFailure { latency }
            | Self::DuplicateConflict { latency }
            | Self::TransportFailure { latency } => latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    ValidationFailure,
    DuplicateConflict,
    TransportFailure,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Success,
        OutcomeKind::ValidationFailure,
        OutcomeKind::DuplicateConflict,
        OutcomeKind::TransportFailure,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ValidationFailure => "validation_failure",
            Self::DuplicateConflict => "duplicate_conflict",
            Self::TransportFailure => "transport_failure",
        }
    }
}

/// First success-path check a response failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractBreach {
    StatusNotAccepted(u16),
    MalformedBody,
    MissingOrderId,
    UnexpectedOrderStatus(Option<String>),
    ItemCountMismatch { expected: usize, actual: Option<usize> },
    MissingFulfillmentPolicy,
    MissingFulfillmentAction,
}

impl ContractBreach {
    /// Stable key for per-check counters
    pub fn label(&self) -> &'static str {
        match self {
            Self::StatusNotAccepted(_) => "status_is_202",
            Self::MalformedBody => "body_is_json",
            Self::MissingOrderId => "has_order_id",
            Self::UnexpectedOrderStatus(_) => "has_accepted_status",
            Self::ItemCountMismatch { .. } => "items_count_matches",
            Self::MissingFulfillmentPolicy => "has_fulfillment_policy",
            Self::MissingFulfillmentAction => "has_fulfillment_action",
        }
    }
}

impl std::fmt::Display for ContractBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StatusNotAccepted(s) => write!(f, "status {} (expected {})", s, STATUS_ACCEPTED),
            Self::MalformedBody => write!(f, "response body is not a JSON object"),
            Self::MissingOrderId => write!(f, "order_id missing or null"),
            Self::UnexpectedOrderStatus(Some(s)) => write!(f, "unexpected order status {:?}", s),
            Self::UnexpectedOrderStatus(None) => write!(f, "order status missing"),
            Self::ItemCountMismatch {
                expected,
                actual: Some(actual),
            } => write!(f, "response has {} items, sent {}", actual, expected),
            Self::ItemCountMismatch {
                expected,
                actual: None,
            } => write!(f, "response has no items array, sent {}", expected),
            Self::MissingFulfillmentPolicy => write!(f, "fulfillment_policy missing"),
            Self::MissingFulfillmentAction => write!(f, "fulfillment_action missing"),
        }
    }
}

/// Classification plus the reason when it is not a success
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub breach: Option<ContractBreach>,
}

#[derive(Debug, Clone)]
pub struct ResponseValidator {
    accepted_statuses: Vec<String>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(["NEW", "RECEIVED"])
    }
}

impl ResponseValidator {
    pub fn new<S: Into<String>>(accepted_statuses: impl IntoIterator<Item = S>) -> Self {
        Self {
            accepted_statuses: accepted_statuses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(
        &self,
        request: &OrderRequest,
        response: &ApiResponse,
        latency: Duration,
    ) -> Verdict {
        match response.status {
            STATUS_BAD_REQUEST => Verdict {
                outcome: Outcome::ValidationFailure { latency },
                breach: Some(ContractBreach::StatusNotAccepted(response.status)),
            },
            STATUS_CONFLICT => Verdict {
                outcome: Outcome::DuplicateConflict { latency },
                breach: Some(ContractBreach::StatusNotAccepted(response.status)),
            },
            _ => match self.check(request.item_count(), response) {
                Ok(()) => Verdict {
                    outcome: Outcome::Success { latency },
                    breach: None,
                },
                Err(breach) => Verdict {
                    outcome: Outcome::TransportFailure { latency },
                    breach: Some(breach),
                },
            },
        }
    }

    /// No HTTP response at all (connect error, timeout)
    pub fn no_response(&self, latency: Duration) -> Verdict {
        Verdict {
            outcome: Outcome::TransportFailure { latency },
            breach: None,
        }
    }

    /// Success-path checks, in order; stops at the first failure
    pub fn check(&self, items_sent: usize, response: &ApiResponse) -> Result<(), ContractBreach> {
        if response.status != STATUS_ACCEPTED {
            return Err(ContractBreach::StatusNotAccepted(response.status));
        }

        let body: Value =
            serde_json::from_str(&response.body).map_err(|_| ContractBreach::MalformedBody)?;
        let body = body.as_object().ok_or(ContractBreach::MalformedBody)?;

        match body.get("order_id") {
            None | Some(Value::Null) => return Err(ContractBreach::MissingOrderId),
            Some(_) => {}
        }

        match body.get("status").and_then(Value::as_str) {
            Some(status) if self.accepted_statuses.iter().any(|s| s == status) => {}
            other => {
                return Err(ContractBreach::UnexpectedOrderStatus(
                    other.map(str::to_string),
                ))
            }
        }

        let returned = body.get("items").and_then(Value::as_array).map(Vec::len);
        if returned != Some(items_sent) {
            return Err(ContractBreach::ItemCountMismatch {
                expected: items_sent,
                actual: returned,
            });
        }

        if !body.contains_key("fulfillment_policy") {
            return Err(ContractBreach::MissingFulfillmentPolicy);
        }
        if !body.contains_key("fulfillment_action") {
            return Err(ContractBreach::MissingFulfillmentAction);
        }

        Ok(())
    }
}
