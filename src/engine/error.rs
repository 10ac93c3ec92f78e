use ulid::Ulid;

use crate::model::OrderStatus;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    UnknownLocation(String),
    /// Location inactive, or no open day configured for today.
    ConfigMissing(String),
    InvalidTransition {
        id: Ulid,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// Rejected order input: no items, zero quantity, empty contact.
    InvalidOrder(&'static str),
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownLocation(id) => write!(f, "unknown location: {id}"),
            EngineError::ConfigMissing(id) => {
                write!(f, "location {id} has no open hours for today")
            }
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "order {id} cannot move from {from} to {to}")
            }
            EngineError::InvalidOrder(msg) => write!(f, "invalid order: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
