use thiserror::Error;
use tfreq_model::ObjectKey;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Store error during {operation} of {key}: {message}")]
    Store {
        operation: &'static str,
        key: ObjectKey,
        message: String,
    },

    #[error(
        "Invalid operation {0:?}: expected one of apply, plan, destroy"
    )]
    InvalidOperation(String),

    #[error("Cannot reference {0} as owner: object has no uid yet")]
    MissingOwnerUid(ObjectKey),
}

impl ControllerError {
    pub fn store(
        operation: &'static str,
        key: &ObjectKey,
        message: impl ToString,
    ) -> Self {
        ControllerError::Store {
            operation,
            key: key.clone(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
