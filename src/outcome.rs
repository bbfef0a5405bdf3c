use crate::error::Error;

/// Result of any step that may be escaped by the operator.
///
/// `Cancelled` is a normal terminal outcome and never carries an error.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Cancelled,
    Failed(Error),
}

impl<T> Outcome<T> {
    /// Collapses into a `Result`, with cancellation as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, Error> {
        match self {
            Self::Ok(value) => Ok(Some(value)),
            Self::Cancelled => Ok(None),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Unwraps `Outcome::Ok`, returning early from the enclosing function on
/// `Cancelled` or `Failed`.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::outcome::Outcome::Ok(value) => value,
            $crate::outcome::Outcome::Cancelled => {
                return $crate::outcome::Outcome::Cancelled;
            }
            $crate::outcome::Outcome::Failed(error) => {
                return $crate::outcome::Outcome::Failed(error);
            }
        }
    };
}
