//! Structural invariant checks for dependency graphs.

pub use self::error::{ValidationError, ValidationErrorType};
pub use self::validator::Validator;

mod error;
mod validator;
mod rules {
    pub mod producers;
    pub mod roots;
}
