pub mod trace;

pub use trace::{format_failure, format_trace};
