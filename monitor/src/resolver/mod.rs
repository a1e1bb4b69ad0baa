//! Validator directory: short-address resolution and its refresh loop.

pub mod cache;
pub mod error;
pub mod http;
pub mod refresher;

pub use cache::{UNKNOWN_NAME, ValidatorMap, ValidatorRecord, ValidatorResolver, short_address};
pub use error::ResolverError;
pub use http::{HttpValidatorDirectory, ValidatorDirectory, ValidatorSummary};
pub use refresher::ValidatorRefresher;
