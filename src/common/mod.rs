pub mod response;

pub use response::{ApiError, ApiResponse, ErrorCode};
