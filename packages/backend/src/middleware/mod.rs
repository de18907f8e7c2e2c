pub mod admin;
pub mod rate_limit;
pub mod user;

pub use admin::require_admin;
pub use rate_limit::rate_limit_middleware;
pub use user::{require_user, CurrentUser};
