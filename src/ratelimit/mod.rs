//! Rate limiting logic: quota policy, decisions and key derivation.

mod decision;
mod key;
mod limiter;
mod policy;

pub use decision::Decision;
pub use key::{KeyStrategy, MatchedRoute, MethodPath};
pub use limiter::RateLimiter;
pub use policy::QuotaPolicy;
