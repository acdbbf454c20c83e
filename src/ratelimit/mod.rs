//! Rate limiting policy layer: rules, admission decisions, guarded
//! operations, and bulk state reset.

mod guard;
mod limiter;
mod rules;
mod sweep;

pub use guard::ThrottleGuard;
pub use limiter::SlidingWindowLimiter;
pub use rules::{Rule, RuleResolver, DEFAULT_RULE};
pub use sweep::BulkKeyReset;
