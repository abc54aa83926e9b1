pub mod guard;

pub use guard::{pending_shares, ExecutionGuard};
