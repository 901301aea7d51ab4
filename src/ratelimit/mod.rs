//! Sliding-window rate limiting logic and state management.

mod client_key;
mod limiter;
mod sweeper;
mod window;

pub use client_key::{ClientKey, FORWARDED_FOR_HEADER};
pub use limiter::{Decision, LimiterSettings, SlidingWindowLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
pub use sweeper::Sweeper;
pub use window::ClientWindow;
