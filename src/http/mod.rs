//! HTTP gatekeeping layer that embeds the limiter in a request pipeline.

mod middleware;
mod server;

pub use middleware::{
    limit_requests, log_requests, restrict_access_hours, ErrorBody, GatekeeperState,
    ACCESS_HOURS_MESSAGE, RATE_LIMIT_MESSAGE, USER_HEADER,
};
pub use server::{app, gatekeep, health_router, placeholder_router, GatekeeperServer};
