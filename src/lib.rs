//! Turnstile - Sliding-Window Request Limiting
//!
//! This crate implements a per-client sliding-window request limiter and an
//! HTTP gatekeeping layer that embeds it in front of an inner service, along
//! with request logging and time-of-day access restriction.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
