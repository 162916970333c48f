//! HTTP client module
//!
//! Provides an HTTP client with retry, rate limiting and authentication.
//!
//! # Features
//!
//! - **Automatic Retries**: capped exponential backoff, `Retry-After` on 429
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Authentication**: Integration with the auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestConfig, RetryPolicy};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
