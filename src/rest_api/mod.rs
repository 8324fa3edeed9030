//! HTTP surface for health checks and metrics scraping

mod server;

pub use server::{router, run_server};
