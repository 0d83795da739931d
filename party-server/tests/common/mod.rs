//! Shared integration test harness.

mod server;

pub use server::TestServer;
