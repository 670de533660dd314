//! Siscomex DUE API client.

mod client;
mod lockout;

pub use client::SiscomexClient;
pub use lockout::lockout_release;
