#![forbid(unsafe_code)]

pub mod auth;
pub mod dns;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use dns::{CloudDnsClient, CloudDnsConfig};
