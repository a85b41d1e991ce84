// cas-bench - Library root for testing

pub mod bench;
pub mod config;
pub mod error;
pub mod http_client;
pub mod multipart;
pub mod payload;
pub mod precondition;
pub mod verifier;
