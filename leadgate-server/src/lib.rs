#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! leadgate-server

pub mod app_state;
pub mod docs;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod otp;
pub mod rate_limit;
pub mod router;
pub mod routes;
pub mod settings;
pub mod setups;
pub mod templates;

#[cfg(test)]
pub mod test_utils;
