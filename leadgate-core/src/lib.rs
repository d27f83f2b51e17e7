#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! leadgate-core
//!
//! Types shared between the leadgate server and the site calling it,
//! plus the email rules both sides agree on.

pub mod common;
pub mod email;
