//! h2mux - multiplexed binary-framed session engine
//!
//! This crate implements a draft-era HTTP/2-family protocol engine: frame
//! codec, reference-set header compression, stream state, flow control,
//! prioritized write scheduling, and a threaded session that ties them to a
//! byte-stream transport.
//!
//! - [`h2`] holds the protocol engine and the [`h2::Session`] type.
//! - [`transport`] defines what a session runs over and a TCP implementation.

pub mod h2;
pub mod transport;
