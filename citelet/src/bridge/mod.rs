//! Wire contract between a request client and a worker endpoint.
//!
//! - **envelope**: message shapes (`Request`, `Reply`, `Outcome`) and the
//!   strict validation that filters foreign traffic
//! - **codec**: JSON framing for channels backed by a byte stream

pub mod codec;
pub mod envelope;
