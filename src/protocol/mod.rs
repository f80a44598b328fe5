//! Typed wire messages exchanged with the service process.
//!
//! The wire format is newline-delimited JSON. Three envelope shapes exist:
//!
//! | Direction        | Shape                                   |
//! |------------------|-----------------------------------------|
//! | client → service | `{"id", "method", "params"}` request    |
//! | service → client | `{"id", "result" \| "error"}` response   |
//! | service → client | `{"event", "params"}` notification       |
//!
//! - `outbound`: request construction and the subscription vocabulary.
//! - `inbound`: envelope parsing into the [`inbound::Inbound`] tagged union.

pub mod inbound;
pub mod outbound;
