//! Bit-level primitives, wire formats and the kernel families built on them.
//!
//! - [`prbs`]: PRBS23 step function and byte-level helpers
//! - [`checksum`]: Internet checksum folding and IPv4 header helpers
//! - [`signature`]: the 20-byte signature record
//! - [`indexical`]: masked bucket extraction
//! - [`families`]: the dispatched kernel families and safe entry points

pub mod checksum;
pub mod families;
pub mod indexical;
pub mod prbs;
pub mod signature;

pub use signature::{Signature, SignatureFlags, TimestampPosition};
