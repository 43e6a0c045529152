//! GFR Ring Membership
//!
//! Peers organize themselves into nested, identifier-ordered rings. Level 0 is
//! the innermost (local) ring; each level above it is a wider ring that the
//! local node reaches through its contact nodes.
//!
//! # Design
//!
//! [`RingLevelTable`] keeps one [`Ring`] per level behind a single table-wide
//! lock. Every read hands back a detached clone of the stored [`Node`], so a
//! caller can never mutate overlay state except through the table's own
//! operations.
//!
//! ```text
//! level 2   ( ... wide ring ... )
//!               ^ contact nodes
//! level 1   ( ... regional ring ... )
//!               ^ contact nodes
//! level 0   ( ... local ring ... )
//! ```
//!
//! Absence (unknown peer, level out of range) is always reported as an empty
//! or `None` result; only structural misuse during mutation (inserting into a
//! level that does not exist, pointing a successor at a non-member) is an
//! error.

mod error;
mod node;
mod ring;
mod table;

pub use error::{Result, RingError};
pub use node::{Node, NodeId};
pub use ring::Ring;
pub use table::RingLevelTable;
