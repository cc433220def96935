//! Domain models shared by the reconciliation logic:
//! - [`Cidr`] - IPv4 subnet in CIDR notation
//! - [`Route`], [`Instance`], [`Subnetwork`] and friends - provider resources
//! - [`Operation`] and [`OperationScope`] - asynchronous mutation handles
//! - [`ResourceRef`] - parsed provider self-links

mod cidr;
mod compute;
mod operation;
mod reference;

// Re-export public types
pub use cidr::{get_cidr_mask, Cidr, MAX_LENGTH};
pub use compute::{
    AliasIpRange, Instance, Network, NetworkInterface, NextHop, Route, SecondaryRange, Subnetwork,
};
pub use operation::{Operation, OperationError, OperationErrors, OperationScope, OperationStatus};
pub use reference::{last_segment, Location, ResourceRef};
