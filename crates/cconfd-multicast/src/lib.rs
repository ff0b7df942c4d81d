//! Multicast group membership for the cconfd backend socket.
//!
//! The daemon's backend datagram socket must belong to the cluster's
//! multicast group before it can see cluster-wide configuration
//! requests. This crate models the group address (including the
//! `"default"` sentinel understood on the command line) and performs
//! the actual membership join on either protocol family.

pub mod group;
pub mod membership;

pub use group::{
    AddressFamily, GroupAddress, GroupAddressError, DEFAULT_GROUP_V4, DEFAULT_GROUP_V6,
};
pub use membership::{join_group, JoinOptions, MembershipError};
