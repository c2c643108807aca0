//! Collective rendezvous
//!
//! The skew probe needs two collectives, a barrier and an all-gather, plus a
//! way to abort the whole group. They are expressed by the [`Collective`]
//! trait and provided two ways:
//!
//! - **In-process**: [`LocalGroup`] members share a generation-counted round
//!   state; used for `skew --local N`
//! - **Over TCP**: participants ([`RemoteMember`]) connect to a
//!   [`RendezvousCoordinator`], which bridges every connection onto a
//!   `LocalGroup` member so both paths share one implementation
//!
//! # Modules
//!
//! - `collective`: the trait and the in-process group
//! - `protocol`: message definitions and framing
//! - `coordinator`: rendezvous service
//! - `participant`: remote group member

pub mod collective;
pub mod coordinator;
pub mod participant;
pub mod protocol;

pub use collective::{Collective, LocalGroup, LocalMember};
pub use coordinator::{GroupSummary, RendezvousCoordinator, SessionEnd};
pub use participant::RemoteMember;
pub use protocol::{Message, PROTOCOL_VERSION};
