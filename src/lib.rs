//! Connection management and topic / consumer offset administration for Kafka clusters.
//!
//! A [`ConnectionRegistry`](registry::ConnectionRegistry) hands out one
//! [`ClusterConnection`](cluster::ClusterConnection) per named [`Profile`](profile::Profile). A
//! connection talks to the cluster's controller through a [`BrokerWire`](wire::BrokerWire),
//! checks its health before every operation, reconnects when needed and caches the cluster
//! metadata.
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rust_2018_idioms,
    unsafe_code
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

#[cfg(feature = "wire-rdkafka")]
mod build_info;
pub mod cluster;
pub mod metadata;
pub mod profile;
mod protocol;
pub mod registry;
pub mod topic;
mod validation;
pub mod wire;

pub type ProtocolError = protocol::error::Error;
