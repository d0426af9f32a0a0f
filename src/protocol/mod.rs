//! Kafka protocol definitions shared with the wire client.
//!
//! The byte-level protocol itself is spoken by a [`BrokerWire`](crate::wire::BrokerWire)
//! implementation; this module only holds what the rest of the crate needs to interpret its
//! answers.
pub mod error;
