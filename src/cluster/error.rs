use thiserror::Error;

use crate::{protocol::error::Error as ProtocolError, wire::WireError};

/// What a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// Cluster-wide request, e.g. metadata or group listing.
    Cluster,

    /// Request for a single topic.
    Topic(String),

    /// Offsets of one consumer group for one topic.
    Group { group: String, topic: String },
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("No bootstrap brokers given")]
    NoBrokers,

    #[error("Cannot connect to any of the bootstrap brokers {brokers:?}: {source}")]
    Dial {
        brokers: Vec<String>,
        #[source]
        source: WireError,
    },

    #[error("Cannot resolve the controller broker: {0}")]
    ControllerLookup(#[source] WireError),

    #[error("Connection lost and reconnect failed: {0}")]
    ConnectionLost(#[source] Box<Error>),

    #[error("Topic \"{0}\" not found")]
    TopicNotFound(String),

    #[error("Topic \"{0}\" was created but is missing from the refreshed metadata")]
    TopicNotFoundAfterCreate(String),

    #[error("Invalid topic config: {0}")]
    InvalidTopicConfig(String),

    #[error(
        "Server error {protocol_error} with message \"{}\", request: {request:?}",
        error_message.as_deref().unwrap_or_default()
    )]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },

    #[error("Request {request:?} failed: {source}")]
    Request {
        request: RequestContext,
        #[source]
        source: WireError,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Wraps a failed wire call. Broker-reported errors are passed through as
    /// [`ServerError`](Self::ServerError).
    pub(crate) fn request(request: RequestContext, e: WireError) -> Self {
        match e {
            WireError::Server {
                protocol_error,
                error_message,
            } => Self::ServerError {
                protocol_error,
                error_message,
                request,
            },
            source => Self::Request { request, source },
        }
    }

    pub(crate) fn exactly_one_topic(count: usize) -> Self {
        Self::InvalidResponse(format!("Expected a single topic in response, got {count}"))
    }

    /// The broker-reported error code, if this error is one.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::ServerError { protocol_error, .. } => Some(*protocol_error),
            Self::ConnectionLost(inner) => inner.protocol_error(),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
