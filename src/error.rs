use thiserror::Error;

/// Failures of the federation pipeline.
///
/// Only [`LoginError::AuthenticationRejected`] is ever retried, and only by
/// the login orchestrator. Everything else ends the run.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("SAML not found")]
    AssertionNotFound,

    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("federation broker rejected the exchange: {0}")]
    BrokerExchange(String),

    #[error("malformed SAML assertion: {0}")]
    MalformedAssertion(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response from identity provider: {0}")]
    InvalidIdpResponse(String),
}
