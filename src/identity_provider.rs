use crate::error::LoginError;
use crate::saml::SAMLAssertion;

/// An assertion together with the session id seen in the same exchange.
///
/// `session_id` is `None` when the IdP sent no `sid` cookie back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SAMLResponseBundle {
    pub assertion: SAMLAssertion,
    pub session_id: Option<String>,
}

/// What the login flow needs from an identity provider.
pub trait IdentityProvider {
    /// Reuses a browser session to fetch a fresh assertion.
    fn session_to_assertion(&self, session_id: &str) -> Result<SAMLResponseBundle, LoginError>;

    /// Trades a one-time session token for an assertion.
    fn token_to_assertion(&self, session_token: &str) -> Result<SAMLResponseBundle, LoginError>;

    /// Checks a username and password, returning a one-time session token.
    fn authenticate(&self, username: &str, password: &str) -> Result<String, LoginError>;
}
