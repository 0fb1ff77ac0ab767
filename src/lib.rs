pub mod aws;
pub mod error;
pub mod http_client;
pub mod identity_provider;
pub mod login;
pub mod okta;
pub mod profile;
pub mod saml;
pub mod session;
pub mod settings;
pub mod ui;

pub use error::LoginError;
pub use identity_provider::{IdentityProvider, SAMLResponseBundle};
pub use saml::{AwsRole, SAMLAssertion};
