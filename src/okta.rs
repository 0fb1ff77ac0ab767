use std::collections::HashMap;
use std::sync::Arc;

use reqwest::cookie::Jar;
use serde::Deserialize;
use url::Url;

use crate::error::LoginError;
use crate::http_client::{
    create_http_client, create_http_client_with_cookies, session_id_from_jar, session_jar,
};
use crate::identity_provider::{IdentityProvider, SAMLResponseBundle};
use crate::saml::AssertionExtractor;

const AUTHN_SUCCESS: &str = "SUCCESS";

#[derive(Deserialize, Debug)]
struct AuthNResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "sessionToken", default)]
    session_token: Option<String>,
    #[serde(rename = "errorSummary", default)]
    error_summary: Option<String>,
}

/// An Okta org serving one AWS SAML app.
pub struct Okta<'a> {
    pub base_uri: String,
    pub app_link: Url,
    pub extractor: &'a dyn AssertionExtractor,
}

impl<'a> Okta<'a> {
    /// Targets `https://<org>.okta.com`, where `<org>` is the first label of
    /// the app link's host.
    pub fn new(app_link: &str, extractor: &'a dyn AssertionExtractor) -> Result<Self, LoginError> {
        let app_link = Url::parse(app_link)
            .map_err(|e| LoginError::InvalidUrl(format!("{}: {}", app_link, e)))?;
        let base_uri = format!("https://{}.okta.com", org_name(&app_link)?);

        Ok(Self {
            base_uri,
            app_link,
            extractor,
        })
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    fn get_saml(&self, url: Url, jar: Arc<Jar>) -> Result<SAMLResponseBundle, LoginError> {
        let client = create_http_client_with_cookies(jar.clone())?;
        let mut response = client.get(url).send()?;
        log::debug!("app link responded with {}", response.status());

        let assertion = self.extractor.extract(&mut response)?;

        let session_id = session_id_from_jar(&jar, &self.app_link);
        if session_id.is_none() {
            log::warn!(
                "session cookie not found for {}",
                self.app_link.origin().ascii_serialization()
            );
        }

        Ok(SAMLResponseBundle {
            assertion,
            session_id,
        })
    }
}

impl IdentityProvider for Okta<'_> {
    fn session_to_assertion(&self, session_id: &str) -> Result<SAMLResponseBundle, LoginError> {
        log::debug!("reusing cached session for {}", self.app_link);
        let jar = session_jar(&self.app_link, session_id);
        self.get_saml(self.app_link.clone(), jar)
    }

    fn token_to_assertion(&self, session_token: &str) -> Result<SAMLResponseBundle, LoginError> {
        let mut url = self.app_link.clone();
        url.query_pairs_mut().append_pair("onetimetoken", session_token);
        self.get_saml(url, Arc::new(Jar::default()))
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<String, LoginError> {
        let mut request_data = HashMap::new();
        request_data.insert("username", username);
        request_data.insert("password", password);

        let uri = format!("{}/api/v1/authn", self.base_uri);
        log::debug!("authn uri: {}", uri);

        let response = create_http_client()?
            .post(&uri)
            .json(&request_data)
            .send()?;
        let status_code = response.status();
        let body = response.text()?;

        let resp: AuthNResponse = match serde_json::from_str(&body) {
            Ok(resp) => resp,
            Err(e) if status_code.is_success() => {
                return Err(LoginError::InvalidIdpResponse(format!(
                    "authn response is not JSON: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(LoginError::AuthenticationRejected(format!(
                    "status_code: {}",
                    status_code.as_u16()
                )))
            }
        };
        log::debug!("authn status: {:?}", resp.status);

        match resp.status.as_deref() {
            Some(AUTHN_SUCCESS) => resp.session_token.ok_or_else(|| {
                LoginError::InvalidIdpResponse("authn succeeded without a sessionToken".to_string())
            }),
            Some(status) => Err(LoginError::AuthenticationRejected(status.to_string())),
            None => Err(LoginError::AuthenticationRejected(
                resp.error_summary
                    .unwrap_or_else(|| format!("status_code: {}", status_code.as_u16())),
            )),
        }
    }
}

/// The Okta org name: the first dot-separated label of the host.
pub fn org_name(app_link: &Url) -> Result<&str, LoginError> {
    app_link
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|org| !org.is_empty())
        .ok_or_else(|| LoginError::InvalidUrl(format!("{} has no host", app_link)))
}
