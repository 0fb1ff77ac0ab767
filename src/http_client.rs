use std::sync::Arc;

use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

const MAX_REDIRECTS: usize = 5;
const SESSION_COOKIE: &str = "sid";

fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// A client that follows redirects and records cookies in `jar`.
///
/// The jar lives only as long as one SAML exchange.
pub fn create_http_client_with_cookies(jar: Arc<Jar>) -> reqwest::Result<Client> {
    Client::builder()
        .redirect(redirect_policy())
        .cookie_provider(jar)
        .build()
}

pub fn create_http_client() -> reqwest::Result<Client> {
    Client::builder().redirect(redirect_policy()).build()
}

/// A jar holding only `sid=<session_id>` for the origin of `url`.
pub fn session_jar(url: &Url, session_id: &str) -> Arc<Jar> {
    let jar = Jar::default();
    jar.add_cookie_str(&format!("{}={}; Path=/", SESSION_COOKIE, session_id), url);
    Arc::new(jar)
}

/// Current value of the `sid` cookie the jar would send to `url`.
pub fn session_id_from_jar(jar: &Jar, url: &Url) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;

    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}
