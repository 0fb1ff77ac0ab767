use anyhow::Context;

use crate::aws::{self, FederationBroker};
use crate::error::LoginError;
use crate::identity_provider::{IdentityProvider, SAMLResponseBundle};
use crate::profile::{ProfileSettings, ProfileWriter};
use crate::saml::SAMLAssertion;
use crate::session::SessionStore;
use crate::ui::UI;

/// How many username/password attempts the user gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// At least one attempt is always made.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Whether attempt number `attempt` (1-based) may be made.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Gets an assertion from a cached session if the IdP still honours it,
/// otherwise by signing in, and turns it into a credentials profile.
pub struct LoginFlow<'a> {
    pub idp: &'a dyn IdentityProvider,
    pub sessions: &'a dyn SessionStore,
    pub ui: &'a dyn UI,
    pub retry: RetryPolicy,
}

impl LoginFlow<'_> {
    pub fn run(
        &self,
        broker: &dyn FederationBroker,
        profiles: &dyn ProfileWriter,
        region: &str,
    ) -> anyhow::Result<()> {
        let assertion = self.get_saml_assertion()?;
        let credentials = aws::exchange(broker, &assertion)?;
        profiles.save(&ProfileSettings::default_profile(credentials, region))
    }

    pub fn get_saml_assertion(&self) -> anyhow::Result<SAMLAssertion> {
        if let Some(assertion) = self.from_cached_session() {
            return Ok(assertion);
        }
        self.from_password()
    }

    // Any failure here means the cached session is stale.
    fn from_cached_session(&self) -> Option<SAMLAssertion> {
        let session_id = match self.sessions.load() {
            Ok(Some(session_id)) => session_id,
            Ok(None) => {
                log::debug!("no cached session");
                return None;
            }
            Err(e) => {
                log::warn!("ignoring cached session: {:#}", e);
                return None;
            }
        };

        match self.idp.session_to_assertion(&session_id) {
            Ok(bundle) => {
                log::info!("reused cached session");
                Some(self.keep_session(bundle))
            }
            Err(e) => {
                log::info!("cached session not accepted: {}", e);
                None
            }
        }
    }

    fn from_password(&self) -> anyhow::Result<SAMLAssertion> {
        let mut attempt = 1;
        loop {
            let (username, password) = self.ui.get_username_and_password()?;

            let status = match self.idp.authenticate(&username, &password) {
                Ok(session_token) => {
                    let bundle = self
                        .idp
                        .token_to_assertion(&session_token)
                        .context("Signed in, but could not get a SAML assertion")?;
                    return Ok(self.keep_session(bundle));
                }
                Err(LoginError::AuthenticationRejected(status)) => status,
                Err(e) => return Err(e.into()),
            };

            log::debug!("authentication attempt {} rejected: {}", attempt, status);
            attempt += 1;
            if !self.retry.allows(attempt) {
                return Err(LoginError::AuthenticationRejected(status))
                    .with_context(|| format!("Giving up after {} attempts", attempt - 1));
            }
            self.ui
                .error(&format!("Auth failed ({}), please try again.", status));
        }
    }

    fn keep_session(&self, bundle: SAMLResponseBundle) -> SAMLAssertion {
        match bundle.session_id {
            Some(session_id) => {
                if let Err(e) = self.sessions.save(&session_id) {
                    log::warn!("could not cache session: {:#}", e);
                }
            }
            None => {
                log::warn!("identity provider sent no session cookie");
                self.ui
                    .error("warning: no session cookie received, the session was not cached");
            }
        }
        bundle.assertion
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::aws::Credentials;
    use crate::saml::AwsRole;

    const ASSERTION: &str = "PHNhbWwyOkFzc2VydGlvbi8+";

    #[derive(Default)]
    struct FakeIdp {
        live_sessions: Vec<&'static str>,
        rejections: Cell<u32>,
        token_fails: bool,
        cookie: Option<&'static str>,
        session_calls: Cell<u32>,
        auth_calls: Cell<u32>,
        token_calls: Cell<u32>,
    }

    impl FakeIdp {
        fn bundle(&self) -> SAMLResponseBundle {
            SAMLResponseBundle {
                assertion: SAMLAssertion::new(ASSERTION),
                session_id: self.cookie.map(str::to_string),
            }
        }
    }

    impl IdentityProvider for FakeIdp {
        fn session_to_assertion(&self, session_id: &str) -> Result<SAMLResponseBundle, LoginError> {
            self.session_calls.set(self.session_calls.get() + 1);
            if self.live_sessions.iter().any(|live| *live == session_id) {
                Ok(self.bundle())
            } else {
                Err(LoginError::AssertionNotFound)
            }
        }

        fn token_to_assertion(&self, session_token: &str) -> Result<SAMLResponseBundle, LoginError> {
            self.token_calls.set(self.token_calls.get() + 1);
            assert_eq!(session_token, "one-time-token");
            if self.token_fails {
                Err(LoginError::AssertionNotFound)
            } else {
                Ok(self.bundle())
            }
        }

        fn authenticate(&self, username: &str, password: &str) -> Result<String, LoginError> {
            self.auth_calls.set(self.auth_calls.get() + 1);
            assert_eq!((username, password), ("alice", "hunter2"));
            match self.rejections.get() {
                0 => Ok("one-time-token".to_string()),
                n => {
                    self.rejections.set(n - 1);
                    Err(LoginError::AuthenticationRejected("LOCKED_OUT".to_string()))
                }
            }
        }
    }

    #[derive(Default)]
    struct MemorySessions {
        stored: RefCell<Option<String>>,
        saves: Cell<u32>,
    }

    impl MemorySessions {
        fn holding(session_id: &str) -> Self {
            Self {
                stored: RefCell::new(Some(session_id.to_string())),
                saves: Cell::new(0),
            }
        }
    }

    impl SessionStore for MemorySessions {
        fn load(&self) -> anyhow::Result<Option<String>> {
            Ok(self.stored.borrow().clone())
        }

        fn save(&self, session_id: &str) -> anyhow::Result<()> {
            self.saves.set(self.saves.get() + 1);
            *self.stored.borrow_mut() = Some(session_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeUI {
        prompts: Cell<u32>,
        errors: RefCell<Vec<String>>,
    }

    impl UI for FakeUI {
        fn prompt_url(&self, _default: &str) -> anyhow::Result<String> {
            unreachable!()
        }

        fn prompt_region(&self, _default: &str) -> anyhow::Result<String> {
            unreachable!()
        }

        fn get_username_and_password(&self) -> anyhow::Result<(String, String)> {
            self.prompts.set(self.prompts.get() + 1);
            Ok(("alice".to_string(), "hunter2".to_string()))
        }

        fn error(&self, message: &str) {
            self.errors.borrow_mut().push(message.to_string());
        }

        fn info(&self, _message: &str) {}
    }

    fn flow<'a>(idp: &'a FakeIdp, sessions: &'a MemorySessions, ui: &'a FakeUI) -> LoginFlow<'a> {
        LoginFlow {
            idp,
            sessions,
            ui,
            retry: RetryPolicy::unbounded(),
        }
    }

    #[test]
    fn retry_policy_bounds() {
        assert!(RetryPolicy::unbounded().allows(u32::MAX));
        assert!(RetryPolicy::bounded(3).allows(3));
        assert!(!RetryPolicy::bounded(3).allows(4));
        assert!(RetryPolicy::bounded(0).allows(1));
        assert_eq!(RetryPolicy::default(), RetryPolicy::unbounded());
    }

    #[test]
    fn live_cached_session_skips_prompt() {
        let idp = FakeIdp {
            live_sessions: vec!["abc"],
            cookie: Some("xyz"),
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::holding("abc");
        let ui = FakeUI::default();

        let assertion = flow(&idp, &sessions, &ui).get_saml_assertion().unwrap();

        assert_eq!(assertion.as_base64(), ASSERTION);
        assert_eq!(ui.prompts.get(), 0);
        assert_eq!(idp.auth_calls.get(), 0);
        assert_eq!(sessions.stored.borrow().as_deref(), Some("xyz"));
    }

    #[test]
    fn stale_cached_session_prompts_once() {
        let idp = FakeIdp {
            cookie: Some("fresh"),
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::holding("expired");
        let ui = FakeUI::default();

        flow(&idp, &sessions, &ui).get_saml_assertion().unwrap();

        assert_eq!(idp.session_calls.get(), 1);
        assert_eq!(ui.prompts.get(), 1);
        assert_eq!(idp.auth_calls.get(), 1);
        assert_eq!(idp.token_calls.get(), 1);
        assert_eq!(sessions.stored.borrow().as_deref(), Some("fresh"));
    }

    #[test]
    fn missing_cache_goes_straight_to_prompt() {
        let idp = FakeIdp {
            cookie: Some("fresh"),
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::default();
        let ui = FakeUI::default();

        flow(&idp, &sessions, &ui).get_saml_assertion().unwrap();

        assert_eq!(idp.session_calls.get(), 0);
        assert_eq!(ui.prompts.get(), 1);
    }

    #[test]
    fn rejected_password_is_retried() {
        let idp = FakeIdp {
            rejections: Cell::new(2),
            cookie: Some("fresh"),
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::default();
        let ui = FakeUI::default();

        flow(&idp, &sessions, &ui).get_saml_assertion().unwrap();

        assert_eq!(idp.auth_calls.get(), 3);
        assert_eq!(ui.prompts.get(), 3);
        assert_eq!(
            *ui.errors.borrow(),
            vec!["Auth failed (LOCKED_OUT), please try again."; 2]
        );
        assert_eq!(idp.token_calls.get(), 1);
    }

    #[test]
    fn bounded_retry_gives_up() {
        let idp = FakeIdp {
            rejections: Cell::new(10),
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::default();
        let ui = FakeUI::default();
        let flow = LoginFlow {
            retry: RetryPolicy::bounded(3),
            ..flow(&idp, &sessions, &ui)
        };

        let err = flow.get_saml_assertion().unwrap_err();

        assert_eq!(idp.auth_calls.get(), 3);
        assert_eq!(ui.errors.borrow().len(), 2);
        assert!(matches!(
            err.downcast_ref::<LoginError>(),
            Some(LoginError::AuthenticationRejected(_))
        ));
        assert_eq!(sessions.saves.get(), 0);
    }

    #[test]
    fn other_auth_errors_are_not_retried() {
        struct BrokenIdp;

        impl IdentityProvider for BrokenIdp {
            fn session_to_assertion(&self, _: &str) -> Result<SAMLResponseBundle, LoginError> {
                unreachable!()
            }

            fn token_to_assertion(&self, _: &str) -> Result<SAMLResponseBundle, LoginError> {
                unreachable!()
            }

            fn authenticate(&self, _: &str, _: &str) -> Result<String, LoginError> {
                Err(LoginError::InvalidIdpResponse("not JSON".to_string()))
            }
        }

        let sessions = MemorySessions::default();
        let ui = FakeUI::default();
        let flow = LoginFlow {
            idp: &BrokenIdp,
            sessions: &sessions,
            ui: &ui,
            retry: RetryPolicy::unbounded(),
        };

        assert!(flow.get_saml_assertion().is_err());
        assert_eq!(ui.prompts.get(), 1);
    }

    #[test]
    fn assertion_failure_after_sign_in_is_fatal() {
        let idp = FakeIdp {
            token_fails: true,
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::holding("expired");
        let ui = FakeUI::default();

        let err = flow(&idp, &sessions, &ui).get_saml_assertion().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LoginError>(),
            Some(LoginError::AssertionNotFound)
        ));
        assert_eq!(ui.prompts.get(), 1);
        assert_eq!(idp.session_calls.get(), 1);
        assert_eq!(sessions.stored.borrow().as_deref(), Some("expired"));
    }

    #[test]
    fn missing_cookie_keeps_cached_session_and_warns() {
        let idp = FakeIdp {
            live_sessions: vec!["abc"],
            cookie: None,
            ..FakeIdp::default()
        };
        let sessions = MemorySessions::holding("abc");
        let ui = FakeUI::default();

        flow(&idp, &sessions, &ui).get_saml_assertion().unwrap();

        assert_eq!(sessions.saves.get(), 0);
        assert_eq!(sessions.stored.borrow().as_deref(), Some("abc"));
        assert_eq!(ui.errors.borrow().len(), 1);
    }

    #[test]
    fn run_writes_default_profile() {
        struct StaticBroker;

        impl FederationBroker for StaticBroker {
            fn assume_role_with_saml(
                &self,
                role: &AwsRole,
                assertion: &SAMLAssertion,
            ) -> Result<Credentials, LoginError> {
                assert_eq!(role.role_arn, "arn:aws:iam::111:role/Y");
                assert_eq!(assertion.as_base64(), encoded_assertion());
                Ok(Credentials {
                    access_key_id: "ASIAEXAMPLE".to_string(),
                    secret_access_key: "secret".to_string(),
                    session_token: "token".to_string(),
                    expiration: None,
                })
            }
        }

        #[derive(Default)]
        struct RecordingWriter {
            saved: RefCell<Vec<ProfileSettings>>,
        }

        impl ProfileWriter for RecordingWriter {
            fn save(&self, profile: &ProfileSettings) -> anyhow::Result<()> {
                self.saved.borrow_mut().push(profile.clone());
                Ok(())
            }
        }

        fn encoded_assertion() -> String {
            base64::encode(
                "<saml2:AttributeValue>arn:aws:iam::111:saml-provider/X,arn:aws:iam::111:role/Y</saml2:AttributeValue>",
            )
        }

        struct LiveIdp;

        impl IdentityProvider for LiveIdp {
            fn session_to_assertion(&self, _: &str) -> Result<SAMLResponseBundle, LoginError> {
                Ok(SAMLResponseBundle {
                    assertion: SAMLAssertion::new(encoded_assertion()),
                    session_id: Some("xyz".to_string()),
                })
            }

            fn token_to_assertion(&self, _: &str) -> Result<SAMLResponseBundle, LoginError> {
                unreachable!()
            }

            fn authenticate(&self, _: &str, _: &str) -> Result<String, LoginError> {
                unreachable!()
            }
        }

        let sessions = MemorySessions::holding("abc");
        let ui = FakeUI::default();
        let writer = RecordingWriter::default();
        let flow = LoginFlow {
            idp: &LiveIdp,
            sessions: &sessions,
            ui: &ui,
            retry: RetryPolicy::unbounded(),
        };

        flow.run(&StaticBroker, &writer, "us-west-2").unwrap();

        let saved = writer.saved.borrow();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].profile_name, "default");
        assert_eq!(saved[0].access_key_id, "ASIAEXAMPLE");
        assert_eq!(saved[0].region, "us-west-2");
        assert_eq!(saved[0].output, "json");
    }
}
