#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use okta_aws_login::ui::UI;

pub const APP_PATH: &str = "/app/123";

/// Runs blocking client code off the async test runtime.
pub async fn blocking<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

/// The app page Okta serves once the user has a session.
pub fn saml_page(field_value: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><title>Signing in</title></head>
<body onload="document.forms[0].submit()">
<form id="appForm" action="https&#x3a;&#x2f;&#x2f;signin.aws.amazon.com&#x2f;saml" method="POST">
<input name="SAMLResponse" type="hidden" value="{}" />
<input name="RelayState" type="hidden" value=""/>
</form>
</body>
</html>
"#,
        field_value
    )
}

pub fn login_page() -> String {
    "<!DOCTYPE html>\n<html>\n<body>\n<div id=\"okta-sign-in\"></div>\n</body>\n</html>\n"
        .to_string()
}

/// Escapes `+` and `=` the way Okta does inside the form field.
pub fn okta_escape(assertion: &str) -> String {
    assertion.replace('+', "&#x2b;").replace('=', "&#x3d;")
}

pub fn role_assertion() -> String {
    base64::encode(
        r#"<saml2p:Response><saml2:Assertion><saml2:AttributeStatement><saml2:Attribute Name="https://aws.amazon.com/SAML/Attributes/Role"><saml2:AttributeValue>arn:aws:iam::111:saml-provider/X,arn:aws:iam::111:role/Y</saml2:AttributeValue></saml2:Attribute></saml2:AttributeStatement></saml2:Assertion></saml2p:Response>"#,
    )
}

/// Answers every credential prompt with the same username and password.
#[derive(Default)]
pub struct CountingUI {
    pub prompts: Cell<u32>,
    pub errors: RefCell<Vec<String>>,
}

impl UI for CountingUI {
    fn prompt_url(&self, default: &str) -> anyhow::Result<String> {
        Ok(default.to_string())
    }

    fn prompt_region(&self, default: &str) -> anyhow::Result<String> {
        Ok(default.to_string())
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
