use std::io::{BufRead, BufReader, Read};

use scraper::{Html, Selector};
use serde::Deserialize;

use crate::error::LoginError;

const SAML_FIELD_MARKER: &str = "SAMLResponse";
const VALUE_ATTRIBUTE: &str = "value=\"";
const TAG_END: &str = "/>";

const ARN_PREFIX: &str = "arn:aws";
const SAML2_CLOSING_TAG: &str = "</saml2:";

/// The two ARNs a federated role assumption needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsRole {
    pub principal_arn: String,
    pub role_arn: String,
}

impl AwsRole {
    pub fn new(principal_arn: String, role_arn: String) -> Self {
        Self {
            principal_arn,
            role_arn,
        }
    }
}

/// A base64-encoded SAML response exactly as the IdP posted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SAMLAssertion {
    encoded: String,
}

impl SAMLAssertion {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    /// Recovers the principal and role ARNs from the decoded assertion.
    ///
    /// The IdP encodes the role attribute as `principal,role` inside a
    /// `saml2:AttributeValue`. Only the first such value is looked at, and
    /// the order is taken as given.
    pub fn extract_role(&self) -> Result<AwsRole, LoginError> {
        let decoded = base64::decode(&self.encoded)
            .map_err(|e| LoginError::MalformedAssertion(format!("not valid base64: {}", e)))?;
        let decoded = String::from_utf8_lossy(&decoded);

        let start = decoded.find(ARN_PREFIX).ok_or_else(|| {
            LoginError::MalformedAssertion(format!("no {} value in assertion", ARN_PREFIX))
        })?;
        let rest = &decoded[start..];
        let end = rest.find(SAML2_CLOSING_TAG).ok_or_else(|| {
            LoginError::MalformedAssertion(format!("no {} after role value", SAML2_CLOSING_TAG))
        })?;

        let arns = rest[..end].split(',').collect::<Vec<_>>();
        match arns.as_slice() {
            [principal_arn, role_arn, ..] => Ok(AwsRole::new(
                principal_arn.to_string(),
                role_arn.to_string(),
            )),
            _ => Err(LoginError::MalformedAssertion(format!(
                "expected principal and role ARNs, found {}",
                arns.len()
            ))),
        }
    }
}

/// Finds the SAML assertion in the body of the IdP's app page.
///
/// The body is consumed; the caller owns releasing the underlying response.
pub trait AssertionExtractor {
    fn extract(&self, body: &mut dyn Read) -> Result<SAMLAssertion, LoginError>;
}

/// Which [`AssertionExtractor`] to use.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamlParser {
    #[default]
    Line,
    Html,
}

impl SamlParser {
    pub fn as_str(self) -> &'static str {
        match self {
            SamlParser::Line => "line",
            SamlParser::Html => "html",
        }
    }

    pub fn extractor(self) -> Box<dyn AssertionExtractor> {
        match self {
            SamlParser::Line => Box::new(LineScanExtractor),
            SamlParser::Html => Box::new(HtmlFormExtractor),
        }
    }
}

/// Scans the body line by line for the `SAMLResponse` form field and slices
/// out its value without parsing the page.
pub struct LineScanExtractor;

impl AssertionExtractor for LineScanExtractor {
    fn extract(&self, body: &mut dyn Read) -> Result<SAMLAssertion, LoginError> {
        let mut reader = BufReader::new(body);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Err(LoginError::AssertionNotFound),
                Ok(_) => {}
                Err(e) => {
                    log::debug!("response body ended early: {}", e);
                    return Err(LoginError::AssertionNotFound);
                }
            }

            let line = String::from_utf8_lossy(&buf);
            if !line.contains(SAML_FIELD_MARKER) {
                continue;
            }

            let value = field_value(&line).ok_or_else(|| {
                LoginError::MalformedAssertion(format!("{} field has no value", SAML_FIELD_MARKER))
            })?;
            return Ok(SAMLAssertion::new(unescape_entities(value)));
        }
    }
}

/// Parses the page as HTML and reads `input[name="SAMLResponse"]`.
pub struct HtmlFormExtractor;

impl AssertionExtractor for HtmlFormExtractor {
    fn extract(&self, body: &mut dyn Read) -> Result<SAMLAssertion, LoginError> {
        let mut raw = Vec::new();
        if let Err(e) = body.read_to_end(&mut raw) {
            log::debug!("response body ended early: {}", e);
        }
        let document = Html::parse_document(&String::from_utf8_lossy(&raw));

        let selector = Selector::parse(r#"input[name="SAMLResponse"]"#)
            .map_err(|e| LoginError::MalformedAssertion(format!("{:?}", e)))?;

        let element = document
            .select(&selector)
            .next()
            .ok_or(LoginError::AssertionNotFound)?;
        let saml_response = element.value().attr("value").ok_or_else(|| {
            LoginError::MalformedAssertion(format!("{} field has no value", SAML_FIELD_MARKER))
        })?;

        Ok(SAMLAssertion::new(saml_response))
    }
}

// Everything between `value="` and the closing quote before `/>`.
fn field_value(line: &str) -> Option<&str> {
    let start = line.find(VALUE_ATTRIBUTE)? + VALUE_ATTRIBUTE.len();
    let rest = line.get(start..)?;
    let end = rest.find(TAG_END)?;

    let value = rest[..end].trim_end();
    let value = value.strip_suffix('"').unwrap_or(value);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// The IdP only escapes `+` and `=` inside the field.
fn unescape_entities(value: &str) -> String {
    value.replace("&#x2b;", "+").replace("&#x3d;", "=")
}
