use serde::Deserialize;

use crate::error::LoginError;
use crate::http_client::create_http_client;
use crate::saml::{AwsRole, SAMLAssertion};

const STS_API_VERSION: &str = "2011-06-15";

/// Temporary credentials issued by STS.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Credentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,

    #[serde(rename = "SessionToken")]
    pub session_token: String,

    #[serde(rename = "Expiration", default)]
    pub expiration: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct AssumeRoleWithSAMLResponseWrapper {
    #[serde(rename = "AssumeRoleWithSAMLResponse")]
    assume_role_with_saml_response: AssumeRoleWithSAMLResponse,
}

#[derive(Deserialize, Debug)]
struct AssumeRoleWithSAMLResponse {
    #[serde(rename = "AssumeRoleWithSAMLResult")]
    assume_role_with_saml_result: AssumeRoleWithSAMLResult,
}

#[derive(Deserialize, Debug)]
struct AssumeRoleWithSAMLResult {
    #[serde(rename = "Credentials")]
    credentials: Credentials,
}

/// Exchanges an assertion for temporary credentials.
pub trait FederationBroker {
    fn assume_role_with_saml(
        &self,
        role: &AwsRole,
        assertion: &SAMLAssertion,
    ) -> Result<Credentials, LoginError>;
}

/// STS over the query API. AssumeRoleWithSAML is unsigned, so no AWS
/// credentials are needed to call it.
pub struct AwsClient {
    pub endpoint: String,
}

impl AwsClient {
    pub fn for_region(region: &str) -> Self {
        Self {
            endpoint: sts_endpoint(region),
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl FederationBroker for AwsClient {
    fn assume_role_with_saml(
        &self,
        role: &AwsRole,
        assertion: &SAMLAssertion,
    ) -> Result<Credentials, LoginError> {
        log::debug!("calling AssumeRoleWithSAML at {}", self.endpoint);

        let response = create_http_client()?
            .post(&self.endpoint)
            .form(&[
                ("Version", STS_API_VERSION),
                ("Action", "AssumeRoleWithSAML"),
                ("RoleArn", role.role_arn.as_str()),
                ("PrincipalArn", role.principal_arn.as_str()),
                ("SAMLAssertion", assertion.as_base64()),
            ])
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(LoginError::BrokerExchange(format!(
                "status_code: {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let resp: AssumeRoleWithSAMLResponseWrapper = serde_json::from_str(&body)
            .map_err(|e| LoginError::BrokerExchange(format!("unreadable response: {}", e)))?;

        Ok(resp
            .assume_role_with_saml_response
            .assume_role_with_saml_result
            .credentials)
    }
}

/// Decodes the role from `assertion` and assumes it through `broker`.
///
/// Broker errors are returned unchanged and never retried here.
pub fn exchange(
    broker: &dyn FederationBroker,
    assertion: &SAMLAssertion,
) -> Result<Credentials, LoginError> {
    let role = assertion.extract_role()?;
    log::info!("assuming {} via {}", role.role_arn, role.principal_arn);

    let credentials = broker.assume_role_with_saml(&role, assertion)?;
    if let Some(expiration) = credentials.expiration {
        log::info!("credentials expire at epoch {}", expiration);
    }
    Ok(credentials)
}

pub fn sts_endpoint(region: &str) -> String {
    if region.starts_with("cn-") {
        format!("https://sts.{}.amazonaws.com.cn", region)
    } else {
        format!("https://sts.{}.amazonaws.com", region)
    }
}
