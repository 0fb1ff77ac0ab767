use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use config::{Environment, FileFormat};
use configparser::ini::Ini;
use serde::Deserialize;
use url::Url;

use crate::aws::AwsClient;
use crate::login::RetryPolicy;
use crate::saml::SamlParser;
use crate::ui::UI;

pub const CONFIG_FILE: &str = ".okta-aws-login";
pub const DEFAULT_REGION: &str = "us-east-1";

const SECTION: &str = "default";
const ENV_PREFIX: &str = "OKTA_AWS_LOGIN";

// configparser writes its default section without a header, and ours must
// keep its `[default]` header.
const UNNAMED_SECTION: &str = "okta-aws-login:unnamed";

/// A case-sensitive INI document in which `[default]` is an ordinary section.
///
/// Comment symbols are off, so comment lines load as value-less keys and are
/// written back unchanged, and `;` or `#` inside a value is kept.
pub(crate) fn ini() -> Ini {
    let mut ini = Ini::new_cs();
    ini.set_default_section(UNNAMED_SECTION);
    ini.set_comment_symbols(&[]);
    ini
}

/// Tool settings, kept in the `[default]` section of `~/.okta-aws-login`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub idp_aws_url: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub sts_endpoint: Option<String>,
    #[serde(default)]
    pub max_auth_attempts: Option<u32>,
    #[serde(default)]
    pub saml_parser: SamlParser,
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.max_auth_attempts {
            Some(max) => RetryPolicy::bounded(max),
            None => RetryPolicy::unbounded(),
        }
    }

    pub fn broker(&self) -> AwsClient {
        match &self.sts_endpoint {
            Some(endpoint) => AwsClient::with_endpoint(endpoint.as_str()),
            None => AwsClient::for_region(&self.region),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct SettingsFile {
    #[serde(default)]
    default: Option<Settings>,
}

pub trait SettingsStore {
    /// `None` until an IdP URL has been configured.
    fn load(&self) -> anyhow::Result<Option<Settings>>;
    fn save(&self, settings: &Settings) -> anyhow::Result<()>;
}

/// INI file store. Values can be overridden from the environment as
/// `OKTA_AWS_LOGIN_DEFAULT__<KEY>`.
pub struct IniSettingsStore {
    path: PathBuf,
    env: Option<HashMap<String, String>>,
}

impl IniSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env: None,
        }
    }

    /// Reads overrides from `env` instead of the process environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    fn environment(&self) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(self.env.clone())
    }
}

impl SettingsStore for IniSettingsStore {
    fn load(&self) -> anyhow::Result<Option<Settings>> {
        let file: SettingsFile = config::Config::builder()
            .add_source(
                config::File::from(self.path.as_path())
                    .format(FileFormat::Ini)
                    .required(false),
            )
            .add_source(self.environment())
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Could not read {}", self.path.display()))?;

        Ok(file
            .default
            .filter(|s| !s.idp_aws_url.is_empty())
            .map(|mut s| {
                if s.region.is_empty() {
                    s.region = DEFAULT_REGION.to_string();
                }
                s
            }))
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut ini = ini();
        if self.path.exists() {
            ini.load(&self.path)
                .map_err(|e| anyhow!("Failed to load {}: {}", self.path.display(), e))?;
        }

        ini.set(SECTION, "idp_aws_url", Some(settings.idp_aws_url.clone()));
        ini.set(SECTION, "region", Some(settings.region.clone()));
        if let Some(endpoint) = &settings.sts_endpoint {
            ini.set(SECTION, "sts_endpoint", Some(endpoint.clone()));
        }
        if let Some(max) = settings.max_auth_attempts {
            ini.set(SECTION, "max_auth_attempts", Some(max.to_string()));
        }
        if settings.saml_parser != SamlParser::default() {
            ini.set(SECTION, "saml_parser", Some(settings.saml_parser.as_str().to_string()));
        }

        ini.write(&self.path)
            .with_context(|| format!("Could not write {}", self.path.display()))
    }
}

/// Prompts for the IdP URL and region, defaulting to `current`.
pub fn configure(ui: &dyn UI, current: Settings) -> anyhow::Result<Settings> {
    let url = normalize_url(&ui.prompt_url(&current.idp_aws_url)?)?;

    let default_region = if current.region.is_empty() {
        DEFAULT_REGION
    } else {
        current.region.as_str()
    };
    let region = ui.prompt_region(default_region)?;

    Ok(Settings {
        idp_aws_url: url,
        region,
        ..current
    })
}

/// Drops the query and fragment from an app URL.
pub fn normalize_url(app_url: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(app_url).with_context(|| format!("Invalid URL: {}", app_url))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
