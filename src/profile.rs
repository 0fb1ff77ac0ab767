use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context};

use crate::aws::Credentials;
use crate::settings::ini;

pub const CREDENTIALS_FILE: &str = ".aws/credentials";
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_OUTPUT: &str = "json";

/// One profile's worth of the shared credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub profile_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
    pub output: String,
}

impl ProfileSettings {
    pub fn default_profile(credentials: Credentials, region: &str) -> Self {
        Self {
            profile_name: DEFAULT_PROFILE.to_string(),
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            session_token: credentials.session_token,
            region: region.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
        }
    }
}

pub trait ProfileWriter {
    fn save(&self, profile: &ProfileSettings) -> anyhow::Result<()>;
}

/// Writes into `~/.aws/credentials`, replacing only the keys it owns.
pub struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProfileWriter for CredentialsFile {
    fn save(&self, profile: &ProfileSettings) -> anyhow::Result<()> {
        let mut ini = ini();
        if self.path.exists() {
            ini.load(&self.path)
                .map_err(|e| anyhow!("Failed to load credentials: {}", e))?;
        } else if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }

        let section = profile.profile_name.as_str();
        ini.set(section, "aws_access_key_id", Some(profile.access_key_id.clone()));
        ini.set(section, "aws_secret_access_key", Some(profile.secret_access_key.clone()));
        ini.set(section, "aws_session_token", Some(profile.session_token.clone()));
        ini.set(section, "region", Some(profile.region.clone()));
        ini.set(section, "output", Some(profile.output.clone()));

        ini.write(&self.path)
            .with_context(|| format!("Could not write {}", self.path.display()))?;
        log::info!("wrote profile {} to {}", section, self.path.display());
        Ok(())
    }
}
