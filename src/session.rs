use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;

pub const SESSION_FILE: &str = ".okta-aws-login-sid";

/// Where the IdP session id survives between runs.
pub trait SessionStore {
    fn load(&self) -> anyhow::Result<Option<String>>;
    fn save(&self, session_id: &str) -> anyhow::Result<()>;
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let session_id = contents.trim();
                Ok((!session_id.is_empty()).then(|| session_id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Could not read {}", self.path.display())),
        }
    }

    fn save(&self, session_id: &str) -> anyhow::Result<()> {
        fs::write(&self.path, session_id)
            .with_context(|| format!("Could not write {}", self.path.display()))
    }
}
