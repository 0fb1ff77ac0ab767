use anyhow::Context;
use clap::Parser;

use okta_aws_login::login::LoginFlow;
use okta_aws_login::okta::Okta;
use okta_aws_login::profile::{CredentialsFile, CREDENTIALS_FILE};
use okta_aws_login::session::{FileSessionStore, SESSION_FILE};
use okta_aws_login::settings::{self, IniSettingsStore, SettingsStore, CONFIG_FILE};
use okta_aws_login::ui::{StdUI, UI};

/// Log in to AWS through an Okta SAML app and write temporary credentials
/// to the default profile.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Set the IdP app URL and region, then exit
    #[arg(long)]
    configure: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let settings_store = IniSettingsStore::new(home.join(CONFIG_FILE));
    let ui = StdUI;

    let settings = match settings_store.load()? {
        Some(settings) if !args.configure => settings,
        current => {
            let settings = settings::configure(&ui, current.unwrap_or_default())?;
            settings_store.save(&settings)?;
            settings
        }
    };
    if args.configure {
        return Ok(());
    }
    log::debug!("app link: {}", settings.idp_aws_url);

    let extractor = settings.saml_parser.extractor();
    let okta = Okta::new(&settings.idp_aws_url, extractor.as_ref())?;
    let sessions = FileSessionStore::new(home.join(SESSION_FILE));

    let flow = LoginFlow {
        idp: &okta,
        sessions: &sessions,
        ui: &ui,
        retry: settings.retry_policy(),
    };
    flow.run(
        &settings.broker(),
        &CredentialsFile::new(home.join(CREDENTIALS_FILE)),
        &settings.region,
    )?;

    ui.info("success!");
    Ok(())
}
