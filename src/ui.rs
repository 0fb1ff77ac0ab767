use std::io::{self, BufRead, Write};

use anyhow::Context;

/// Interactive prompts. Implementations return trimmed input.
pub trait UI {
    /// Asks for the IdP app URL, falling back to `default` on empty input.
    fn prompt_url(&self, default: &str) -> anyhow::Result<String>;

    fn prompt_region(&self, default: &str) -> anyhow::Result<String>;

    fn get_username_and_password(&self) -> anyhow::Result<(String, String)>;

    fn error(&self, message: &str);

    fn info(&self, message: &str);
}

pub struct StdUI;

impl UI for StdUI {
    fn prompt_url(&self, default: &str) -> anyhow::Result<String> {
        loop {
            let prompt = if default.is_empty() {
                "AWS IDP URL".to_string()
            } else {
                format!("AWS IDP URL [default {}]", default)
            };

            let url = read_line_from_stdin(&prompt)?;
            if !url.is_empty() {
                return Ok(url);
            } else if !default.is_empty() {
                return Ok(default.to_string());
            }
        }
    }

    fn prompt_region(&self, default: &str) -> anyhow::Result<String> {
        let region = read_line_from_stdin(&format!("AWS Region [default {}]", default))?;
        if region.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(region)
        }
    }

    fn get_username_and_password(&self) -> anyhow::Result<(String, String)> {
        let username = read_from_stdin("Username")?;
        let password = read_password_from_stdin("Password")?;
        Ok((username, password))
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn info(&self, message: &str) {
        println!("{}", message);
    }
}

fn read_line_from_stdin(prompt: &str) -> anyhow::Result<String> {
    print!("{}: ", prompt);
    io::stdout().flush()?;

    let mut text = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut text)
        .context("Could not read from stdin")?;
    anyhow::ensure!(read > 0, "stdin closed");
    Ok(text.trim().to_string())
}

pub fn read_from_stdin(prompt: &str) -> anyhow::Result<String> {
    loop {
        let text = read_line_from_stdin(prompt)?;
        if !text.is_empty() {
            return Ok(text);
        }
    }
}

pub fn read_password_from_stdin(prompt: &str) -> anyhow::Result<String> {
    loop {
        print!("{}: ", prompt);
        io::stdout().flush()?;

        let pass = rpassword::read_password().context("Could not read password")?;
        if !pass.trim().is_empty() {
            return Ok(pass.trim().to_string());
        }
    }
}
