use crate::{
    cli::{HttpMethod, OutputFormat},
    config::AppConfig,
    error::{AppError, Result},
    output::OutputManager,
};
use estate_auth::{LoginRedirect, SessionClient};
use serde_json::Value;
use std::io::{self, BufRead, Read};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tells the user to sign in again once the session has been dropped.
struct CliRedirect;

impl LoginRedirect for CliRedirect {
    fn redirect_to_login(&self) {
        warn!("Stored session is no longer valid");
        eprintln!("Session expired. Run `estate login <email>` to sign in again.");
    }
}

pub struct CommandExecutor {
    config: AppConfig,
    session: SessionClient,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, colored: bool) -> Result<Self> {
        let session = SessionClient::open(config.api.clone(), Arc::new(CliRedirect))?;
        debug!(
            api = %config.api.base_url,
            credentials = ?config.api.credentials_file,
            "Session client ready"
        );

        Ok(Self {
            config,
            session,
            output: OutputManager::new(colored),
        })
    }

    pub async fn login(&self, email: &str, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(password) => password,
            None => read_password()?,
        };

        let identity = self.session.login(email, &password).await?;
        println!("Signed in as {email} ({})", identity.role);
        Ok(())
    }

    pub fn logout(&self) {
        self.session.logout();
        println!("Signed out");
    }

    pub fn status(&self, format: OutputFormat) -> Result<()> {
        let out = self.output.format_status(
            self.session.is_authenticated(),
            self.session.identity().as_ref(),
            &self.config.api.base_url,
            format,
        )?;
        println!("{out}");
        Ok(())
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        data: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let client = self.session.client();
        let mut request = client.request(method.as_method(), path)?;

        if let Some(data) = data {
            let body = read_body(data)?;
            request = request.with_json(&body)?;
        }

        let response = client.execute(request).await?;
        println!("{}", self.output.format_response(&response, format)?);

        if !response.is_success() {
            return Err(AppError::InvalidInput(format!(
                "{} {path} returned {}",
                method.as_method(),
                response.status
            )));
        }
        Ok(())
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(AppError::InvalidInput("password must not be empty".to_string()));
    }
    Ok(password)
}

/// Parse `--data`, reading stdin when it is `-`.
fn read_body(data: &str) -> Result<Value> {
    let raw = if data == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        data.to_string()
    };
    Ok(serde_json::from_str(&raw)?)
}
