//! Command-line sign-in demo
//!
//! 1. Restore a cached session, if any
//! 2. Otherwise open the browser on the authorization URL
//! 3. Paste the redirected URL back into the terminal
//! 4. Print the user, organization, permissions and a few flags
//!
//! Run with:
//!   cargo run -p login-demo -- \
//!     --issuer https://my-business.kinde.com \
//!     --client-id my-client-id \
//!     --jwks jwks.json \
//!     login

use anyhow::Context;
use clap::{Parser, Subcommand};
use oidc_auth_session::{
    AuthRequestOptions, AuthSession, BrowserUserAgent, FileStorage, HttpTokenEndpoint,
    JwtKeyVerifier, SessionConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Sign in to an OIDC provider from the terminal
#[derive(Parser, Debug)]
#[command(name = "login-demo")]
struct Args {
    /// Issuer URL of the provider
    #[arg(long, env = "OIDC_ISSUER")]
    issuer: String,

    /// OAuth client ID
    #[arg(long, env = "OIDC_CLIENT_ID")]
    client_id: String,

    /// Redirect URI registered for the client
    #[arg(long, default_value = "http://localhost:8080/callback")]
    redirect_uri: String,

    /// Audience to request, if the provider needs one
    #[arg(long)]
    audience: Option<String>,

    /// Provider JWKS document used to verify ID tokens
    #[arg(long, default_value = "jwks.json")]
    jwks: PathBuf,

    /// Print the URL instead of opening a browser
    #[arg(long)]
    no_browser: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in (default)
    Login {
        /// Sign in to this organization
        #[arg(long)]
        org_code: Option<String>,
    },
    /// Open the sign-up screen
    Register,
    /// Show the cached session
    Status,
    /// Print a fresh access token
    Token,
    /// Revoke and forget the cached session
    Logout,
}

fn print_session(session: &AuthSession) {
    let Some(user) = session.get_user_details() else {
        println!("Not signed in");
        return;
    };

    println!("User:          {}", user.id);
    if let Some(name) = user.display_name() {
        println!("Name:          {name}");
    }
    if let Some(email) = &user.email {
        println!("Email:         {email}");
    }
    if let Some(org) = session.get_organization() {
        println!("Organization:  {}", org.code);
    }
    if let Some(orgs) = session.get_user_organizations() {
        let codes: Vec<_> = orgs.org_codes.iter().map(|o| o.code.as_str()).collect();
        println!("Member of:     {}", codes.join(", "));
    }
    if let Some(permissions) = session.get_permissions() {
        println!("Permissions:   {}", permissions.permissions.join(", "));
    }

    match session.get_string_flag("theme", Some("light")) {
        Ok(theme) => println!("Flag theme:    {theme}"),
        Err(e) => println!("Flag theme:    {e}"),
    }
    match session.get_boolean_flag("is_dark_mode", Some(false)) {
        Ok(dark) => println!("Flag dark:     {dark}"),
        Err(e) => println!("Flag dark:     {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_auth_session=info".into()),
        )
        .init();

    let args = Args::parse();

    let builder = SessionConfig::builder()
        .issuer(args.issuer.as_str())
        .client_id(args.client_id.as_str())
        .redirect_uri(args.redirect_uri.as_str())
        .post_logout_redirect_uri(args.redirect_uri.as_str());
    let config = match &args.audience {
        Some(audience) => builder.audience(audience.as_str()).build(),
        None => builder.build(),
    };

    let jwks = std::fs::read_to_string(&args.jwks)
        .with_context(|| format!("reading JWKS from {}", args.jwks.display()))?;
    let session = AuthSession::new(
        config,
        Arc::new(HttpTokenEndpoint::new()),
        Arc::new(FileStorage::new()),
        Arc::new(JwtKeyVerifier::from_jwks(&jwks)?),
    )?;
    let agent = BrowserUserAgent::new().auto_open_browser(!args.no_browser);

    match args.command.unwrap_or(Command::Login { org_code: None }) {
        Command::Login { org_code } => {
            if session.is_authorized() {
                println!("Already signed in");
            } else {
                let options = AuthRequestOptions {
                    org_code,
                    ..AuthRequestOptions::default()
                };
                session.login_with(&agent, &options).await?;
                println!("Signed in");
            }
            println!();
            print_session(&session);
        }
        Command::Register => {
            session.register(&agent).await?;
            println!("Registered");
            println!();
            print_session(&session);
        }
        Command::Status => print_session(&session),
        Command::Token => {
            let token = session.access_token().await?;
            println!("{token}");
        }
        Command::Logout => {
            let logout_url = session.logout_url()?;
            if session.logout().await {
                println!("Signed out locally");
                println!("End the provider session at: {logout_url}");
            }
        }
    }

    Ok(())
}
