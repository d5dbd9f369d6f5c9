//! Authentication commands.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use smartbed_reconcile::{Backend, HttpBackend, Role, SessionContext};

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Authentication commands.
#[derive(Debug, Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Log in with a username and password.
    Login(LoginArgs),

    /// Log out and clear the stored credential.
    Logout,

    /// Show the stored session without contacting the backend.
    Status,

    /// Check the stored credential against the backend.
    Whoami,
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// Username (usually an email address).
    #[arg(long, env = "BEDCTL_USERNAME")]
    username: String,

    /// Password. Read from stdin when omitted.
    #[arg(long, env = "BEDCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionView<'a> {
    api_url: &'a str,
    name: &'a str,
    role: Role,
    email: Option<&'a str>,
    landing: &'static str,
}

impl<'a> SessionView<'a> {
    fn new(api_url: &'a str, session: &'a SessionContext) -> Self {
        let profile = session.profile();
        Self {
            api_url,
            name: &profile.name,
            role: profile.role,
            email: profile.email.as_deref(),
            landing: if profile.role.prefers_triage() {
                "queue"
            } else {
                "dashboard"
            },
        }
    }
}

impl AuthCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AuthSubcommand::Login(args) => login(ctx, args).await,
            AuthSubcommand::Logout => logout(ctx).await,
            AuthSubcommand::Status => status(ctx).await,
            AuthSubcommand::Whoami => whoami(ctx).await,
        }
    }
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Log in and persist the session.
async fn login(ctx: CommandContext, args: LoginArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt_password()?,
    };

    let response = HttpBackend::login(ctx.config.api_url(), &args.username, &password).await?;
    let email = args.username.contains('@').then(|| args.username.clone());
    let session = SessionContext::establish(response, email, ctx.store())?;

    if ctx.api_url_flag {
        ctx.config.save()?;
    }

    let profile = session.profile();
    match ctx.format {
        OutputFormat::Json => print_single(&SessionView::new(ctx.config.api_url(), &session)),
        OutputFormat::Table => {
            print_success(&format!("Logged in as {} ({}).", profile.name, profile.role));
            if profile.role.prefers_triage() {
                print_info("Start with `bedctl queue`.");
            } else {
                print_info("Start with `bedctl dashboard kpis`.");
            }
        }
    }
    Ok(())
}

/// Log out and clear the stored credential.
async fn logout(ctx: CommandContext) -> Result<()> {
    match ctx.restore_session()? {
        Some(session) => session.logout()?,
        None => ctx.store().clear()?,
    }
    print_success("Logged out.");
    Ok(())
}

/// Show the stored session.
async fn status(ctx: CommandContext) -> Result<()> {
    let Some(session) = ctx.restore_session()? else {
        println!("{} Not authenticated", "Status:".red().bold());
        println!("\nRun {} to log in.", "bedctl auth login".cyan());
        return Ok(());
    };

    let view = SessionView::new(ctx.config.api_url(), &session);
    match ctx.format {
        OutputFormat::Json => print_single(&view),
        OutputFormat::Table => {
            println!("{} Authenticated", "Status:".green().bold());
            println!("  Name: {}", view.name);
            println!("  Role: {}", view.role);
            if let Some(email) = view.email {
                println!("  Email: {}", email);
            }
            println!("  API: {}", view.api_url);
            println!("  Credential: {}", ctx.store.path().display());
        }
    }
    Ok(())
}

/// Verify the credential with a cheap authenticated read. A rejection
/// expires the session and clears the stored credential.
async fn whoami(ctx: CommandContext) -> Result<()> {
    let (session, backend) = ctx.backend()?;
    backend.kpis().await?;

    match ctx.format {
        OutputFormat::Json => print_single(&SessionView::new(ctx.config.api_url(), &session)),
        OutputFormat::Table => {
            let profile = session.profile();
            println!("{} ({})", profile.name, profile.role);
        }
    }
    Ok(())
}
