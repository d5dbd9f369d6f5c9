//! Error handling and display for the CLI.

use colored::Colorize;
use smartbed_reconcile::ConsoleError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Not authenticated. Run `bedctl auth login` to authenticate.")]
    NotAuthenticated,

    #[error("Your role ({role}) cannot {action}")]
    NotPermitted { role: String, action: &'static str },

    #[error("{failed} of {attempted} assignments failed")]
    PartialCommit { failed: usize, attempted: usize },
}

/// Hint printed under an error, if one applies.
fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::NotAuthenticated => Some("Run `bedctl auth login` to authenticate."),
            CliError::NotPermitted { .. } => Some("Ask a manager or admin to run this."),
            CliError::PartialCommit { .. } => {
                Some("Successful placements stand. Run `bedctl allocate plan` to see what is still open.")
            }
        };
    }

    match err.downcast_ref::<ConsoleError>()? {
        ConsoleError::Auth(_) | ConsoleError::NoSession => {
            Some("Your session has ended and the stored credential was cleared. Run `bedctl auth login`.")
        }
        ConsoleError::Rejected { status: 403, .. } => {
            Some("You may not have permission for this operation.")
        }
        ConsoleError::Network(_) => Some("Check your network connection and API endpoint."),
        ConsoleError::Decode { .. } => Some("The server response was not understood. Is the API URL correct?"),
        _ => None,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}
