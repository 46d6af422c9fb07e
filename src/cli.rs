//! Command-line argument parsing for the mailpilot binary.

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Sign in and store the credential
    Login { email: String },
    /// Forget the stored credential
    Logout,
    /// Issue an authenticated GET and print the body
    Get { path: String },
    /// Stream live events to stdout (default)
    Watch,
    /// Unrecognised usage
    Usage(String),
}

/// Parse command-line arguments (program name first).
///
/// # Examples
///
/// ```
/// use mailpilot::cli::{parse_args, CliCommand};
///
/// let args = vec!["mailpilot".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let args: Vec<String> = args.skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        return CliCommand::Version;
    }

    match args.first().map(String::as_str) {
        None | Some("watch") => CliCommand::Watch,
        Some("logout") => CliCommand::Logout,
        Some("login") => match args.get(1) {
            Some(email) => CliCommand::Login {
                email: email.clone(),
            },
            None => CliCommand::Usage("login requires an email address".to_string()),
        },
        Some("get") => match args.get(1) {
            Some(path) if path.starts_with('/') => CliCommand::Get { path: path.clone() },
            Some(path) => CliCommand::Get {
                path: format!("/{}", path),
            },
            None => CliCommand::Usage("get requires a path".to_string()),
        },
        Some(other) => CliCommand::Usage(format!("unknown command: {}", other)),
    }
}

pub const USAGE: &str = "usage: mailpilot [watch | login <email> | logout | get <path> | --version]";
