// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! leavedesk CLI - drive the session lifecycle from a terminal.
//!
//! A thin front-end over the library: sign in or register, inspect the
//! current session, renew the credential, or run the expiry monitor in the
//! foreground. Session state persists under `~/.leavedesk`, so consecutive
//! invocations see the same signed-in identity.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use leavedesk::{
    AuthConfig, ExpiryMonitor, Role, SessionManager, SessionState, TokenCodec,
};

#[derive(Parser)]
#[command(name = "leavedesk", version, about = "Vacation & sick-leave workflow - session tools")]
struct Cli {
    /// Override the data directory (default: ~/.leavedesk)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an existing account
    ///
    /// Examples:
    ///   leavedesk login john@example.com
    ///   leavedesk login jane@example.com --role manager
    Login {
        email: String,
        /// Account role to sign in as
        #[arg(short, long, default_value = "employee")]
        role: Role,
    },

    /// Create an account and sign in
    Register {
        name: String,
        email: String,
        #[arg(short, long, default_value = "employee")]
        role: Role,
    },

    /// Sign out and clear the persisted session
    Logout,

    /// Show the current session
    #[command(alias = "s")]
    Status,

    /// Renew the current credential now
    Refresh,

    /// Run the expiry monitor in the foreground until Ctrl+C
    Watch {
        /// Seconds between expiry checks
        #[arg(long, default_value_t = 1800)]
        poll_secs: u64,
        /// Renew once remaining lifetime drops below this many seconds
        #[arg(long, default_value_t = 3600)]
        threshold_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let mut config = AuthConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config = config.with_data_dir(dir);
    }

    let manager = Arc::new(SessionManager::new(config).context("failed to initialize session manager")?);
    manager.restore();

    match cli.command {
        Commands::Login { email, role } => {
            let secret = prompt_password()?;
            let user = manager.login(&email, &secret, role)?;
            println!("{} Signed in as {} ({})", "[OK]".green(), user.name.bold(), user.role);
            print_expiry(&manager);
        }

        Commands::Register { name, email, role } => {
            let secret = prompt_password()?;
            let user = manager.register(&name, &email, &secret, role)?;
            println!("{} Account created for {} ({})", "[OK]".green(), user.name.bold(), user.role);
            print_expiry(&manager);
        }

        Commands::Logout => {
            manager.logout();
            println!("{} Signed out", "[OK]".green());
        }

        Commands::Status => {
            print_status(&manager);
        }

        Commands::Refresh => {
            if manager.refresh() {
                println!("{} Credential renewed", "[OK]".green());
                print_expiry(&manager);
            } else {
                println!("{} Nothing to renew - sign in first", "[!]".yellow());
            }
        }

        Commands::Watch { poll_secs, threshold_secs } => {
            if manager.state() != SessionState::Authenticated {
                println!("{} Not signed in - nothing to watch", "[!]".yellow());
                return Ok(());
            }
            println!(
                "Watching session (poll {}s, renew under {}s). Ctrl+C to stop.",
                poll_secs, threshold_secs
            );
            let monitor = ExpiryMonitor::spawn_with(
                manager.clone(),
                Duration::from_secs(poll_secs),
                Duration::from_secs(threshold_secs),
            );

            let mut authed = manager.subscribe();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("\n{} Stopping watch", "[OK]".green());
                }
                _ = async {
                    // End the watch if the monitor forces a logout.
                    while *authed.borrow_and_update() {
                        if authed.changed().await.is_err() {
                            break;
                        }
                    }
                } => {
                    println!("{} Session ended - signed out", "[!]".yellow());
                }
            }
            monitor.shutdown();
        }
    }

    Ok(())
}

fn prompt_password() -> Result<String> {
    inquire::Password::new("Password:")
        .without_confirmation()
        .prompt()
        .context("failed to read password")
}

fn print_status(manager: &SessionManager) {
    match manager.current_user() {
        Some(user) => {
            println!("State:  {}", manager.state().to_string().green());
            println!("User:   {} <{}>", user.name.bold(), user.email);
            println!("Role:   {}", user.role);
            print_expiry(manager);
        }
        None => {
            println!("State:  {}", manager.state().to_string().yellow());
            println!("Sign in with: {}", "leavedesk login <email>".cyan());
        }
    }
}

fn print_expiry(manager: &SessionManager) {
    if let Some(token) = manager.current_token() {
        if let Some(when) = TokenCodec::expiration_time(&token) {
            println!("Expires: {}", when.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
}
