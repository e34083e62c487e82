//! Binary entry point for opendir.
//!
//! Looks up users and groups and checks group membership from the command
//! line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use opendir::config::OpendirConfig;
use opendir::observability::{self, LoggingConfig};
use opendir::{
    Authorizer, DirectoryHandle, Group, Model, Query, Requirement, UnitOfWork, User,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// opendir - query a directory service and check group membership.
#[derive(Parser)]
#[command(name = "opendir")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "OPENDIR_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List all users.
    Users,

    /// List all groups.
    Groups,

    /// Show one user.
    User {
        /// Username to look up.
        username: String,
    },

    /// Show one group.
    Group {
        /// Group name to look up.
        name: String,
    },

    /// Check a user's group membership.
    Check {
        /// Username to check.
        #[arg(short, long)]
        user: String,

        /// Group names.
        #[arg(required = true)]
        groups: Vec<String>,

        /// How the groups combine.
        #[arg(short, long, value_enum, default_value_t = Mode::One)]
        mode: Mode,
    },

    /// Show the effective configuration.
    Config,
}

/// Membership mode for `check`.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Member of the single given group.
    One,
    /// Member of at least one group.
    Any,
    /// Member of every group.
    All,
}

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(LoggingConfig::from_settings(&config.logging, cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration: file (explicit or default location), then environment.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<OpendirConfig> {
    let mut config = match path {
        Some(path) => OpendirConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => OpendirConfig::load_default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Runs the selected command. Returns `false` when the command ran but the
/// answer is negative (not found, not a member).
fn run_command(cli: Cli, config: OpendirConfig) -> anyhow::Result<bool> {
    if let Commands::Config = cli.command {
        cmd_config(&config, cli.json)?;
        return Ok(true);
    }

    let directory = DirectoryHandle::new(config.directory);
    let scope = UnitOfWork::new();
    let _entered = scope.span().entered();

    let outcome = match cli.command {
        Commands::Users => cmd_list::<User>(&directory, &scope, cli.json),
        Commands::Groups => cmd_list::<Group>(&directory, &scope, cli.json),
        Commands::User { username } => {
            cmd_show::<User>(&directory, &scope, "username", &username, cli.json)
        },
        Commands::Group { name } => {
            cmd_show::<Group>(&directory, &scope, "group_name", &name, cli.json)
        },
        Commands::Check { user, groups, mode } => {
            cmd_check(&directory, &scope, &user, groups, mode, cli.json)
        },
        Commands::Config => Ok(true),
    };

    scope.finish().context("closing directory connections")?;
    outcome
}

fn query<M: Model>(directory: &DirectoryHandle, scope: &UnitOfWork) -> anyhow::Result<Query<M>> {
    Ok(Query::new()
        .directory(directory.clone())
        .scope(scope.clone())
        .model::<M>()?)
}

/// Lists every entry of a model.
fn cmd_list<M: Model>(
    directory: &DirectoryHandle,
    scope: &UnitOfWork,
    json: bool,
) -> anyhow::Result<bool> {
    let items = query::<M>(directory, scope)?.all()?;
    if json {
        let values: Vec<_> = items.iter().map(model_json).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for item in &items {
            println!("{}", item.render());
        }
        println!("{} {}", items.len(), M::query_location());
    }
    Ok(true)
}

/// Shows the first entry whose `field` equals `value`.
fn cmd_show<M: Model>(
    directory: &DirectoryHandle,
    scope: &UnitOfWork,
    field: &str,
    value: &str,
    json: bool,
) -> anyhow::Result<bool> {
    let found = query::<M>(directory, scope)?
        .filter_by([(field, value)])
        .first()?;
    let Some(item) = found else {
        eprintln!("No {} with {field} '{value}'", M::SCHEMA.name());
        return Ok(false);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&model_json(&item))?);
    } else {
        println!("{}", item.render());
    }
    Ok(true)
}

/// Checks membership and reports the decision.
fn cmd_check(
    directory: &DirectoryHandle,
    scope: &UnitOfWork,
    user: &str,
    groups: Vec<String>,
    mode: Mode,
    json: bool,
) -> anyhow::Result<bool> {
    let requirement = match mode {
        Mode::One => {
            let [group] = groups.as_slice() else {
                bail!("--mode one takes exactly one group, got {}", groups.len());
            };
            Requirement::group(group.clone())
        },
        Mode::Any => Requirement::AnyGroup(groups),
        Mode::All => Requirement::AllGroups(groups),
    };

    let authorizer: Authorizer = Authorizer::new(directory.clone());
    let allowed = authorizer.satisfies(scope, user, &requirement);
    if json {
        let report = serde_json::json!({
            "user": user,
            "requirement": requirement.to_string(),
            "allowed": allowed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if allowed {
        println!("{user}: allowed ({requirement})");
    } else {
        println!("{user}: denied ({requirement})");
    }
    Ok(allowed)
}

/// Shows the effective configuration.
fn cmd_config(config: &OpendirConfig, json: bool) -> anyhow::Result<()> {
    let directory = DirectoryHandle::new(config.directory.clone());
    let settings = &config.directory;
    let password = if settings.bind_password.is_some() {
        "(set)"
    } else {
        "(none)"
    };
    let timeout = settings
        .connect_timeout
        .map_or_else(|| "(none)".to_string(), |t| format!("{}s", t.as_secs()));

    if json {
        let report = serde_json::json!({
            "server": settings.server,
            "url": settings.url(),
            "base_dn": directory.base_location(),
            "use_tls": settings.use_tls,
            "bind_dn": settings.bind_dn,
            "bind_password": password,
            "connect_timeout": timeout,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("Server: {}", settings.server);
    println!("URL: {}", settings.url());
    println!("Base DN: {}", directory.base_location());
    println!("TLS: {}", settings.use_tls);
    println!(
        "Bind DN: {}",
        settings.bind_dn.as_deref().unwrap_or("(anonymous)")
    );
    println!("Bind Password: {password}");
    println!("Connect Timeout: {timeout}");
    Ok(())
}

/// Field name → resolved value.
fn model_json<M: Model>(item: &M) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = M::SCHEMA
        .fields()
        .iter()
        .map(|field| {
            let value = item
                .get(field.name())
                .map_or(serde_json::Value::Null, |v| {
                    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
                });
            (field.name().to_string(), value)
        })
        .collect();
    serde_json::Value::Object(fields)
}
