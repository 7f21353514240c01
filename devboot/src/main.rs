//! Local development environment bootstrapper.
//!
//! Locates the environment from the working directory (nearest compose file),
//! loads `.devboot/config.toml`, and runs one lifecycle operation with live
//! progress.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devboot::error::EngineError;
use devboot::exit_codes;
use devboot::installation::Installation;
use devboot::io::config::{DevbootConfig, config_path, load_config, write_config};
use devboot::io::environment::Environment;
use devboot::io::prerequisites::{check_prerequisites, missing_mandatory};
use devboot::io::process::ProcessResult;
use devboot::io::progress::ProgressDisplay;
use devboot::io::sync::CliSyncDaemon;
use devboot::logging;

#[derive(Parser)]
#[command(
    name = "devboot",
    version,
    about = "Bootstrap a containerized local development environment"
)]
struct Cli {
    /// Do not draw progress bars.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.devboot/config.toml` with default commands.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Start the containers, then bring up the sync session.
    Start {
        /// Also create volumes (first start after install).
        #[arg(long)]
        volumes: bool,
        /// Skip the sync session.
        #[arg(long)]
        no_sync: bool,
    },
    /// Build the container images.
    Build,
    /// Stop the containers.
    Stop,
    /// Import a dump (`.sql`, `.gz`, `.gzip`, `.zip`) into a database.
    Import { database: String, file: PathBuf },
    /// Create or resume the file-synchronization session.
    Sync,
    /// Run a command in a container, or through the compose tool.
    Exec {
        /// Command line to run.
        content: String,
        /// Container (service) name; omit to address the compose tool.
        container: Option<String>,
    },
    /// Check that the required binaries are installed.
    Doctor {
        /// Print the checks as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            print_partial_output(&err);
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let display = if cli.quiet {
        ProgressDisplay::Hidden
    } else {
        ProgressDisplay::Terminal
    };
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Start { volumes, no_sync } => cmd_start(display, volumes, no_sync),
        Command::Build => cmd_build(display),
        Command::Stop => cmd_stop(display),
        Command::Import { database, file } => cmd_import(display, &database, file),
        Command::Sync => cmd_sync(display),
        Command::Exec { content, container } => cmd_exec(&content, container.as_deref()),
        Command::Doctor { json } => cmd_doctor(json),
    }
}

struct Workspace {
    env: Environment,
    config: DevbootConfig,
}

impl Workspace {
    fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("resolve current directory")?;
        let env = Environment::locate(&cwd)?;
        let config = load_config(&config_path(env.root()))?;
        Ok(Self { env, config })
    }

    fn installation(&self, display: ProgressDisplay) -> Installation<'_, CliSyncDaemon> {
        let sync = CliSyncDaemon::new(self.config.sync.clone(), self.env.root());
        Installation::new(&self.env, &self.config, sync).with_display(display)
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let env = Environment::locate(&cwd)?;
    let path = config_path(env.root());
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &DevbootConfig::default())?;
    println!("Wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_start(display: ProgressDisplay, volumes: bool, no_sync: bool) -> Result<i32> {
    let workspace = Workspace::load()?;
    let installation = workspace.installation(display);
    let result = installation
        .start_environment(volumes)
        .context("start environment")?;
    if !result.success {
        return Ok(report_failure("Environment couldn't be started", &result));
    }
    if !no_sync {
        installation
            .start_sync_session()
            .context("start sync session")?;
    }
    println!("Environment started.");
    Ok(exit_codes::OK)
}

const BUILD_FAILURE_HINTS: [&str; 2] = [
    "Make sure the image sources the environment references (branches, tags, packages) still exist.",
    "A package missing from a Dockerfile after a version upgrade can also break the build.",
];

fn cmd_build(display: ProgressDisplay) -> Result<i32> {
    let workspace = Workspace::load()?;
    let result = workspace
        .installation(display)
        .build_environment()
        .context("build environment")?;
    if !result.success {
        let code = report_failure("Containers couldn't be built", &result);
        eprintln!();
        for hint in BUILD_FAILURE_HINTS {
            eprintln!(" ! {hint}");
        }
        return Ok(code);
    }
    println!("Containers have been built.");
    Ok(exit_codes::OK)
}

fn cmd_stop(display: ProgressDisplay) -> Result<i32> {
    let workspace = Workspace::load()?;
    let result = workspace
        .installation(display)
        .stop_environment()
        .context("stop environment")?;
    if !result.success {
        return Ok(report_failure("Environment couldn't be stopped", &result));
    }
    println!("Environment stopped.");
    Ok(exit_codes::OK)
}

fn cmd_import(display: ProgressDisplay, database: &str, file: PathBuf) -> Result<i32> {
    let file = std::path::absolute(&file)
        .with_context(|| format!("resolve {}", file.display()))?;
    let workspace = Workspace::load()?;
    let result = workspace
        .installation(display)
        .import_database(database, &file)
        .with_context(|| format!("import {} into {database}", file.display()))?;
    if !result.success {
        return Ok(report_failure("Database couldn't be imported", &result));
    }
    println!("Database {database} imported.");
    Ok(exit_codes::OK)
}

fn cmd_sync(display: ProgressDisplay) -> Result<i32> {
    let workspace = Workspace::load()?;
    workspace
        .installation(display)
        .start_sync_session()
        .context("start sync session")?;
    println!("Sync session is active.");
    Ok(exit_codes::OK)
}

fn cmd_exec(content: &str, container: Option<&str>) -> Result<i32> {
    let workspace = Workspace::load()?;
    let result = workspace
        .installation(ProgressDisplay::Hidden)
        .exec_command(content, container)
        .context("execute command")?;
    if result.success {
        print!("{}", result.stdout);
        Ok(exit_codes::OK)
    } else {
        eprint!("{}", result.stderr);
        Ok(exit_codes::FAILED)
    }
}

fn cmd_doctor(json: bool) -> Result<i32> {
    let checks = check_prerequisites();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&checks).context("serialize checks")?
        );
    } else {
        for check in &checks {
            let mark = if check.installed { "ok" } else { "missing" };
            let kind = if check.mandatory { "required" } else { "optional" };
            print!("{:<20} {:<8} {kind}", check.name, mark);
            if let Some(comment) = check.comment {
                print!("  {comment}");
            }
            println!();
        }
    }
    if missing_mandatory(&checks).is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILED)
    }
}

fn report_failure(message: &str, result: &ProcessResult) -> i32 {
    eprintln!();
    eprintln!("{message} (exit code {:?}):", result.exit_code);
    eprintln!("{}", result.stderr.trim_end());
    exit_codes::FAILED
}

fn print_partial_output(err: &anyhow::Error) {
    if let Some(EngineError::Timeout { stdout, stderr, .. }) = err.downcast_ref::<EngineError>() {
        for (label, text) in [("stdout", stdout), ("stderr", stderr)] {
            if !text.trim().is_empty() {
                eprintln!("--- captured {label} ---\n{}", text.trim_end());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_flags() {
        let cli = Cli::parse_from(["devboot", "start", "--volumes", "--no-sync"]);
        assert!(matches!(
            cli.command,
            Command::Start {
                volumes: true,
                no_sync: true
            }
        ));
    }

    #[test]
    fn parse_import_arguments() {
        let cli = Cli::parse_from(["devboot", "-q", "import", "shop", "dump.sql.gz"]);
        assert!(cli.quiet);
        match cli.command {
            Command::Import { database, file } => {
                assert_eq!(database, "shop");
                assert_eq!(file, PathBuf::from("dump.sql.gz"));
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn parse_exec_with_optional_container() {
        let cli = Cli::parse_from(["devboot", "exec", "bin/magento cache:flush", "php"]);
        match cli.command {
            Command::Exec { content, container } => {
                assert_eq!(content, "bin/magento cache:flush");
                assert_eq!(container.as_deref(), Some("php"));
            }
            _ => panic!("expected exec"),
        }
        let cli = Cli::parse_from(["devboot", "exec", "ps"]);
        assert!(matches!(cli.command, Command::Exec { container: None, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["devboot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }
}
