use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Input;
use std::path::PathBuf;

use crate::clone::gate::{ConfirmationPrompt, TerminalPrompt};
use crate::clone::inventory::{Inventory, SystemProbe, human_size};
use crate::clone::logging::RunLog;
use crate::clone::{CloneError, CloneSession, CommandExecutor, RunResult, status};
use crate::config::Config;
use crate::menu::{MenuChoice, parse_choice, render_menu};
use crate::ui::prelude::*;

/// Clone the running Ubuntu system onto a new disk
#[derive(Parser, Debug)]
#[command(name = "diskclone", author, version, about, long_about = None)]
pub struct Cli {
    /// Show every external command and its output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Print destructive commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (default: /etc/diskclone/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run log location, overriding the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone the running system onto TARGET
    Clone {
        /// Whole destination disk, e.g. /dev/sdb
        #[arg(short, long)]
        target: String,
        /// Size of the new root partition in GiB (at least 16)
        #[arg(short, long, value_name = "GIB")]
        root_size: String,
    },
    /// List disks, partitions and mounted filesystems
    Status,
    /// Check for a newer release and install it
    Update,
}

pub fn ensure_root() -> Result<()> {
    if let sudo::RunningAs::User = sudo::check() {
        sudo::with_env(&["RUST_BACKTRACE", "DISKCLONE_"])
            .map_err(|e| anyhow::anyhow!("Failed to escalate privileges: {}", e))?;
    }
    Ok(())
}

/// Shared state for one invocation.
pub struct App {
    pub config: Config,
    pub dry_run: bool,
}

impl App {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(log_file) = &cli.log_file {
            config.log_file = log_file.clone();
        }
        Ok(Self {
            config,
            dry_run: cli.dry_run,
        })
    }

    fn clone_with_prompt(&self, target: &str, root_size: &str) -> Result<RunResult, CloneError> {
        let probe = SystemProbe::default();
        let prompt = TerminalPrompt;
        let executor = CommandExecutor::new(self.dry_run);
        let session = CloneSession {
            probe: &probe,
            prompt: &prompt,
            executor: &executor,
            config: &self.config,
        };
        tokio::task::block_in_place(|| session.run(target, root_size))
    }

    /// `diskclone clone`: one run, exit code from its result.
    pub fn run_clone(&self, target: &str, root_size: &str) -> i32 {
        match self.clone_with_prompt(target, root_size) {
            Ok(result) => {
                result.report();
                result.exit_code()
            }
            Err(err) => {
                report_validation_error(&err);
                1
            }
        }
    }

    pub fn show_status(&self) -> Result<()> {
        let probe = SystemProbe::default();
        status::show_status(&Inventory::new(&probe)).context("Failed to read disk status")
    }

    pub async fn update(&self) -> Result<()> {
        crate::self_update::self_update(&self.config).await
    }

    /// Menu loop. Returns the process exit code.
    pub async fn run_menu(&self) -> Result<i32> {
        loop {
            println!();
            print!("{}", render_menu().bold());

            let answer = match Input::<String>::new()
                .with_prompt("Select an option")
                .allow_empty(true)
                .interact_text()
            {
                Ok(answer) => answer,
                // stdin closed
                Err(_) => return Ok(0),
            };

            let Some(choice) = parse_choice(&answer) else {
                emit(
                    Level::Error,
                    "menu.invalid",
                    &format!(
                        "{} Invalid choice '{}'; enter a number from 1 to {}",
                        char::from(NerdFont::CrossCircle),
                        answer.trim(),
                        MenuChoice::ALL.len()
                    ),
                    None,
                );
                continue;
            };

            match choice {
                MenuChoice::RunClone => {
                    if let Some(code) = self.interactive_clone(&TerminalPrompt) {
                        return Ok(code);
                    }
                }
                MenuChoice::ShowStatus => {
                    if let Err(err) = self.show_status() {
                        emit(Level::Error, "status.failed", &format!("{err:#}"), None);
                    }
                }
                MenuChoice::Update => {
                    if let Err(err) = self.update().await {
                        emit(Level::Error, "self_update.failed", &format!("{err:#}"), None);
                    }
                }
                MenuChoice::Exit => return Ok(0),
            }
        }
    }

    /// Ask for target and size, then run. `Some(code)` ends the program.
    ///
    /// A prompt that cannot be answered (closed terminal) goes back to the menu.
    fn interactive_clone(&self, input: &dyn ConfirmationPrompt) -> Option<i32> {
        let probe = SystemProbe::default();
        let inventory = Inventory::new(&probe);
        match inventory.list_disks() {
            Ok(disks) => {
                emit(
                    Level::Info,
                    "menu.disks",
                    &format!("{} Available disks:", char::from(NerdFont::List)),
                    None,
                );
                for disk in disks {
                    println!(
                        "   {:<16} {:>10}  {}",
                        disk.path,
                        human_size(disk.size_bytes),
                        disk.model.unwrap_or_default()
                    );
                }
            }
            Err(err) => emit(Level::Warn, "menu.disks", &err.to_string(), None),
        }

        let answers = input
            .read_confirmation("Destination disk (e.g. /dev/sdb)")
            .and_then(|target| {
                input
                    .read_confirmation("Root partition size in GiB")
                    .map(|size| (target, size))
            });
        let (target, root_size) = match answers {
            Ok(answers) => answers,
            Err(err) => {
                report_validation_error(&err);
                return None;
            }
        };

        match self.clone_with_prompt(target.trim(), &root_size) {
            Ok(result) => {
                result.report();
                match result {
                    RunResult::Failed { .. } => Some(result.exit_code()),
                    _ => None,
                }
            }
            Err(err) => {
                report_validation_error(&err);
                None
            }
        }
    }
}

fn report_validation_error(err: &CloneError) {
    emit(
        Level::Error,
        "clone.invalid",
        &format!("{} {}", char::from(NerdFont::CrossCircle), err),
        None,
    );
}

/// Entry point behind `main`. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    crate::ui::set_debug_mode(cli.debug);
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    if cli.no_color {
        colored::control::set_override(false);
    }
    crate::ui::init(format, !cli.no_color);

    let app = App::from_cli(&cli)?;

    let needs_root = !matches!(cli.command, Some(Commands::Status) | Some(Commands::Update));
    if needs_root && !app.dry_run {
        ensure_root()?;
    }

    crate::clone::interrupt::spawn_listener().context("Failed to install signal handlers")?;
    let _log = RunLog::open_or_warn(&app.config.log_file);

    match &cli.command {
        Some(Commands::Clone { target, root_size }) => Ok(app.run_clone(target, root_size)),
        Some(Commands::Status) => {
            app.show_status()?;
            Ok(0)
        }
        Some(Commands::Update) => {
            app.update().await?;
            Ok(0)
        }
        None => app.run_menu().await,
    }
}
