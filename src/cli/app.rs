//! Main CLI application

use crate::config::{
    build_registry, load_env_file, parse_config_auto, parse_config_file, Config,
};
use crate::error::{ConfigError, RmakeError, EXIT_CONFIG, EXIT_SUCCESS};
use crate::runner::{
    ActionExecutor, Dispatcher, FileStateStore, ProcessExecutor, Registry, RunOptions,
    StalenessOracle, Verbosity,
};
use crate::ui::Console;
use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Parsed configuration
    config: Config,
    /// Targets built from the configuration
    registry: Arc<Registry>,
    /// Config file path
    config_path: PathBuf,
}

impl App {
    /// Create a new app from the discovered configuration file
    pub fn new() -> Result<Self, RmakeError> {
        let (config, config_path) = parse_config_auto()?;
        Self::from_config(config, config_path)
    }

    /// Create app with a specific config file
    pub fn with_config_file(path: PathBuf) -> Result<Self, RmakeError> {
        let config = parse_config_file(&path)?;
        Self::from_config(config, path)
    }

    fn from_config(config: Config, config_path: PathBuf) -> Result<Self, RmakeError> {
        let registry = build_registry(&config)?;
        let command = build_command(&config, &registry);

        Ok(App {
            command,
            config,
            registry: Arc::new(registry),
            config_path,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Directory the config file lives in; actions run and outputs resolve here
    pub fn project_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Run the application with the process arguments
    pub async fn run(self) -> anyhow::Result<i32> {
        self.run_from(env::args_os()).await
    }

    /// Run the application with explicit arguments, returning the exit code
    pub async fn run_from<I, T>(mut self, args: I) -> anyhow::Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.command.clone().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) => {
                e.print()?;
                return Ok(if e.use_stderr() { EXIT_CONFIG } else { EXIT_SUCCESS });
            }
        };

        if let Some(shell) = matches.get_one::<Shell>("completions").copied() {
            let name = self.command.get_name().to_string();
            clap_complete::generate(shell, &mut self.command, name, &mut io::stdout());
            return Ok(EXIT_SUCCESS);
        }

        // Options may follow a declared target; unknown names are external subcommands
        let (target, option_matches) = match matches.subcommand() {
            Some((name, sub_matches)) if self.has_subcommand(name) => (Some(name), sub_matches),
            Some((name, _)) => (Some(name), &matches),
            None => (None, &matches),
        };

        let options = run_options(option_matches);
        let console = Console::new(options.verbosity);

        if option_matches.get_flag("list") {
            Console::new(Verbosity::Normal).targets(&self.registry);
            return Ok(EXIT_SUCCESS);
        }

        let dispatcher = self.dispatcher(option_matches.get_flag("no-cache"))?;

        match dispatcher.run(target, &options).await {
            Ok(dispatch) => Ok(dispatch.exit_code()),
            Err(e) => {
                console.print_error(&e.to_string());
                Ok(e.exit_code())
            }
        }
    }

    fn has_subcommand(&self, name: &str) -> bool {
        self.command.get_subcommands().any(|c| c.get_name() == name)
    }

    /// Wire the process executor and staleness oracle for this project
    fn dispatcher(&self, no_cache: bool) -> anyhow::Result<Dispatcher> {
        let project_dir = self.project_dir();

        let env_vars = match &self.config.env_file {
            Some(file) => load_env_file(&project_dir.join(file))?,
            None => Vec::new(),
        };
        let executor: Arc<dyn ActionExecutor> =
            Arc::new(ProcessExecutor::new(&project_dir).with_env(env_vars));

        let mut oracle = StalenessOracle::new(&project_dir);
        if !no_cache {
            match FileStateStore::open_in(&project_dir) {
                Ok(store) => oracle = oracle.with_store(Arc::new(store)),
                Err(e) => tracing::warn!(error = %e, "ignoring unreadable build state"),
            }
        }

        Ok(Dispatcher::new(Arc::clone(&self.registry), executor, oracle))
    }
}

/// Build the clap command from configuration
fn build_command(config: &Config, registry: &Registry) -> Command {
    let mut cmd = Command::new(config.name.clone().unwrap_or_else(|| "rmake".to_string()))
        .version(env!("CARGO_PKG_VERSION"))
        .about(
            config
                .usage
                .clone()
                .unwrap_or_else(|| "A YAML-based target runner".to_string()),
        )
        .allow_external_subcommands(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to rmake.yml config file")
                .global(true),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .help("Number of actions to run at once")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("1")
                .global(true),
        )
        .arg(
            Arg::new("keep-going")
                .short('k')
                .long("keep-going")
                .help("Keep running independent targets after a failure")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("Print the plan without running anything")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("Kill actions that run longer than this")
                .value_parser(value_parser!(u64).range(1..))
                .global(true),
        )
        .arg(
            Arg::new("no-cache")
                .long("no-cache")
                .help("Do not read or write the recorded build state")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List declared targets")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .help("Print a shell completion script")
                .value_parser(value_parser!(Shell)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print action output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        );

    if let Ok(default) = registry.default_target() {
        cmd = cmd.after_help(format!("Default target: {}", default.name));
    }

    // Add subcommands for each target
    for target in registry.targets() {
        if target.private {
            continue;
        }

        let mut target_cmd = Command::new(target.name.clone());
        if let Some(usage) = &target.usage {
            target_cmd = target_cmd.about(usage.clone());
        }
        if !target.prerequisites.is_empty() {
            target_cmd =
                target_cmd.long_about(format!("Requires: {}", target.prerequisites.join(", ")));
        }

        cmd = cmd.subcommand(target_cmd);
    }

    cmd
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Collect run options from matches
fn run_options(matches: &ArgMatches) -> RunOptions {
    let jobs = matches.get_one::<u64>("jobs").copied().unwrap_or(1);
    let timeout = matches.get_one::<u64>("timeout").copied().map(Duration::from_secs);

    RunOptions::new()
        .with_concurrency(usize::try_from(jobs).unwrap_or(usize::MAX))
        .with_fail_fast(!matches.get_flag("keep-going"))
        .with_dry_run(matches.get_flag("dry-run"))
        .with_timeout(timeout)
        .with_verbosity(get_verbosity(matches))
}

/// Run the CLI application with the process arguments
pub async fn run() -> anyhow::Result<i32> {
    let args: Vec<String> = env::args().collect();
    let file_path = extract_file_arg(&args);

    let app = match file_path {
        Some(path) => App::with_config_file(path.clone())
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => App::new().context("failed to load configuration")?,
    };

    app.run_from(args).await
}

/// Map an error that escaped the CLI to a process exit code
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<RmakeError>() {
        e.exit_code()
    } else if let Some(e) = error.downcast_ref::<ConfigError>() {
        e.exit_code()
    } else {
        EXIT_CONFIG
    }
}

/// Extract --file argument before clap parsing
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--file" || arg == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        if let Some(path) = arg.strip_prefix("--file=") {
            return Some(Path::new(path).to_path_buf());
        }
    }
    None
}
