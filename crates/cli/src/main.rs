mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stagehand_lib::consts::DEFAULT_RECIPE;
use stagehand_lib::pipeline::{PipelineError, PipelineOptions};

use crate::output::{OutputFormat, format_exit_code, print_diagnostics, print_error};

/// stagehand - compile against a live schema, ship only the binary
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Raise the log level (-v info, -vv debug, -vvv trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile the source and assemble the runtime image
  Build {
    /// Path to the recipe
    #[arg(default_value = DEFAULT_RECIPE)]
    recipe: PathBuf,

    /// Source directory (defaults to the recipe's directory)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Where to write the runtime image
    #[arg(long, default_value = "image")]
    out: PathBuf,

    /// Replace an existing image at --out
    #[arg(short, long)]
    force: bool,

    /// Validate against a schema fixture instead of the live resource
    #[arg(long, value_name = "DIR")]
    schema_fixture: Option<PathBuf>,

    /// Kill the compiler after this long (e.g. "10m"), overriding the recipe
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Evaluate a recipe and show what a build would do
  Plan {
    /// Path to the recipe
    #[arg(default_value = DEFAULT_RECIPE)]
    recipe: PathBuf,

    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the manifest of a runtime image
  Inspect {
    /// Image directory
    image: PathBuf,

    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Check that an image carries its artifact intact
  Verify {
    /// Image directory
    image: PathBuf,
  },

  /// Remove workspaces left behind by abandoned runs
  Clean {
    /// Also remove promoted artifacts
    #[arg(long)]
    artifacts: bool,

    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show version, platform and store location
  Info,
}

fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = if verbose > 0 {
    EnvFilter::new(level)
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      recipe,
      source,
      out,
      force,
      schema_fixture,
      timeout,
      output,
    } => {
      let options = PipelineOptions {
        source,
        force,
        schema_fixture,
        ..PipelineOptions::new(out)
      };
      cmd::cmd_build(&recipe, options, timeout, output)
    }
    Commands::Plan { recipe, output } => cmd::cmd_plan(&recipe, output),
    Commands::Inspect { image, output } => cmd::cmd_inspect(&image, output),
    Commands::Verify { image } => cmd::cmd_verify(&image),
    Commands::Clean {
      artifacts,
      dry_run,
      output,
    } => cmd::cmd_clean(artifacts, dry_run, output),
    Commands::Info => {
      cmd::cmd_info();
      Ok(())
    }
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => report_failure(&err),
  }
}

/// Print the error chain and pick the exit code of the pipeline error inside it.
fn report_failure(err: &anyhow::Error) -> ExitCode {
  print_error(&format!("{:#}", err));

  let pipeline = err.chain().find_map(|e| e.downcast_ref::<PipelineError>());
  let Some(pipeline) = pipeline else {
    return ExitCode::FAILURE;
  };

  if let Some(diagnostics) = pipeline.diagnostics() {
    print_diagnostics(diagnostics);
  }

  let code = pipeline.exit_code();
  debug!(kind = ?pipeline.kind(), code = %format_exit_code(code), "exiting");
  ExitCode::from(u8::try_from(code).unwrap_or(1))
}

