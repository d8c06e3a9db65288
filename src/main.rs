//! Reprocheck - verify that a build is reproducible.
//!
//! Thin command surface over the library. Preset detection and config
//! files belong to a higher layer; this binary only wires flags into the
//! session records and picks an exit code:
//! 0 verified reproducible, 1 verified NOT reproducible, 2 session error.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use reprocheck::build::Build;
use reprocheck::server::{discover_servers, ProcessSpawner, KNOWN_SERVERS};
use reprocheck::strategy;
use reprocheck::variation::VariationSpec;
use reprocheck::{TestArgs, TestbedArgs};

#[derive(Parser)]
#[command(name = "reprocheck")]
#[command(about = "Verify that a build is reproducible")]
#[command(
    after_help = "EXIT CODES:\n  0  build verified reproducible\n  1  build verified NOT reproducible\n  2  session error (testbed, diff tool)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionFlags {
    /// Build command, run with `sh -ec` inside the testbed
    #[arg(long)]
    build_command: String,

    /// Source tree copied into the testbed
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Shell glob selecting the artifacts to collect and compare
    #[arg(long)]
    artifacts: String,

    /// Directory receiving per-build artifacts and diff reports
    #[arg(long, default_value = "reprocheck-results")]
    results: PathBuf,

    /// Virtual-server backend invocation (repeat for extra argv words)
    #[arg(long, default_value = "reprocheck-null", num_args = 1..)]
    server: Vec<String>,

    /// Structural diff tool argv (the two directories are appended)
    #[arg(long, num_args = 1..)]
    diff_command: Option<Vec<String>>,

    /// Keep testbed scratch state when the session fails
    #[arg(long)]
    preserve_on_error: bool,
}

impl SessionFlags {
    fn test_args(&self) -> TestArgs {
        let mut args = TestArgs::new(
            &self.build_command,
            &self.source,
            &self.artifacts,
            &self.results,
        );
        args.preserve_on_error = self.preserve_on_error;
        args.diff_command = self.diff_command.clone();
        args
    }

    fn testbed_args(&self) -> TestbedArgs {
        TestbedArgs::new(self.server.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild N times with everything fixed and compare the results
    Check {
        #[command(flatten)]
        session: SessionFlags,

        /// Total number of builds (control included)
        #[arg(long, default_value = "2")]
        builds: usize,

        /// Print the generated build script and exit
        #[arg(long)]
        print_script: bool,
    },

    /// Staged environment-variable triage
    Env {
        #[command(flatten)]
        session: SessionFlags,
    },

    /// List virtual-server backends available on this host
    Servers,
}

/// True = verified reproducible, false = verified not.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Check {
            session,
            builds,
            print_script,
        } => {
            if print_script {
                print!("{}", Build::new(&session.build_command, ".").script());
                return Ok(true);
            }

            let specs = vec![VariationSpec::empty(); builds.max(1)];
            let spawner = ProcessSpawner::new(session.server.clone());
            let outcome = strategy::check(
                &spawner,
                &session.test_args(),
                &session.testbed_args(),
                &specs,
            )?;

            if outcome.reproducible {
                println!("Reproducible. Artifact hashes:");
                for (path, hash) in outcome.artifact_hashes.iter().flatten() {
                    println!("{hash}  {path}");
                }
            } else {
                println!("NOT reproducible. Divergent builds:");
                for name in &outcome.divergent {
                    println!("  {name}");
                }
            }
            Ok(outcome.reproducible)
        }

        Commands::Env { session } => {
            let spawner = ProcessSpawner::new(session.server.clone());
            let outcome = strategy::check_env(
                &spawner,
                &session.test_args(),
                &session.testbed_args(),
                std::env::vars().map(|(name, _)| name),
            )?;

            if outcome.reproducible {
                println!("Environment triage passed (both stages).");
            } else {
                let failed = match &outcome.stage2 {
                    Some(stage) => stage,
                    None => &outcome.stage1,
                };
                println!("Environment triage FAILED. Varied set:");
                for name in &failed.varied {
                    println!("  {name}");
                }
            }
            Ok(outcome.reproducible)
        }

        Commands::Servers => {
            let found = discover_servers(KNOWN_SERVERS);
            if found.is_empty() {
                println!("No virtual-server backends found on PATH.");
            } else {
                for name in found {
                    println!("{name}");
                }
            }
            Ok(true)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        // A negative verdict is a successful run, just not the answer the
        // caller hoped for; keep its exit code distinct from real errors.
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("reprocheck: error: {e:#}");
            std::process::exit(2);
        }
    }
}
