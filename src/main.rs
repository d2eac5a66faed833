// src/main.rs

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vnfpkg::hash::HashAlgorithm;
use vnfpkg::{WriteOptions, validator, vnfreq};

#[derive(Parser)]
#[command(name = "vnfpkg")]
#[command(author, version, about = "VNF CSAR manipulation tool", long_about = None)]
struct Cli {
    /// Set verbosity level (can be passed multiple times)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a CSAR from a service template directory
    CsarCreate {
        /// Service template directory
        source: PathBuf,
        /// Entry definition file relative to the service template directory
        entry: String,
        /// Output CSAR zip destination
        #[arg(short, long)]
        destination: PathBuf,
        /// Manifest file relative to the service template directory
        #[arg(long)]
        manifest: Option<String>,
        /// Change history file relative to the service template directory
        #[arg(long)]
        history: Option<String>,
        /// Test directory relative to the service template directory
        #[arg(long)]
        tests: Option<String>,
        /// License directory relative to the service template directory
        #[arg(long)]
        licenses: Option<String>,
        /// Hash algorithm for per-file digests in the manifest
        #[arg(long)]
        digest: Option<String>,
        /// Certificate file for signing, relative to the service template directory
        #[arg(long)]
        certificate: Option<String>,
        /// Private key file for signing, absolute or relative path
        #[arg(long)]
        privkey: Option<PathBuf>,
        /// Emit the SOL004 v2.4.1 metadata variant
        #[arg(long)]
        sol241: bool,
    },
    /// Extract a CSAR and run its verification chain
    CsarOpen {
        /// CSAR file location (path or URL)
        source: String,
        /// Output directory to extract the CSAR into
        #[arg(short, long)]
        destination: PathBuf,
        /// Do NOT verify the signer's certificate chain
        #[arg(long)]
        no_verify_cert: bool,
    },
    /// Open a CSAR into a scratch directory and validate it
    CsarValidate {
        /// CSAR file location (path or URL)
        source: String,
        /// Validator driver to use
        #[arg(short, long, default_value = "tosca")]
        parser: String,
        /// IDs of VNF requirements to check, e.g. R-66070
        #[arg(long = "test-reqs")]
        test_reqs: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("vnfpkg={}", level))),
        )
        .init();

    match cli.command {
        Commands::CsarCreate {
            source,
            entry,
            destination,
            manifest,
            history,
            tests,
            licenses,
            digest,
            certificate,
            privkey,
            sol241,
        } => {
            let digest = digest
                .map(|s| s.parse::<HashAlgorithm>())
                .transpose()
                .context("invalid --digest algorithm")?;
            let opts = WriteOptions {
                manifest,
                history,
                tests,
                licenses,
                digest,
                certificate,
                privkey,
                sol241,
            };
            vnfpkg::write(&source, &entry, &destination, &opts)?;
            println!("CSAR created: {}", destination.display());
        }
        Commands::CsarOpen {
            source,
            destination,
            no_verify_cert,
        } => {
            let reader = vnfpkg::read(&source, &destination, no_verify_cert)?;
            println!("CSAR extracted to: {}", reader.destination().display());
            if let Some(entry) = reader.entry_definitions() {
                println!("Entry definitions: {}", entry);
            }
        }
        Commands::CsarValidate {
            source,
            parser,
            test_reqs,
        } => {
            let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
            let reader = vnfpkg::read(&source, &scratch.path().join("extracted"), true)?;

            let mut driver = validator::get_validator(&parser)?;
            driver.validate(&reader)?;
            info!(parser, "template validation passed");

            let outcomes =
                vnfreq::check_requirements(&test_reqs, &reader, driver.template())?;
            let mut failed = false;
            for outcome in &outcomes {
                match &outcome.error {
                    Some(err) => {
                        failed = true;
                        println!("{}: ERROR: {}", outcome.id, err);
                    }
                    None => println!("{}: OK", outcome.id),
                }
                println!("    {}", outcome.description);
            }
            if failed {
                anyhow::bail!("one or more requirement checks failed");
            }
            println!("Validation OK");
        }
    }
    Ok(())
}
