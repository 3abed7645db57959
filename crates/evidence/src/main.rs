mod demos;

use std::path::PathBuf;

use clap::{Parser as _, ValueEnum as _};
use color_eyre::{eyre::Context as _, Result};
use demos::Demo;
use evidence_core::{ObligationResult, VerifyConfig, Verifier};
use itertools::Itertools;
use tracing_subscriber::prelude::*;

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::Registry::default()
        .with(tracing_error::ErrorLayer::default())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    run()
}

#[derive(Debug, clap::Parser)]
#[command(version)]
struct Cli {
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, clap::Subcommand)]
enum Cmd {
    /// Verify demo modules, printing one line per obligation
    ///
    /// Exits with a non-zero status if any obligation failed or errored.
    Verify {
        /// The demos to verify. All of them if none are given
        demos: Vec<Demo>,
        /// A .toml file with verification settings
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// Seed for input generation, for reproducible runs
        #[clap(long)]
        seed: Option<u64>,
        /// Also run the mutation pass
        #[clap(long)]
        mutate: bool,
        /// Where to write the obligation and trust records
        #[clap(long, short, default_value = "evidence-reports")]
        out: PathBuf,
        #[clap(long, short, default_value = "human")]
        format: OutputFormat,
    },

    /// Print the source of demo modules
    Show {
        /// The demos to print. All of them if none are given
        demos: Vec<Demo>,
    },
}

#[derive(Debug, Default, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Human,
    Json,
}

fn selected(demos: &[Demo]) -> Vec<Demo> {
    if demos.is_empty() {
        Demo::value_variants().to_vec()
    } else {
        demos.to_vec()
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::Verify {
            demos,
            config,
            seed,
            mutate,
            out,
            format,
        } => {
            let mut settings = match config {
                Some(path) => VerifyConfig::load(path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => VerifyConfig::default(),
            };
            if seed.is_some() {
                settings.seed = *seed;
            }
            settings.features.mutation |= *mutate;
            tracing::debug!(?settings, "configuration");

            let verifier = Verifier::new(settings);
            let mut did_fail = false;
            for demo in selected(demos) {
                let module = demo.module();
                let report = verifier.verify_module(&module, |r| print_result(*format, r));
                let (obligations, trust) = report
                    .persist(out)
                    .with_context(|| format!("failed to write reports to {}", out.display()))?;
                tracing::info!(
                    obligations = %obligations.display(),
                    trust = %trust.display(),
                    "wrote records"
                );
                if let OutputFormat::Human = format {
                    println!("{}: {}", module.name(), report.summary());
                    if !report.trust.functions.is_empty() {
                        println!(
                            "  verified: {}",
                            report.trust.functions.iter().map(|t| &t.function).format(", ")
                        );
                    }
                }
                did_fail |= report.is_failure();
            }
            if did_fail {
                std::process::exit(1);
            }
        }
        Cmd::Show { demos } => {
            for demo in selected(demos) {
                let module = demo.module();
                println!("# {}", module.name());
                for f in module.functions() {
                    match f.callable().function() {
                        Some(function) => println!("{function}"),
                        None => println!("# {}: native", f.name()),
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_result(format: OutputFormat, result: &ObligationResult) {
    match format {
        OutputFormat::Human => println!("{result}"),
        OutputFormat::Json => match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize result"),
        },
    }
}
