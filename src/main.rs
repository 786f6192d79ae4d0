use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::{error, info, warn, LevelFilter};

use usbhil::hil::GoldenDeviceRegistry;
use usbhil::{ops, HilConfig};

#[derive(Parser, Debug)]
#[command(
    name = "usbhil",
    version,
    about = "Hardware-in-the-loop harness for USB bootloader protocols"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Golden registry directory
    #[arg(long, value_name = "DIR", global = true)]
    registry_dir: Option<PathBuf>,

    /// Debug logging for usbhil
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a pcap/pcapng bus capture into a scenario file
    Convert {
        input: PathBuf,

        /// Protocol tag used for step labels (e.g. sahara, firehose)
        #[arg(long, short)]
        protocol: String,

        /// Scenario JSON output path
        #[arg(long, short)]
        output: PathBuf,

        /// Device name used in the scenario name
        #[arg(long)]
        device_name: Option<String>,

        /// Keep large payloads instead of zero-filling them
        #[arg(long, action = clap::ArgAction::SetTrue)]
        no_redact: bool,
    },

    /// Compare an observed scenario against a golden one
    Validate {
        actual: PathBuf,
        golden: PathBuf,

        /// Allowed timing drift as a fraction of the golden delay
        #[arg(long)]
        tolerance: Option<f64>,

        /// Write an HTML report to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Subject shown in the report title
        #[arg(long, default_value = "Simulation")]
        subject: String,
    },

    /// Register a scenario as the golden reference for a device
    Register {
        #[arg(long)]
        device_id: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        protocol: String,

        #[arg(long)]
        scenario: PathBuf,
    },

    /// List golden devices
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if verbose {
        builder.filter_module("usbhil", LevelFilter::Debug);
    }
    // RUST_LOG still wins over the defaults above
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => HilConfig::load_from(path),
        None => HilConfig::load(),
    };
    if let Some(dir) = cli.registry_dir {
        config.registry_dir = dir;
    }

    match cli.command {
        Command::Convert {
            input,
            protocol,
            output,
            device_name,
            no_redact,
        } => {
            let mut options = config.conversion_options();
            if let Some(name) = device_name {
                options.device_name = name;
            }
            if no_redact {
                options.redact_user_data = false;
            }
            let scenario = ops::convert_capture(&input, &protocol, &options)
                .with_context(|| format!("converting {}", input.display()))?;
            if scenario.steps.is_empty() {
                warn!("No supported USB packets found in {}; writing an empty scenario", input.display());
            }
            scenario
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Saved scenario '{}' ({} steps) to {}", scenario.name, scenario.steps.len(), output.display());
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate {
            actual,
            golden,
            tolerance,
            report,
            subject,
        } => {
            let tolerance = tolerance.unwrap_or(config.timing_tolerance);
            if tolerance.is_nan() || tolerance < 0.0 {
                bail!("tolerance must be a non-negative fraction, got {}", tolerance);
            }
            let validation = ops::validate_files(&actual, &golden, tolerance)
                .with_context(|| format!("validating {} against {}", actual.display(), golden.display()))?;
            let result = &validation.result;

            info!(
                "{}: similarity {:.2}%, {} differences. Recommendation: {}",
                if result.is_match { "MATCH" } else { "MISMATCH" },
                result.similarity_score * 100.0,
                result.differences.len(),
                result.recommendation
            );
            for diff in &result.differences {
                info!("  step {} [{}] {}", diff.step_index, diff.difference_type, diff.label);
            }

            if let Some(path) = report {
                ops::write_report(result, &subject, &validation.actual.protocol, &path)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }

            Ok(if result.is_match {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Register {
            device_id,
            model,
            protocol,
            scenario,
        } => {
            let mut registry = GoldenDeviceRegistry::new(&config.registry_dir);
            let info = ops::register_device(&mut registry, &device_id, &model, &protocol, &scenario)
                .with_context(|| format!("registering {}", device_id))?;
            info!(
                "Registered {} ({}) with protocols: {}",
                info.device_id,
                info.model,
                info.scenarios.keys().join(", ")
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::List => {
            let registry = GoldenDeviceRegistry::new(&config.registry_dir);
            if registry.is_empty() {
                println!("No golden devices registered in {}", config.registry_dir.display());
            }
            for device in ops::list_devices(&registry) {
                println!(
                    "{}\t{}\t{}\t[{}]",
                    device.device_id,
                    device.model,
                    device.registered_at,
                    device.scenarios.keys().join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
