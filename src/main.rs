//! chunkalign CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Run a whole job (preprocess, all chunks, postprocess)
//! chunkalign job.yaml run
//!
//! # Run one phase, or resume it after an interruption
//! chunkalign job.yaml process
//!
//! # Attach to an existing job by its output directory
//! chunkalign /data/job1 status
//! chunkalign /data/job1 kill
//! chunkalign /data/job1 clean
//!
//! # Submit to a cluster scheduler instead of running locally
//! chunkalign job.yaml run --platform cluster
//!
//! # Export the job as a standalone script or a DOT diagram
//! chunkalign /data/job1 script > job.sh
//! chunkalign /data/job1 diagram > job.dot
//! ```

use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use log::info;

use chunkalign::config::JobSettings;
use chunkalign::monitoring::estimator::ShortfallConfirm;
use chunkalign::{ChunkOrchestrator, Directive, JobConfig, Phase, Platform, APP_NAME, VERSION};

/// Default directive when none is given.
const DEFAULT_DIRECTIVE: &str = "run";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct CliConfig {
    /// A job config YAML, or the output directory of an existing job.
    target: String,
    directive: Directive,
    platform_name: String,
    chunk: Option<usize>,
    chunks_override: Option<usize>,
    dry_run: bool,
    batch: bool,
    verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            directive: Directive::Run(Phase::All),
            platform_name: "local".to_string(),
            chunk: None,
            chunks_override: None,
            dry_run: false,
            batch: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Chunked workflow engine for sequence alignment");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: chunkalign [OPTIONS] <CONFIG_OR_JOB_DIR> [DIRECTIVE]");
    println!();
    println!("Arguments:");
    println!("  <CONFIG_OR_JOB_DIR>  Job config YAML, or an existing job's output directory");
    println!("  [DIRECTIVE]          What to do (default: {})", DEFAULT_DIRECTIVE);
    println!();
    println!("Directives:");
    println!("  run          Run all phases (preprocess, process, postprocess)");
    println!("  preprocess   Run or resume only the preprocess phase");
    println!("  process      Run or resume only the per-chunk process phase");
    println!("  postprocess  Run or resume only the postprocess phase");
    println!("  save         Persist the job settings without running anything");
    println!("  status       Show per-step, per-chunk progress");
    println!("  kill         Stop running tasks / cancel submitted jobs");
    println!("  clean        Remove per-chunk intermediates, keep merged outputs");
    println!("  veryclean    Also remove merged outputs and other precious artifacts");
    println!("  script       Export the job as a standalone shell script");
    println!("  diagram      Export the step graph in DOT form");
    println!();
    println!("Options:");
    println!("  --platform NAME  Execution platform: local or cluster (default: local)");
    println!("  --chunk N        Run exactly chunk N (used inside submitted cluster jobs)");
    println!("  --chunks N       Override the chunk count for a new job");
    println!("  --dry-run        Print step commands without executing");
    println!("  --batch          Non-interactive: abort on resource warnings");
    println!("  --verbose        Enable debug logging");
    println!("  --help           Show this help message");
    println!("  --version        Show version information");
}

/// Parses command-line arguments into a CliConfig struct.
fn parse_arguments(args: &[String]) -> Result<CliConfig, String> {
    let mut config = CliConfig::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--batch" => {
                config.batch = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--platform" => {
                i += 1;
                if i >= args.len() {
                    return Err("--platform requires a name argument".to_string());
                }
                config.platform_name = args[i].clone();
            }
            "--chunk" => {
                i += 1;
                if i >= args.len() {
                    return Err("--chunk requires an index argument".to_string());
                }
                config.chunk = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid chunk index: {}", args[i]))?,
                );
            }
            "--chunks" => {
                i += 1;
                if i >= args.len() {
                    return Err("--chunks requires a number argument".to_string());
                }
                config.chunks_override = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid chunk count: {}", args[i]))?,
                );
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.target = arg.clone(),
                    1 => {
                        config.directive = Directive::parse(arg)
                            .ok_or_else(|| format!("Unknown directive: {}", arg))?
                    }
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    if config.target.is_empty() {
        return Err("A config file or job directory is required".to_string());
    }
    if config.chunk.is_some() && config.directive != Directive::Run(Phase::Process) {
        return Err("--chunk only applies to the process directive".to_string());
    }

    Ok(config)
}

/// Asks the operator to approve running below the estimated RAM minimum.
fn prompt_shortfall(required_gb: u64, available_gb: u64) -> bool {
    eprint!(
        "Estimated minimum RAM per chunk is {} GB but only {} GB available. \
         Continue anyway? [y/N] ",
        required_gb, available_gb
    );
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Builds the orchestrator: attach when a settings artifact exists,
/// otherwise create a new job from the config file.
fn resolve_orchestrator(
    cli: &CliConfig,
    platform: Platform,
) -> Result<ChunkOrchestrator, Box<dyn std::error::Error>> {
    let target = Path::new(&cli.target);

    if target.is_dir() {
        info!("Attaching to job directory {}", target.display());
        return Ok(ChunkOrchestrator::attach(target, platform, cli.dry_run)?);
    }

    let mut job_config = JobConfig::load_file(target)?;
    if let Some(chunks) = cli.chunks_override {
        job_config.num_chunks = Some(chunks);
    }

    if JobSettings::exists(&job_config.output_dir) {
        info!(
            "Existing job found in {}; reattaching",
            job_config.output_dir.display()
        );
        return Ok(ChunkOrchestrator::attach(
            &job_config.output_dir,
            platform,
            cli.dry_run,
        )?);
    }

    let confirm: Option<ShortfallConfirm> = if cli.batch {
        None
    } else {
        Some(&prompt_shortfall)
    };
    Ok(ChunkOrchestrator::create(
        job_config,
        platform,
        cli.dry_run,
        confirm,
    )?)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let cli = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(cli.verbose);

    // Exports go to stdout unframed; everything else gets the banner.
    let exporting = matches!(cli.directive, Directive::Script | Directive::Diagram);
    if !exporting {
        print_banner();
    }

    if cli.dry_run {
        info!("Mode: DRY RUN (commands will not execute)");
    }

    let platform = Platform::from_name(&cli.platform_name)?;
    let orchestrator = resolve_orchestrator(&cli, platform)?;

    match cli.directive {
        Directive::Run(phase) => {
            if let Some(index) = cli.chunk {
                orchestrator.run_chunk(index)?;
            } else {
                orchestrator.run(phase)?;
            }
            info!("Directive finished");
        }
        Directive::Save => {
            let path = orchestrator.save()?;
            info!("Settings saved to {}", path.display());
        }
        Directive::Status => {
            println!("{}", orchestrator.status());
        }
        Directive::Kill => {
            orchestrator.kill()?;
            info!("Stop requested");
        }
        Directive::Clean { deep } => {
            let removed = orchestrator.clean(deep);
            info!(
                "Removed {} artifacts ({})",
                removed,
                if deep { "deep clean" } else { "ordinary clean" }
            );
        }
        Directive::Script => {
            print!("{}", orchestrator.shell_script());
        }
        Directive::Diagram => {
            print!("{}", orchestrator.diagram());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
