use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use common::models::{ExecutionReport, TaskRequirements};
use common::types::{AccuracyPreference, HardwareType, PerformanceMode};
use common::utils::format_bytes;
use config::PreferencesUpdate;
use logging::{init_logging, LoggingConfig};
use model_manager::DEFAULT_TOP_K;
use model_orchestrator::{ModelOrchestrator, ModelRecommendation, OrchestratorOptions};

/// Local model catalog and adaptive model selection
#[derive(Debug, Parser)]
#[command(name = "model-orchestrator", version, about)]
struct Cli {
    /// Preferences file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory scanned for model artifacts
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also write daily-rolling log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show hardware and catalog status
    Status,
    /// Show memory and storage accounting
    Resources,
    /// List cataloged models
    List,
    /// Recommend models for a task
    Recommend {
        #[command(flatten)]
        requirements: RequirementArgs,

        /// Number of recommendations
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Select the single best model for a task
    Select {
        #[command(flatten)]
        requirements: RequirementArgs,
    },
    /// Record the outcome of running a model
    Record {
        /// Model name
        model: String,

        /// Latency in seconds
        #[arg(long)]
        latency: f64,

        /// Throughput (tokens per second)
        #[arg(long)]
        throughput: f64,

        /// Memory efficiency in [0, 1]
        #[arg(long, default_value_t = 1.0)]
        memory_efficiency: f64,

        /// Mark the execution as failed
        #[arg(long)]
        failed: bool,
    },
    /// Evict least recently used models over the storage budget
    Cleanup,
    /// Show statistics and history of one model
    History {
        /// Model name
        model: String,
    },
    /// Rescan the models directory
    Rescan,
    /// Show or change preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    /// Show the current preferences
    Show,
    /// Change one or more preferences
    Set(PrefsSetArgs),
    /// Set the score multiplier of one model
    Weight {
        /// Model name
        model: String,

        /// Multiplier (negative values are treated as 0)
        weight: f64,
    },
    /// Remove the score multiplier of one model
    Unweight {
        /// Model name
        model: String,
    },
    /// Restore the default preferences
    Reset,
}

#[derive(Debug, Args)]
struct RequirementArgs {
    /// Hardware the model must support (repeatable)
    #[arg(long = "hardware")]
    hardware: Vec<HardwareType>,

    /// Highest quantization bit width allowed
    #[arg(long)]
    max_quantization: Option<u32>,

    /// Require batching support
    #[arg(long)]
    batching: bool,

    /// Largest artifact size in bytes
    #[arg(long)]
    max_size: Option<u64>,
}

impl From<RequirementArgs> for TaskRequirements {
    fn from(args: RequirementArgs) -> Self {
        let mut requirements = TaskRequirements::new();
        if !args.hardware.is_empty() {
            requirements = requirements.with_required_hardware(args.hardware);
        }
        if let Some(bits) = args.max_quantization {
            requirements = requirements.with_max_quantization(bits);
        }
        if args.batching {
            requirements = requirements.with_batching(true);
        }
        if let Some(bytes) = args.max_size {
            requirements = requirements.with_max_size_bytes(bytes);
        }
        requirements
    }
}

#[derive(Debug, Args)]
struct PrefsSetArgs {
    /// Performance mode (speed, memory, balanced)
    #[arg(long)]
    mode: Option<PerformanceMode>,

    /// Accuracy preference (high, medium, low)
    #[arg(long)]
    accuracy: Option<AccuracyPreference>,

    /// Share of system memory models may use
    #[arg(long)]
    max_memory: Option<f64>,

    /// Preferred devices, in order
    #[arg(long, value_delimiter = ',')]
    devices: Option<Vec<String>>,

    /// Directory holding usage statistics
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Rank with usage statistics
    #[arg(long)]
    adaptive: Option<bool>,

    /// Performance samples kept per model (0 keeps everything)
    #[arg(long)]
    history_size: Option<usize>,

    /// Storage budget in GB (0 disables cleanup)
    #[arg(long)]
    cleanup_threshold: Option<f64>,
}

impl From<PrefsSetArgs> for PreferencesUpdate {
    fn from(args: PrefsSetArgs) -> Self {
        Self {
            performance_mode: args.mode,
            accuracy_preference: args.accuracy,
            max_memory_usage: args.max_memory,
            preferred_devices: args.devices,
            cache_dir: args.cache_dir,
            enable_adaptive_selection: args.adaptive,
            model_usage_history_size: args.history_size,
            auto_cleanup_threshold: args.cleanup_threshold,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        json: cli.json_logs,
        log_dir: cli.log_dir.clone(),
        with_target: true,
    })
    .context("Failed to initialize logging")?;

    let mut options = OrchestratorOptions::default();
    if let Some(path) = &cli.config {
        options = options.with_config_path(path);
    }
    if let Some(dir) = &cli.models_dir {
        options = options.with_models_dir(dir);
    }

    let mut orchestrator = ModelOrchestrator::new(options).context("Failed to initialize model orchestrator")?;

    run(&mut orchestrator, cli.command, cli.json)
}

fn run(orchestrator: &mut ModelOrchestrator, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Status => {
            let status = orchestrator.system_status();
            if json {
                return print_json(&status);
            }
            let hardware = &status.hardware;
            println!(
                "CPU: {} with {} physical cores, {} threads",
                hardware.cpu_architecture(),
                hardware.cpu_cores(),
                hardware.cpu_threads()
            );
            if !hardware.instruction_sets().is_empty() {
                let sets: Vec<&str> = hardware.instruction_sets().iter().map(String::as_str).collect();
                println!("Instruction sets: {}", sets.join(", "));
            }
            println!("Memory: {}", format_bytes(hardware.total_memory()));
            if hardware.has_accelerators() {
                println!(
                    "Accelerators ({} total):",
                    format_bytes(hardware.total_accelerator_memory())
                );
                for (id, device) in hardware.accelerators() {
                    println!("  {}: {}, {}", id, device.name, format_bytes(device.total_memory));
                }
            } else {
                println!("No accelerators detected");
            }
            println!("Models: {}", status.available_models);
            println!("Artifact storage: {}", format_bytes(status.total_cache_size));
            println!("Performance mode: {}", status.performance_mode);
            println!("Memory budget: {:.0}%", status.memory_usage_percent);
        }
        Command::Resources => {
            let usage = orchestrator.resource_usage();
            if json {
                return print_json(&usage);
            }
            println!("Total memory: {}", format_bytes(usage.total_memory));
            println!("Needed by models: {}", format_bytes(usage.used_by_models));
            println!("Memory budget: {}", format_bytes(usage.available_memory));
            println!(
                "Artifact storage: {} of {}",
                format_bytes(usage.cache_size),
                format_bytes(usage.cache_threshold)
            );
            println!("Models: {}", usage.model_count);
            println!("Active devices: {}", usage.active_devices.join(", "));
        }
        Command::List => {
            let models = orchestrator.catalog().list();
            if json {
                return print_json(&models);
            }
            if models.is_empty() {
                println!("No models found in {:?}", orchestrator.models_dir());
            }
            for model in models {
                println!(
                    "{:<40} {:<8} {:>10}  {}",
                    model.name,
                    model.format,
                    format_bytes(model.size_bytes),
                    model.quantization.map(|q| q.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Command::Recommend { requirements, top_k } => {
            let recommendations = orchestrator.get_model_recommendations(&requirements.into(), top_k);
            if json {
                return print_json(&recommendations);
            }
            if recommendations.is_empty() {
                println!("No suitable models found");
            }
            for recommendation in &recommendations {
                print_recommendation(recommendation);
            }
        }
        Command::Select { requirements } => {
            let best = orchestrator.optimize_model_selection(&requirements.into())?;
            if json {
                return print_json(&best);
            }
            print_recommendation(&best);
        }
        Command::Record {
            model,
            latency,
            throughput,
            memory_efficiency,
            failed,
        } => {
            let report = ExecutionReport::new(!failed, latency, throughput, memory_efficiency);
            let stats = orchestrator
                .record_execution_metrics(&model, report)
                .with_context(|| format!("Failed to record execution of '{}'", model))?;
            if json {
                return print_json(stats);
            }
            println!(
                "{}: {} use(s), success rate {:.2}, latency {:.3}s, throughput {:.1}",
                model, stats.total_uses, stats.success_rate, stats.avg_latency, stats.avg_throughput
            );
        }
        Command::Cleanup => {
            let report = orchestrator.cleanup_resources()?;
            if json {
                return print_json(&report);
            }
            if report.evicted.is_empty() {
                println!(
                    "Nothing to evict ({} of {})",
                    format_bytes(report.footprint_before),
                    format_bytes(report.threshold_bytes)
                );
            } else {
                println!(
                    "Evicted {}; freed {}",
                    report.evicted.join(", "),
                    format_bytes(report.freed_bytes())
                );
            }
        }
        Command::History { model } => {
            let report = orchestrator.model_performance(&model)?;
            if json {
                return print_json(&report);
            }
            println!("{} ({}, {})", report.model.name, report.model.format, format_bytes(report.model.size_bytes));
            match &report.usage_stats {
                Some(stats) => println!(
                    "Uses: {}, success rate {:.2}, last used {}",
                    stats.total_uses, stats.success_rate, stats.last_used
                ),
                None => println!("Never used"),
            }
            for sample in &report.performance_history {
                println!(
                    "  {} latency {:.3}s throughput {:.1} {}",
                    sample.recorded_at,
                    sample.latency,
                    sample.throughput,
                    if sample.success { "ok" } else { "failed" }
                );
            }
            println!("Recommended device: {}", report.hardware.preferred_device);
        }
        Command::Rescan => {
            let report = orchestrator.rescan()?;
            if json {
                return print_json(report);
            }
            println!("Registered {} model(s), ignored {} file(s)", report.registered, report.ignored);
            for issue in &report.issues {
                println!("  skipped {:?}: {}", issue.path, issue.reason);
            }
        }
        Command::Prefs { command } => match command {
            PrefsCommand::Show => print_json(orchestrator.preferences())?,
            PrefsCommand::Set(args) => {
                let preferences = orchestrator.update_preferences(args.into())?;
                print_json(preferences)?;
            }
            PrefsCommand::Weight { model, weight } => {
                orchestrator.set_custom_model_weight(&model, weight)?;
                println!("{}: weight {}", model, orchestrator.preferences().custom_weight(&model));
            }
            PrefsCommand::Unweight { model } => {
                if orchestrator.remove_custom_model_weight(&model)? {
                    println!("{}: weight removed", model);
                } else {
                    println!("{}: no weight set", model);
                }
            }
            PrefsCommand::Reset => print_json(orchestrator.reset_preferences()?)?,
        },
    }

    Ok(())
}

fn print_recommendation(recommendation: &ModelRecommendation) {
    let hardware = &recommendation.hardware;
    println!("{} (score {:.4})", recommendation.model.name, recommendation.score);
    println!(
        "  device {}, needs {}",
        hardware.preferred_device,
        format_bytes(hardware.minimum_memory)
    );
    if let Some(batch) = hardware.recommended_batch_size {
        println!("  batch size {}", batch);
    }
    if let Some(expected) = &hardware.expected_performance {
        println!(
            "  expected latency {:.1}ms, throughput {:.1}",
            expected.avg_latency_ms, expected.avg_throughput
        );
    }
    for warning in &hardware.warnings {
        println!("  warning: {}", warning);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
