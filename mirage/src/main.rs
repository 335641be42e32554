use anyhow::Result;
use clap::{Parser, Subcommand};
use mirage::{train, train_wgan, MirageConfig};
use mirage_async_trainer::TaskOutcome;
use mirage_tensorboard::TensorboardRecorder;
use std::sync::{Arc, Mutex};

/// Train an A3C agent with a GAN-supplemented dataset in the dot environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file, defaults are used if not given
    #[arg(long, global = true)]
    config: Option<String>,

    /// Write the configuration to this file and exit
    #[arg(long, global = true)]
    create_config: Option<String>,

    /// Show the configuration and exit
    #[arg(long, global = true, default_value_t = false)]
    show_config: bool,

    /// Number of coordinator iterations, overrides the configuration
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Directory of TensorBoard logs, overrides the configuration
    #[arg(long, global = true)]
    log_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the agent, the default
    Train,

    /// Train the WGAN on the persisted dataset
    TrainWgan,
}

fn load_config(args: &Args) -> Result<MirageConfig> {
    let mut config = match &args.config {
        Some(path) => MirageConfig::load(path)?,
        None => MirageConfig::default(),
    };
    if args.max_iterations.is_some() {
        config = config.max_iterations(args.max_iterations);
    }
    if let Some(log_dir) = &args.log_dir {
        config = config.log_dir(log_dir);
    }
    Ok(config)
}

fn run_agent(config: &MirageConfig) -> Result<()> {
    let recorder = Arc::new(Mutex::new(TensorboardRecorder::new(&config.log_dir)));
    let events = train(config, recorder)?;
    for event in events.iter() {
        if let TaskOutcome::Failed(msg) | TaskOutcome::Panicked(msg) = &event.outcome {
            anyhow::bail!("Task {} ended abnormally: {}", event.name, msg);
        }
    }
    Ok(())
}

fn run_wgan(config: &MirageConfig) -> Result<()> {
    let mut recorder =
        TensorboardRecorder::with_step_key(config.log_dir.join("wgan"), "gen_iterations");
    train_wgan(config, &mut recorder)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(path) = &args.create_config {
        config.save(path)?;
        println!("Create config file: {}", path);
        return Ok(());
    }
    if args.show_config {
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    match args.command.unwrap_or(Command::Train) {
        Command::Train => run_agent(&config),
        Command::TrainWgan => run_wgan(&config),
    }
}
