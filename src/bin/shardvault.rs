use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shardvault::{Error, ShardHandler, StoreConfig};

#[derive(Parser)]
#[command(name = "shardvault")]
#[command(about = "Split a dataset into contiguous shards and keep replicas in sync", long_about = None)]
struct Cli {
    /// Store directory (overrides `base_dir` from the config file)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// JSON store configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Partition a dataset into COUNT shards on an empty store")]
    Build {
        #[arg(long, value_name = "COUNT")]
        count: usize,
        #[arg(long, value_name = "INPUT")]
        input: PathBuf,
    },
    #[command(about = "Rebalance onto one more shard")]
    AddShard,
    #[command(about = "Rebalance onto one fewer shard")]
    RemoveShard,
    #[command(about = "Add one replica level to every shard")]
    AddReplication,
    #[command(about = "Remove the highest replica level")]
    RemoveReplication,
    #[command(about = "Repair stored content against the directory")]
    Sync,
    #[command(about = "Show the range of one shard or replica, or the whole directory")]
    Info {
        #[arg(value_name = "ID")]
        id: Option<String>,
    },
    #[command(about = "Show layout statistics")]
    Stats,
    #[command(about = "Write the reassembled dataset to stdout")]
    Dump,
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &cli.root {
        config = config.with_base_dir(root);
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let handler = ShardHandler::open(config)?;

    match cli.command {
        Commands::Build { count, input } => {
            let data = fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let shards = handler.build(count, &data)?;
            println!("Built {} shards from {} bytes", shards, data.len());
        }
        Commands::AddShard => {
            let shards = handler.add_shard()?;
            println!("Rebalanced onto {} shards", shards);
        }
        Commands::RemoveShard => {
            let shards = handler.remove_shard()?;
            println!("Rebalanced onto {} shards", shards);
        }
        Commands::AddReplication => {
            let level = handler.add_replication()?;
            println!("Replication level is now {}", level);
        }
        Commands::RemoveReplication => {
            let level = handler.remove_replication()?;
            println!("Replication level is now {}", level);
        }
        Commands::Sync => {
            let report = handler.sync_replication()?;
            println!(
                "Removed {} orphans, recovered {} primaries, repaired {} replicas",
                report.orphans_removed.len(),
                report.primaries_recovered.len(),
                report.replicas_repaired.len()
            );
        }
        Commands::Info { id: Some(id) } => {
            let range = handler.get_shard_info(&id)?;
            println!("{}", serde_json::to_string_pretty(&range)?);
        }
        Commands::Info { id: None } => {
            let directory = handler.get_all_shard_info();
            println!("{}", serde_json::to_string_pretty(&*directory)?);
        }
        Commands::Stats => {
            print!("{}", handler.stats().report());
        }
        Commands::Dump => {
            use std::io::Write;

            let data = handler.read_dataset()?;
            std::io::stdout().write_all(&data)?;
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,shardvault=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        if let Some(err) = e.downcast_ref::<Error>() {
            if let Some(hint) = err.suggestion() {
                eprintln!("hint: {}", hint);
            }
        }
        return Err(e);
    }
    Ok(())
}
