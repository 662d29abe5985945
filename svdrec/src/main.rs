use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use svdrec::cluster::driver::{total_stats, ClusterDriver};
use svdrec::cluster::io::{self, ClusterFormat};
use svdrec::data::handle::SampleStore;
use svdrec::sim::generator::{EventGenerator, GeneratorConfig};
use svdrec::{RecConfig, Result};

#[derive(Parser)]
#[command(name = "svdrec")]
#[command(about = "Strip cluster reconstruction for silicon strip detector readout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Bincode,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Find clusters in events of a sample store
    #[command(group(ArgGroup::new("events").required(true).args(["event", "all"])))]
    Cluster {
        /// Input SQLite sample store
        #[arg(short, long)]
        input: PathBuf,

        /// Single event number
        #[arg(long)]
        event: Option<u32>,

        /// Process every event of the store
        #[arg(long)]
        all: bool,

        /// Output cluster file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Bincode)]
        format: Format,

        /// zstd-compress bincode output
        #[arg(long)]
        compress: bool,

        /// JSON run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        cut_seed: Option<f32>,

        #[arg(long)]
        cut_adjacent: Option<f32>,

        /// Worker threads, overrides the configuration
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Write synthetic events into a new sample store
    Simulate {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 10)]
        events: u32,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// JSON generator configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Cluster {
            input, event, all, output, format, compress, config, cut_seed, cut_adjacent, threads,
        } => {
            let mut rec = match &config {
                Some(path) => RecConfig::load(path)?,
                None => RecConfig::default(),
            };
            if let Some(cut) = cut_seed {
                rec.clusterizer.cut_seed = cut;
            }
            if let Some(cut) = cut_adjacent {
                rec.clusterizer.cut_adjacent = cut;
            }
            if let Some(n) = threads {
                rec.num_threads = n;
            }

            let store = SampleStore::open_read_only(&input)?;
            let noise = store.read_noise()?;
            let events = match (event, all) {
                (Some(n), false) => vec![n],
                _ => store.read_events()?,
            };
            log::info!("{} events from {}, {} calibrated strips", events.len(), input.display(), noise.len());

            let driver = ClusterDriver::new(rec)?;
            let results = driver.cluster_store(&store, &events, &noise)?;
            let total = total_stats(&results);
            log::info!(
                "{} samples, {} candidates, {} merges, {} accepted, {} rejected, {} truncated",
                total.samples, total.candidates, total.merges, total.accepted, total.rejected, total.truncated
            );

            let format = match format {
                Format::Bincode => ClusterFormat::Bincode,
                Format::Json => ClusterFormat::Json,
            };
            io::save(&output, &results, format, compress)?;
            log::info!("clusters written to {}", output.display());
        }
        Commands::Simulate { output, events, seed, config } => {
            let generator_config = match &config {
                Some(path) => serde_json::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))?,
                None => GeneratorConfig::default(),
            };
            let mut store = SampleStore::new(&output)?;
            let mut generator = EventGenerator::new(generator_config, seed)?;
            generator.write(&mut store, events)?;
            log::info!("sample store written to {}", output.display());
        }
    }
    Ok(())
}
