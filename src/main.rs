use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use fire_dispatch::{
    config::{DataPaths, SimConfig},
    dataset::Dataset,
    env::FireDispatchEnv,
    evaluation::{evaluate, write_history},
    policy::{NearestAvailable, Policy, RandomAvailable},
};

/// Fire engine dispatch simulator
#[derive(Parser)]
#[command(name = "fire-dispatch", version)]
struct Cli {
    /// TOML config; every field is optional
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the incident history with a baseline policy and print a JSON summary
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, value_enum, default_value_t = PolicyKind::Nearest)]
        policy: PolicyKind,

        /// Seed for the random policy
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Write the dispatch log as CSV
        #[arg(long)]
        history_out: Option<PathBuf>,
    },

    /// Print table sizes and the fleet layout
    Inspect {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args)]
struct DataArgs {
    /// drv_time_osrm_renamed.csv
    #[arg(long)]
    travel_times: Option<PathBuf>,

    /// real_with_dispatch_info.csv
    #[arg(long)]
    incidents: Option<PathBuf>,

    /// station,easting,northing
    #[arg(long)]
    station_xy: Option<PathBuf>,

    /// Station_engine_counts.csv
    #[arg(long)]
    engine_counts: Option<PathBuf>,
}

impl DataArgs {
    fn apply(self, paths: &mut DataPaths) {
        paths.travel_times = self.travel_times.or(paths.travel_times.take());
        paths.incidents = self.incidents.or(paths.incidents.take());
        paths.station_xy = self.station_xy.or(paths.station_xy.take());
        paths.engine_counts = self.engine_counts.or(paths.engine_counts.take());
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyKind {
    Nearest,
    Random,
}

fn load(config: &Option<PathBuf>, data: DataArgs) -> anyhow::Result<(SimConfig, Dataset)> {
    let mut config = match config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };
    data.apply(&mut config.data);

    let dataset = Dataset::load(&config.data).context("Failed to load dataset")?;
    Ok((config, dataset))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            data,
            policy,
            seed,
            history_out,
        } => {
            let (config, dataset) = load(&cli.config, data)?;

            log::info!("Creating environment");
            let mut env = FireDispatchEnv::new(config, dataset);
            let mut policy: Box<dyn Policy> = match policy {
                PolicyKind::Nearest => Box::new(NearestAvailable),
                PolicyKind::Random => Box::new(RandomAvailable::new(seed)),
            };

            let summary = evaluate(&mut env, policy.as_mut());
            env.render();

            if let Some(path) = history_out {
                write_history(&path, &env.sim.dispatch_history)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("Dispatch history written to {}", path.display());
            }

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Inspect { data } => {
            let (_, dataset) = load(&cli.config, data)?;

            println!("incidents: {}", dataset.incidents.len());
            println!(
                "travel time matrix: {} incidents x {} stations",
                dataset.travel_times.incident_count(),
                dataset.travel_times.stations().len()
            );
            println!("engines: {}", dataset.engine_total());
            for (station, count) in dataset.stations_by_engine_count() {
                let location = dataset
                    .station_xy
                    .get(station)
                    .map_or("unknown".to_owned(), |(x, y)| format!("({x:.0}, {y:.0})"));
                println!("  {station}: {count} at {location}");
            }
        }
    }

    Ok(())
}
