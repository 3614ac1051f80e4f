//! # Roadweave CLI
//!
//! Command-line interface for the roadweave library: inspect, convert and
//! query OpenDRIVE road networks.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, warn};

use roadweave::boundary;
use roadweave::connect;
use roadweave::error::Diagnostic;
use roadweave::parse;
use roadweave::resolve;
use roadweave::transform;

#[derive(Parser)]
#[command(name = "roadweave")]
#[command(about = "OpenDRIVE road-network reconstruction and track queries")]
#[command(long_about = "Reconstructs road networks from OpenDRIVE files:
  roadweave info town.xodr                 # Document summary
  roadweave convert town.xodr town.json    # XML to JSON entity model
  roadweave pose town.xodr -r 12 -s 40.5   # Track to inertial transform
  roadweave boundaries town.xodr           # Resolve lane boundaries
  roadweave connections town.xodr 12       # Reachable roads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a road-network document
    Info {
        /// Input file (.xodr or .json)
        input: PathBuf,
    },
    /// Convert between the XML document and the JSON entity model
    Convert {
        /// Input file (.xodr or .json)
        input: PathBuf,
        /// Output JSON file
        output: PathBuf,
    },
    /// Transform track coordinates into an inertial pose
    Pose {
        /// Input file (.xodr or .json)
        input: PathBuf,
        /// Road id
        #[arg(short, long)]
        road: String,
        /// Arclength along the reference line
        #[arg(short)]
        s: f64,
        /// Lateral offset, positive left
        #[arg(short, default_value_t = 0.0)]
        t: f64,
        /// Height above the road surface
        #[arg(long, default_value_t = 0.0)]
        height: f64,
    },
    /// Resolve lane boundaries for the whole network
    Boundaries {
        /// Input file (.xodr or .json)
        input: PathBuf,
        /// Write the resolved boundaries as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the road ids reachable from a road
    Connections {
        /// Input file (.xodr or .json)
        input: PathBuf,
        /// Road id
        road: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stderr);
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Err(e) = run(cli.command) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Info { input } => info(&input),
        Command::Convert { input, output } => convert(&input, &output),
        Command::Pose { input, road, s, t, height } => pose(&input, &road, s, t, height),
        Command::Boundaries { input, output } => boundaries(&input, output.as_deref()),
        Command::Connections { input, road } => connections(&input, &road),
    }
}

fn load(input: &std::path::Path) -> Result<roadweave::RoadNetwork> {
    parse::load(input).with_context(|| format!("loading {}", input.display()))
}

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        warn!("{diagnostic}");
    }
}

fn info(input: &std::path::Path) -> Result<()> {
    let network = load(input)?;
    let total_length: f64 = network.roads.values().map(|r| r.length).sum();

    println!("roads:       {}", network.roads.len());
    println!("length:      {total_length:.1} m");
    println!("junctions:   {}", network.junctions.len());
    println!("signals:     {}", network.signals.len());
    println!("controllers: {}", network.controllers.len());
    Ok(())
}

fn convert(input: &std::path::Path, output: &std::path::Path) -> Result<()> {
    let network = load(input)?;
    let json = parse::to_json(&network)?;
    std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
    println!("wrote {} roads to {}", network.roads.len(), output.display());
    Ok(())
}

fn pose(input: &std::path::Path, road_id: &str, s: f64, t: f64, h: f64) -> Result<()> {
    let network = load(input)?;
    let road = network
        .roads
        .get(road_id)
        .with_context(|| format!("no road with id '{road_id}'"))?;

    let pose = transform::track_to_inertial(road, s, t, h)?;
    println!(
        "position: ({:.4}, {:.4}, {:.4})",
        pose.position.x, pose.position.y, pose.position.z
    );
    println!(
        "rotation: roll {:.6} pitch {:.6} yaw {:.6}",
        pose.rotation.roll, pose.rotation.pitch, pose.rotation.yaw
    );
    Ok(())
}

fn boundaries(input: &std::path::Path, output: Option<&std::path::Path>) -> Result<()> {
    let network = load(input)?;

    let (resolved, resolve_diagnostics) = resolve::resolve_network(&network);
    report(&resolve_diagnostics);

    let (boundaries, lane_diagnostics) = boundary::network_boundaries(&network, &resolved);
    report(&lane_diagnostics);

    let strips: usize = boundaries
        .values()
        .flatten()
        .map(|section| section.left.len() + section.right.len())
        .sum();
    println!(
        "resolved {} roads, {} lane strips, {} diagnostics",
        boundaries.len(),
        strips,
        resolve_diagnostics.len() + lane_diagnostics.len()
    );

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&boundaries)?;
        std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
        println!("wrote boundaries to {}", output.display());
    }
    Ok(())
}

fn connections(input: &std::path::Path, road_id: &str) -> Result<()> {
    let network = load(input)?;
    if !network.has_road(road_id) {
        bail!("no road with id '{road_id}'");
    }
    for id in connect::connecting_road_ids(&network, road_id)? {
        println!("{id}");
    }
    Ok(())
}
