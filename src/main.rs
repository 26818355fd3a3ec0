//! pgas-locality CLI - inspect the locality domains of a team layout

use anyhow::{bail, Context, Result};
use clap::Parser;
use pgas_locality::config::{CliArgs, Commands, LocalityConfig, OutputFormat};
use pgas_locality::domain::{DomainTree, FilterMode};
use pgas_locality::team::SoloTeam;
use pgas_locality::unit::{TeamLayout, UnitHardwareInfo, UnitLocalityMap};
use pgas_locality::Locality;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = LocalityConfig::from_cli(&args).map_err(anyhow::Error::msg)?;

    match &args.command {
        Commands::Tree { layout, format } => {
            let locality = load(layout, &config)?;
            print_tree(&locality.tree, *format)?;
        }

        Commands::Hosts { layout } => {
            let locality = load(layout, &config)?;
            locality.topology.print_summary();
        }

        Commands::Scope { layout, scope } => {
            let locality = load(layout, &config)?;
            for tag in locality.domains_at_scope(*scope)? {
                let node = locality.find(tag.as_str())?;
                println!("{}  units={:?}", tag, node.unit_ids);
            }
        }

        Commands::Filter {
            layout,
            keep,
            remove,
            tags,
            format,
        } => {
            let mode = match (keep, remove) {
                (true, false) => FilterMode::Keep,
                (false, true) => FilterMode::Remove,
                _ => bail!("exactly one of --keep and --remove is required"),
            };
            let locality = load(layout, &config)?;
            let filtered = locality.filter(tags, mode)?;
            print_tree(&filtered, *format)?;
        }

        Commands::Split { layout, scope, parts } => {
            let locality = load(layout, &config)?;
            let groups = locality.tree.split_at_scope(*scope, *parts)?;
            for (i, group) in groups.iter().enumerate() {
                let tags: Vec<&str> = group.iter().map(|t| t.as_str()).collect();
                println!("group {}: {}", i, tags.join(" "));
            }
        }

        Commands::Detect { format } => {
            let info = UnitHardwareInfo::detect();
            match format {
                OutputFormat::Text => info.print_summary(),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
            }
        }
    }

    Ok(())
}

/// Build the locality of a layout file as seen from its first unit
fn load(path: &Path, config: &LocalityConfig) -> Result<Locality> {
    let layout = TeamLayout::from_json_file(path)?;
    layout.units.validate(config.max_host_len)?;

    let team = SoloTeam::new(layout.team, layout.units.num_units());
    tracing::info!(
        team = layout.team,
        units = layout.units.num_units(),
        modules = layout.modules.len(),
        "loaded team layout"
    );

    Locality::build_with_modules(&team, &layout.units, &layout.modules, config)
        .with_context(|| format!("building locality of {}", path.display()))
}

fn print_tree(tree: &DomainTree, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => tree.print_summary(),
        OutputFormat::Json => println!("{}", tree.to_json_pretty()?),
    }
    Ok(())
}
