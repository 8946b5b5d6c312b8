#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for inspecting how an incident export lands on the map.
//!
//! ```text
//! incident_map --input incidents.json buckets
//! incident_map --input incidents.json clusters [--zoom 10]
//! incident_map --input incidents.json drill --key 51.660770,39.200280
//! incident_map --input incidents.json drill --cluster 0 [--zoom 10]
//! incident_map --input incidents.json focus --incident 42
//! ```
//!
//! Everything runs against the in-memory renderer and a virtual clock, so
//! the output is deterministic. `--config` (or `INCIDENT_MAP_CONFIG`)
//! points at a TOML file overriding the engine defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use incident_map_incident_models::{Incident, IncidentId};
use incident_map_map::style::{resolve_cluster_preset, resolve_marker_style};
use incident_map_map::{
    FocusOutcome, FrameScheduler, InMemoryRenderer, Interaction, LocationBucket, LocationIndex,
    ManualScheduler, MapRenderer, MapView, resolve_config,
};
use incident_map_map_models::{BucketKey, MapConfig, MapEvent};
use incident_map_source::{IncidentSource, JsonFileSource};

type View = MapView<InMemoryRenderer, ManualScheduler>;
type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "incident_map",
    about = "Inspect incident map buckets, clusters, drill-downs and focus animations"
)]
struct Cli {
    /// Incident JSON export (a bare array or a `{"results": [...]}` page)
    #[arg(long, short)]
    input: PathBuf,

    /// TOML config file (defaults to `$INCIDENT_MAP_CONFIG`, then built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every location bucket with its marker style
    Buckets,
    /// List the clusters the in-memory renderer forms and their colors
    Clusters {
        /// Zoom level (defaults to the configured viewport zoom)
        #[arg(long)]
        zoom: Option<u8>,
    },
    /// Show what clicking a marker or a cluster resolves to
    Drill {
        /// Location key of the marker, `<lat>,<lng>`
        #[arg(long, conflicts_with = "cluster", required_unless_present = "cluster")]
        key: Option<BucketKey>,
        /// Position of the cluster in the `clusters` listing
        #[arg(long)]
        cluster: Option<usize>,
        /// Zoom level used for clustering
        #[arg(long)]
        zoom: Option<u8>,
    },
    /// Simulate the focus animation on one incident
    Focus {
        /// Incident ID
        #[arg(long)]
        incident: i64,
        /// Virtual frame interval in milliseconds
        #[arg(long, default_value = "16")]
        frame_ms: u64,
    },
}

fn main() -> CliResult {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref())?;
    let source = JsonFileSource::new(&cli.input);
    let incidents = source.incidents()?;
    log::info!(
        "Loaded {} incidents from {}",
        incidents.len(),
        source.id()
    );

    match cli.command {
        Commands::Buckets => print_buckets(&incidents, &config),
        Commands::Clusters { zoom } => {
            let mut view = mount(incidents, config)?;
            zoom_to(&mut view, zoom)?;
            print_clusters(&mut view)?;
        }
        Commands::Drill { key, cluster, zoom } => {
            let mut view = mount(incidents, config)?;
            zoom_to(&mut view, zoom)?;
            run_drill(&mut view, key, cluster)?;
        }
        Commands::Focus { incident, frame_ms } => {
            let id = IncidentId(incident);
            let Some(target) = incidents.iter().find(|i| i.id == id).cloned() else {
                return Err(format!("Incident not found: {id}").into());
            };
            let mut view = mount(incidents, config)?;
            run_focus(&mut view, &target, Duration::from_millis(frame_ms.max(1)))?;
        }
    }

    Ok(())
}

fn mount(incidents: Vec<Incident>, config: MapConfig) -> CliResult<View> {
    let renderer = InMemoryRenderer::new(config.cluster.radius_px);
    let mut view = MapView::new(renderer, ManualScheduler::new(), config);
    view.set_incidents(incidents);

    if !view.mount() {
        return Err(view.notice().unwrap_or("map unavailable").into());
    }
    if let Some(notice) = view.notice() {
        log::warn!("{notice}");
    }
    Ok(view)
}

fn zoom_to(view: &mut View, zoom: Option<u8>) -> CliResult {
    let Some(zoom) = zoom else {
        return Ok(());
    };
    let event = view.renderer_mut().zoom_to(zoom)?;
    if let Some(event) = view.renderer().deliver(event) {
        view.handle_event(event);
    }
    Ok(())
}

fn print_buckets(incidents: &[Incident], config: &MapConfig) {
    let index = LocationIndex::build(incidents);

    println!("{:<24} {:<7} {:<6} TOOLTIP", "LOCATION", "PRESET", "COUNT");
    println!("{}", "-".repeat(80));
    for bucket in index.buckets() {
        let style = resolve_marker_style(bucket, config.style_policy);
        println!(
            "{:<24} {:<7} {:<6} {}",
            bucket.key().to_string(),
            style.preset.as_ref(),
            bucket.len(),
            style.tooltip
        );
    }

    let placed = index.buckets().map(LocationBucket::len).sum::<usize>();
    println!(
        "\n{} location(s), {placed} placement(s) from {} incident(s)",
        index.len(),
        incidents.len()
    );
}

fn print_clusters(view: &mut View) -> CliResult {
    let clusters = view.renderer_mut().clusters()?;
    let Some(session) = view.session() else {
        return Ok(());
    };

    println!("{:<4} {:<7} {:<8} LOCATIONS", "#", "PRESET", "MEMBERS");
    println!("{}", "-".repeat(80));
    for (position, cluster) in clusters.iter().enumerate() {
        let keys: Vec<BucketKey> = cluster
            .members
            .iter()
            .filter_map(|marker| session.key_for_marker(*marker))
            .collect();
        let preset = view.renderer().cluster_preset(cluster.id).unwrap_or_else(|| {
            resolve_cluster_preset(
                keys.iter()
                    .filter_map(|key| session.marker_for(key))
                    .map(|placed| placed.preset),
            )
        });
        let locations: Vec<String> = keys.iter().map(ToString::to_string).collect();
        println!(
            "{:<4} {:<7} {:<8} {}",
            position,
            preset.as_ref(),
            cluster.members.len(),
            locations.join(" ")
        );
    }

    println!(
        "\n{} cluster(s) over {} marker(s)",
        clusters.len(),
        session.marker_count()
    );
    Ok(())
}

fn run_drill(view: &mut View, key: Option<BucketKey>, cluster: Option<usize>) -> CliResult {
    let event = match (key, cluster) {
        (Some(key), _) => {
            let Some(placed) = view.session().and_then(|s| s.marker_for(&key)) else {
                return Err(format!("No marker at {key}").into());
            };
            MapEvent::MarkerClicked(placed.marker)
        }
        (None, Some(position)) => {
            let clusters = view.renderer_mut().clusters()?;
            let count = clusters.len();
            let Some(cluster) = clusters.get(position) else {
                return Err(format!("No cluster #{position} ({count} clusters)").into());
            };
            MapEvent::ClusterClicked(cluster.id)
        }
        (None, None) => return Err("Pass --key or --cluster".into()),
    };

    match view.handle_event(event) {
        Some(Interaction::Select(incident)) => {
            println!("Select:");
            print_incident(&incident);
        }
        Some(Interaction::DrillDown(list)) => {
            println!("Drill-down ({} incidents):", list.len());
            for incident in &list {
                print_incident(incident);
            }
        }
        None => println!("Nothing to show"),
    }
    Ok(())
}

fn print_incident(incident: &Incident) {
    let status = incident.status_name().unwrap_or("-");
    println!(
        "  #{:<8} {:<10} {:<14} {}",
        incident.id.0,
        incident.category().as_ref(),
        status,
        incident.title
    );
}

fn run_focus(view: &mut View, target: &Incident, frame: Duration) -> CliResult {
    match view.focus(target) {
        FocusOutcome::Started => {}
        FocusOutcome::NoTarget => {
            println!("Incident {} has no location on the map", target.id);
            return Ok(());
        }
        FocusOutcome::Failed => {
            return Err(format!("Focus on incident {} failed", target.id).into());
        }
    }

    let mut state = view.highlight_state();
    println!("{:>8} {state}", "0ms");

    let mut frames = 0_usize;
    while !view.scheduler().is_idle() {
        frames += view.advance(frame);
        let next = view.highlight_state();
        if next != state {
            let at = view.scheduler().now().as_millis();
            println!("{:>8} {next}", format!("{at}ms"));
            state = next;
        }
    }

    println!("\n{frames} callback(s) dispatched");
    if let Some(marker) = view.renderer().open_callout()
        && let Some(spec) = view.renderer().marker(marker)
    {
        println!("Callout:");
        for line in &spec.callout {
            println!("  {line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drill_reports_missing_targets_as_errors() {
        let mut view = mount(vec![], MapConfig::default()).unwrap();
        let key = BucketKey::from_degrees(51.66, 39.2).unwrap();

        assert!(run_drill(&mut view, Some(key), None).is_err());
        assert!(run_drill(&mut view, None, Some(3)).is_err());
        assert!(run_drill(&mut view, None, None).is_err());

        drop(view);
    }
}
