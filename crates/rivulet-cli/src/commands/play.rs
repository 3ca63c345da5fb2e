//! Play a node description.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rivulet_config::{NodeConfig, RecallRegistry};
use rivulet_core::{AudioNode, Constant, RecallId, RecallKind, RecyclingId, Topology};

#[derive(Args)]
pub struct PlayArgs {
    /// Node description (TOML)
    pub file: PathBuf,

    /// Ticks to run per output
    #[arg(short, long, default_value = "4")]
    pub ticks: u64,

    /// Playback context: playback, sequencer or notation
    #[arg(short, long, default_value = "playback", value_parser = parse_kind)]
    pub kind: RecallKind,

    /// Render a constant level instead of silence
    #[arg(long)]
    pub level: Option<f32>,
}

fn parse_kind(s: &str) -> Result<RecallKind, String> {
    RecallKind::from_name(s).ok_or_else(|| format!("unknown kind '{s}'"))
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let config = NodeConfig::load(&args.file)?;
    let node = config
        .build(&RecallRegistry::new())
        .with_context(|| format!("building '{}'", config.name))?;

    if let Some(level) = args.level {
        node.set_renderer(Constant(level))?;
    }

    let ids = node.recursive_play_init(args.kind.as_kinds())?;
    if ids.is_empty() {
        println!("No output channel to play.");
        return Ok(());
    }

    tracing::info!(
        node = %config.name,
        kind = %args.kind,
        outputs = ids.len(),
        "playing"
    );

    for &id in &ids {
        for _ in 0..args.ticks {
            node.tick(id)?;
        }
    }

    let topology = node.topology()?;
    println!("Played '{}' ({} ticks, {}):", config.name, args.ticks, args.kind);
    println!();
    for &id in &ids {
        print_id(&node, &topology, id)?;
    }

    for id in ids {
        node.remove(id)?;
    }

    Ok(())
}

fn print_id(node: &AudioNode, topology: &Topology, id: RecallId) -> anyhow::Result<()> {
    let state = node.recall_id_state(id)?;
    let instances = node.instances(id)?;
    let names: Vec<_> = instances.iter().map(|i| i.name).collect();

    let anchor = topology
        .channels(state.anchor_direction)
        .iter()
        .find(|c| c.id == state.anchor)
        .with_context(|| format!("{id} lost its anchor channel"))?;

    let mut peak = 0.0_f32;
    if let Some((first, last)) = anchor.recycling_span() {
        for recycling in span(topology, first, last) {
            peak = peak.max(node.recycling_buffer(recycling)?.peak());
        }
    }

    println!(
        "  {} line {:>3}  ticks {:>4}  peak {:.3}  recalls [{}]",
        state.anchor_direction,
        anchor.line,
        state.tick,
        peak,
        names.join(", ")
    );
    Ok(())
}

/// Recyclings from `first` to `last` following the `next` links.
fn span(topology: &Topology, first: RecyclingId, last: RecyclingId) -> Vec<RecyclingId> {
    let mut ids = vec![first];
    let mut current = first;
    while current != last {
        match topology.recycling(current).and_then(|r| r.next) {
            Some(next) => {
                ids.push(next);
                current = next;
            }
            None => break,
        }
    }
    ids
}
