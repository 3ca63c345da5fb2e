//! Inspect a node description.

use std::path::PathBuf;

use clap::Args;
use rivulet_config::{NodeConfig, RecallRegistry};
use rivulet_core::{Direction, Topology};

#[derive(Args)]
pub struct InspectArgs {
    /// Node description (TOML)
    pub file: PathBuf,

    /// Also list every channel line
    #[arg(short, long)]
    pub lines: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let config = NodeConfig::load(&args.file)?;
    let node = config.build(&RecallRegistry::new())?;
    let topology = node.topology()?;

    println!("Node: {}", args.file.display());
    println!();
    println!("  Name:           {}", topology.name);
    if let Some(description) = &config.description {
        println!("  Description:    {description}");
    }
    println!("  Flags:          {}", topology.flags);
    println!("  Sample rate:    {} Hz", topology.sample_rate);
    println!("  Buffer size:    {} frames", topology.buffer_size);
    println!("  Audio channels: {}", topology.audio_channels);
    println!("  Input pads:     {}", topology.input_pads);
    println!("  Output pads:    {}", topology.output_pads);
    println!("  Recyclings:     {}", topology.recycling_count());

    for direction in Direction::BOTH {
        print_side(&topology, direction, args.lines);
    }

    let templates = node.templates()?;
    println!();
    println!("Templates ({}):", templates.len());
    for template in &templates {
        let kinds: Vec<_> = template.kinds.iter().map(|k| k.name()).collect();
        println!(
            "  {:<14} list={:<7} scope={:<8} kinds={}",
            template.name,
            template.list.name(),
            template.scope.name(),
            kinds.join(",")
        );
    }

    let notation = node.notation()?;
    let notes: usize = notation.iter().map(|n| n.notes().len()).sum();
    if notes > 0 {
        println!();
        println!("Notes: {notes}");
        for track in &notation {
            for note in track.notes() {
                println!(
                    "  channel {}: x {}..{} pad {}",
                    track.audio_channel, note.x0, note.x1, note.y
                );
            }
        }
    }

    let lanes = node.automation()?;
    if !lanes.is_empty() {
        println!();
        println!("Automation ({})", lanes.len());
        for lane in &lanes {
            println!(
                "  channel {}: {} ({} points)",
                lane.audio_channel,
                lane.control,
                lane.points().len()
            );
        }
    }

    Ok(())
}

fn print_side(topology: &Topology, direction: Direction, lines: bool) {
    println!();
    println!("{} ({} lines):", direction, topology.line_count(direction));

    for audio_channel in 0..topology.audio_channels {
        let chain = topology.recycling_chain(direction, audio_channel);
        let chain: Vec<_> = chain.iter().map(|id| id.index().to_string()).collect();
        println!("  audio channel {audio_channel}: recyclings [{}]", chain.join(" "));
    }

    if !lines {
        return;
    }

    for channel in topology.channels(direction) {
        let span = match channel.recycling_span() {
            Some((first, last)) => format!("{}..={}", first.index(), last.index()),
            None => "-".to_string(),
        };
        println!(
            "    line {:>3}  pad {:>3}  audio {:>2}  span {:<9} {}",
            channel.line,
            channel.pad,
            channel.audio_channel,
            span,
            if channel.owns_recycling { "own" } else { "" }
        );
    }
}
