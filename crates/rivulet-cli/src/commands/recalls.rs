//! List recalls command.

use clap::Args;
use rivulet_config::RecallRegistry;

#[derive(Args)]
pub struct RecallsArgs {
    /// Show parameter ranges and defaults
    #[arg(short, long)]
    verbose: bool,
}

pub fn run(args: RecallsArgs) -> anyhow::Result<()> {
    let registry = RecallRegistry::new();

    println!("Available recalls:\n");

    for descriptor in registry.all_recalls() {
        println!("  {:<14} {}", descriptor.id, descriptor.description);

        if args.verbose {
            for param in descriptor.params {
                println!(
                    "    {:<12} {} to {}, default {}",
                    param.name, param.min, param.max, param.default
                );
            }
        }
    }

    println!("\nUse 'rivulet inspect <file>' to see the templates a node description adds.");

    Ok(())
}
