//! taxonomy_report - Show how class names map onto landing-safety tiers
//!
//! Prints the tier table with render styles, then the tier every configured
//! detector class resolves to. Extra arguments are classified on the spot.

use anyhow::Result;
use clap::Parser;

use landing_assessor::{LandingConfig, Tier};

#[derive(Parser, Debug)]
#[command(
    name = "taxonomy_report",
    about = "Print the safety taxonomy and the tier of every detector class"
)]
struct Args {
    /// Class names to classify.
    names: Vec<String>,

    /// Skip the per-detector class listing.
    #[arg(long)]
    no_detectors: bool,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config = LandingConfig::load()?;
    let taxonomy = config.taxonomy()?;

    if args.json {
        let detectors: Vec<_> = config
            .detectors
            .iter()
            .filter(|_| !args.no_detectors)
            .map(|d| {
                let classes: Vec<_> = d
                    .adapter
                    .classes
                    .iter()
                    .map(|c| serde_json::json!({ "class": c, "tier": taxonomy.classify(c) }))
                    .collect();
                serde_json::json!({ "id": d.adapter.id, "name": d.adapter.display_name, "classes": classes })
            })
            .collect();
        let queries: Vec<_> = args
            .names
            .iter()
            .map(|n| serde_json::json!({ "class": n, "tier": taxonomy.classify(n) }))
            .collect();
        let entries: Vec<_> = taxonomy
            .entries()
            .map(|(class, tier)| serde_json::json!({ "class": class, "tier": tier }))
            .collect();
        let report = serde_json::json!({
            "taxonomy": entries,
            "detectors": detectors,
            "queries": queries,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("taxonomy_report: {} classes", taxonomy.len());
    for (tier, count) in taxonomy.tier_counts() {
        let style = tier.style();
        println!(
            "  {:<8} {:>3} classes  stroke {:?} w{}  fill {:?} @{:.2}  {}",
            tier,
            count,
            style.stroke_color,
            style.stroke_width,
            style.fill_color,
            style.fill_opacity,
            tier.description()
        );
    }

    if !args.no_detectors {
        for detector in &config.detectors {
            let adapter = &detector.adapter;
            println!();
            println!(
                "{} ({}, threshold {:.2}, max {}, input {})",
                adapter.display_name,
                adapter.id,
                adapter.confidence_threshold,
                adapter.max_detections,
                adapter.input_size
            );
            for tier in Tier::PRIORITY_ORDER {
                let classes: Vec<&str> = adapter
                    .classes
                    .iter()
                    .filter(|c| taxonomy.classify(c) == tier)
                    .map(String::as_str)
                    .collect();
                if !classes.is_empty() {
                    println!("  {:<8} {}", tier, classes.join(", "));
                }
            }
        }
    }

    if !args.names.is_empty() {
        println!();
        for name in &args.names {
            println!("  {:<24} {}", name, taxonomy.classify(name));
        }
    }
    Ok(())
}
