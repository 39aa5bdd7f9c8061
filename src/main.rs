//! evo-stream CLI - Evolve actors in a synthetic arena from JSON configuration.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::prelude::*;

use evo_stream::{
    compute::{
        SpeciesRegistry, WeightedAggregator,
        evolution::{JsonArchive, PopulationStore, gene_distance},
    },
    schema::{
        ArenaConfig, DEATH_AT_TARGET, EvalId, GeneBounds, MEMBER_COUNT, MetricBundle, SpeciesId,
    },
};

/// Proximity above which an actor counts as on target.
const ON_TARGET: f64 = 0.9;

/// One live actor.
struct Actor {
    genes: Vec<f64>,
    eval: EvalId,
    age: u64,
    on_target: bool,
}

/// Actors of one species chasing a hidden target genotype.
struct Lane {
    id: SpeciesId,
    name: String,
    bounds: Vec<GeneBounds>,
    target: Vec<f64>,
    actors: Vec<Actor>,
    deaths: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <arena.json> [ticks]", args[0]);
        eprintln!();
        eprintln!("Evolve actor parameters in a synthetic arena.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  arena.json  Path to arena configuration file");
        eprintln!("  ticks       Number of simulation ticks (overrides the config)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let mut config: ArenaConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });
    if let Some(ticks) = args.get(2).and_then(|s| s.parse().ok()) {
        config.ticks = ticks;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    let registry = match &config.save_dir {
        Some(dir) => {
            let archive = JsonArchive::new(dir).unwrap_or_else(|e| {
                eprintln!("Error opening save directory {}: {}", dir.display(), e);
                std::process::exit(1);
            });
            let store: Arc<dyn PopulationStore> = Arc::new(archive);
            SpeciesRegistry::with_store(store)
        }
        None => SpeciesRegistry::new(),
    };

    for entry in &config.species {
        let aggregator = WeightedAggregator::from_config(entry.fitness.clone());
        if let Err(e) = registry.register(entry.species.clone(), Arc::new(aggregator)) {
            eprintln!("Error registering '{}': {}", entry.species.name, e);
            std::process::exit(1);
        }
    }
    if let Err(e) = registry.start() {
        eprintln!("Error starting engines: {}", e);
        std::process::exit(1);
    }

    println!("evo-stream Arena");
    println!("================");
    println!("Species: {}", config.species.len());
    println!("Actors per species: {}", config.actors_per_species);
    println!("Lifetime: {} ticks", config.lifetime_ticks);
    println!("dt: {}", config.dt);
    println!("Ticks: {}", config.ticks);
    println!();

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut lanes: Vec<Lane> = config
        .species
        .iter()
        .map(|entry| {
            let bounds = entry.species.bounds.clone();
            let target = bounds
                .iter()
                .map(|b| {
                    if b.span() > 0.0 {
                        rng.gen_range(b.min..=b.max)
                    } else {
                        b.min
                    }
                })
                .collect();
            Lane {
                id: entry.species.id,
                name: entry.species.name.clone(),
                bounds,
                target,
                actors: Vec::with_capacity(config.actors_per_species),
                deaths: 0,
            }
        })
        .collect();

    for lane in &mut lanes {
        for _ in 0..config.actors_per_species {
            let actor = spawn(&registry, lane.id, &mut rng, config.lifetime_ticks);
            lane.actors.push(actor);
        }
    }

    println!("Running arena...");
    let start = Instant::now();
    let ticks = config.ticks;

    for tick in 0..ticks {
        let mut context: HashMap<String, f64> = HashMap::new();
        context.insert("difficulty".to_string(), tick as f64 / ticks as f64);

        for lane in &mut lanes {
            for slot in 0..lane.actors.len() {
                let actor = &mut lane.actors[slot];
                let noise: f64 = rng.gen_range(-0.02..0.02);
                let proximity =
                    (1.0 - gene_distance(&actor.genes, &lane.target, &lane.bounds) + noise)
                        .clamp(0.0, 1.0);
                actor.on_target = proximity > ON_TARGET;

                let mut sample = MetricBundle::with_capacity(2);
                sample.insert("proximity".to_string(), proximity);
                sample.insert("on_target".to_string(), f64::from(u8::from(actor.on_target)));
                report(registry.collect_metrics(lane.id, actor.eval, &sample, config.dt));

                actor.age += 1;
                if actor.age >= config.lifetime_ticks {
                    let mut death = MetricBundle::with_capacity(2);
                    death.insert(
                        DEATH_AT_TARGET.to_string(),
                        f64::from(u8::from(actor.on_target)),
                    );
                    death.insert(MEMBER_COUNT.to_string(), config.actors_per_species as f64);
                    report(registry.complete_tracking(lane.id, actor.eval, &death, Some(&context)));

                    lane.deaths += 1;
                    lane.actors[slot] = spawn(&registry, lane.id, &mut rng, config.lifetime_ticks);
                }
            }
        }

        // Let engine tasks run between ticks.
        tokio::task::yield_now().await;

        // Print progress every 10%
        if (tick + 1) % (ticks / 10).max(1) == 0 {
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Tick {}/{}: {:.1} ticks/s",
                tick + 1,
                ticks,
                (tick + 1) as f32 / elapsed
            );
            for lane in &lanes {
                print_lane(&registry, lane);
            }
        }
    }

    let elapsed = start.elapsed();
    registry.shutdown().await;

    println!();
    println!("Final state:");
    for lane in &lanes {
        print_lane(&registry, lane);
        if let Ok(Some(best)) = registry.best(lane.id) {
            let genes: Vec<String> = best.data.iter().map(|g| format!("{:.3}", g)).collect();
            let target: Vec<String> = lane.target.iter().map(|g| format!("{:.3}", g)).collect();
            println!("    best genes:   [{}]", genes.join(", "));
            println!("    target genes: [{}]", target.join(", "));
        }
    }

    if config.save_dir.is_some() {
        match registry.save_all() {
            Ok(()) => println!("Populations saved"),
            Err(e) => eprintln!("Error saving populations: {}", e),
        }
    }

    println!();
    println!(
        "Time: {:.2}s ({:.1} ticks/s)",
        elapsed.as_secs_f32(),
        ticks as f32 / elapsed.as_secs_f32()
    );
}

/// Sample a genotype and start tracking it, staggering ages so deaths spread out.
fn spawn(registry: &SpeciesRegistry, id: SpeciesId, rng: &mut StdRng, lifetime: u64) -> Actor {
    let (genes, eval) = registry.sample(id).unwrap_or_else(|e| {
        eprintln!("Error sampling {}: {}", id, e);
        std::process::exit(1);
    });
    report(registry.begin_tracking(id, eval));
    Actor {
        genes,
        eval,
        age: rng.gen_range(0..lifetime),
        on_target: false,
    }
}

fn report<T, E: std::fmt::Display>(result: Result<T, E>) {
    if let Err(e) = result {
        log::warn!("{}", e);
    }
}

fn print_lane(registry: &SpeciesRegistry, lane: &Lane) {
    let Ok(stats) = registry.stats(lane.id) else {
        return;
    };
    let Some(tracked) = registry.get(lane.id) else {
        return;
    };
    let metrics = tracked.engine.metrics();
    println!(
        "    {}: gen={}, best={:.4}, avg={:.4}, diversity={:.3}, deaths={}, dropped={}",
        lane.name,
        tracked.engine.generation(),
        stats.best,
        stats.average,
        stats.diversity.unwrap_or(0.0),
        lane.deaths,
        metrics.outcomes_dropped
    );
}

fn print_example_config() {
    let config = ArenaConfig::default();

    println!("Example configuration (arena.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
