//! gymkit CLI - inspect robot descriptions and run registered environments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gymkit_physics::{derive_impulses, Action, PhysicsWorld, Registry, RobotEnv, DEFAULT_TIMESTEP};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gymkit")]
#[command(about = "Robot-description tools and Rapier-backed gym environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print initial velocities, masses and ranges of a description as JSON
    Inspect {
        /// Path to the description document
        file: PathBuf,
    },
    /// Derive the initial impulses of a description
    Impulses {
        /// Path to the description document
        file: PathBuf,
        /// Timestep the impulses are applied over, in seconds
        #[arg(long, default_value_t = DEFAULT_TIMESTEP)]
        dt: f64,
    },
    /// List registered environments
    List {
        /// Path to the registry TOML file
        registry: PathBuf,
    },
    /// Reset an environment and step it with zero actions
    Run {
        /// Path to the registry TOML file
        registry: PathBuf,
        /// Environment id
        id: String,
        /// Number of environment steps
        #[arg(short, long, default_value_t = 10)]
        steps: u32,
        /// Random seed recorded for the episode
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { file } => inspect(&file)?,
        Commands::Impulses { file, dt } => impulses(&file, dt)?,
        Commands::List { registry } => list(&registry)?,
        Commands::Run {
            registry,
            id,
            steps,
            seed,
        } => run(&registry, &id, steps, seed)?,
    }

    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let description = gymkit_mjcf::load_description(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    println!("{}", description.initial_state.to_json()?);

    let model = &description.model;
    eprintln!("model: {}", model.name);
    eprintln!("  Bodies: {}", model.bodies.len());
    eprintln!("  Joints: {}", model.joint_names().len());
    for body in &model.bodies {
        eprintln!(
            "  {} (parent: {}, geoms: {}, estimated mass: {:.3})",
            body.name,
            body.parent.as_deref().unwrap_or("-"),
            body.geoms.len(),
            gymkit_physics::estimate_mass(body)
        );
    }

    Ok(())
}

fn impulses(file: &Path, dt: f64) -> Result<()> {
    let description = gymkit_mjcf::load_description(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let state = &description.initial_state;

    let world = PhysicsWorld::from_model(&description.model, &state.link_masses)?;
    let impulses = derive_impulses(
        &state.initial_velocities,
        &state.link_masses,
        world.part_indices(),
        &world,
        dt,
    )?;

    let sorted: BTreeMap<_, _> = impulses.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&sorted)?);
    Ok(())
}

fn list(path: &Path) -> Result<()> {
    let registry = Registry::load(path)?;
    for id in registry.ids() {
        let spec = registry.spec(id)?;
        let threshold = spec
            .reward_threshold
            .map(|t| format!("{t}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{id}\t{}\tmax_steps={}\treward_threshold={threshold}",
            spec.model.display(),
            spec.max_episode_steps
        );
    }
    Ok(())
}

fn run(path: &Path, id: &str, steps: u32, seed: Option<u64>) -> Result<()> {
    let registry = Registry::load(path)?;
    let mut env = RobotEnv::from_registry(&registry, id)?;
    if let Some(seed) = seed {
        env.seed(seed);
    }

    tracing::info!(env = id, steps, seed = ?env.current_seed(), "running environment");
    let (_, logs) = env.reset()?;
    print_logs(&logs);

    let zeros = Action::Torque(vec![0.0; env.action_dim()]);
    let mut total = 0.0;
    for _ in 0..steps {
        let result = env.step(&zeros);
        total += result.reward;
        print_logs(&result.logs);
        if result.terminated || result.truncated {
            break;
        }
    }

    println!("steps: {}, return: {total:.3}", env.current_step());
    Ok(())
}

fn print_logs(logs: &[Vec<String>]) {
    for line in logs.iter().flatten() {
        println!("{line}");
    }
}
