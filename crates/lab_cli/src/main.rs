use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use lab_content::{load_content, load_problems};
use lab_control::{play_cycle, Autoplayer, CycleSummary, SimulatedJudge, SteppingClock};
use lab_core::{PlayerId, UserHandle};
use lab_service::{
    Collaborators, Identity, JsonFileRepository, MemoryRepository, PlayerRepository,
    ProgressionService, StaticProblemCatalog,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "lab_cli", about = "Forge & research progression CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Let the autoplayer play a number of full turn cycles.
    Run {
        #[arg(long, default_value_t = 10)]
        cycles: u32,
        /// RNG seed for prices, growth and judge verdicts. Random if omitted.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "./content")]
        content_dir: String,
        /// Persist player state as JSON here. In-memory if omitted.
        #[arg(long)]
        state_dir: Option<String>,
        /// Rating the simulated judge uses for the autoplayer.
        #[arg(long, default_value_t = 1200.0)]
        skill: f64,
        #[arg(long, default_value = "player_bot")]
        player: String,
        #[arg(long, default_value = "bot")]
        handle: String,
        /// Print each cycle summary as a JSON line instead of a table row.
        #[arg(long)]
        json: bool,
    },
}

struct RunArgs {
    cycles: u32,
    seed: Option<u64>,
    content_dir: String,
    state_dir: Option<String>,
    skill: f64,
    identity: Identity,
    json: bool,
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

async fn run(args: RunArgs) -> Result<()> {
    let content = load_content(&args.content_dir)?;
    let problems = load_problems(&args.content_dir)?;
    let seed = args.seed.unwrap_or_else(rand::random);

    let repository: Arc<dyn PlayerRepository> = match &args.state_dir {
        Some(dir) => Arc::new(
            JsonFileRepository::open(dir)
                .await
                .with_context(|| format!("opening state directory {dir}"))?,
        ),
        None => Arc::new(MemoryRepository::new()),
    };
    let catalog = StaticProblemCatalog::new(problems.clone(), content.difficulty_buckets.clone());
    let content_version = content.content_version.clone();
    let service = ProgressionService::new(
        Arc::new(content),
        Collaborators {
            repository,
            catalog: Arc::new(catalog),
            tracker: Arc::new(SimulatedJudge::new(args.skill, &problems, seed)),
            clock: Arc::new(SteppingClock::new(Utc::now(), Duration::minutes(10))),
        },
        seed,
    );

    println!(
        "Starting run: cycles={} seed={seed} skill={} problems={} content_version={content_version}",
        args.cycles,
        args.skill,
        problems.len(),
    );
    println!("{}", "-".repeat(80));

    let mut autoplayer = Autoplayer;
    for cycle in 1..=args.cycles {
        let summary = play_cycle(&service, &args.identity, &mut autoplayer)
            .await
            .with_context(|| format!("playing cycle {cycle}"))?;
        if args.json {
            let line = serde_json::to_string(&summary).context("encoding cycle summary")?;
            println!("{line}");
        } else {
            print_cycle(cycle, &summary);
        }
        if let Some(rejection) = &summary.rejection {
            println!("Stopped: {}", rejection.message);
            break;
        }
    }

    if !args.json {
        let view = service.state(&args.identity.player).await?;
        println!("{}", "-".repeat(80));
        println!(
            "Done. research={} cash={} capacity={:.2} performance={:.2} rank={:.1}",
            view.completed_research,
            view.ledger.cash,
            view.battery_capacity,
            view.performance,
            view.researcher_rank,
        );
    }
    Ok(())
}

fn print_cycle(cycle: u32, summary: &CycleSummary) {
    let view = &summary.view;
    let solved = match summary.solved {
        Some(true) => "solved",
        Some(false) => "missed",
        None => "-",
    };
    println!(
        "[cycle={cycle:03}]  cash={cash:6}  earned={earned:5}  battery={battery:3}  \
         capacity={capacity:7.2}  performance={performance:7.2}  rank={rank:7.1}  {solved}",
        cash = view.ledger.cash,
        earned = summary.earned,
        battery = view.ledger.battery,
        capacity = view.battery_capacity,
        performance = view.performance,
        rank = view.researcher_rank,
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            cycles,
            seed,
            content_dir,
            state_dir,
            skill,
            player,
            handle,
            json,
        } => {
            run(RunArgs {
                cycles,
                seed,
                content_dir,
                state_dir,
                skill,
                identity: Identity {
                    player: PlayerId::new(player),
                    handle: UserHandle::new(handle),
                },
                json,
            })
            .await?;
        }
    }
    Ok(())
}
