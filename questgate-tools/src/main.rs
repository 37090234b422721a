use std::{fmt, fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use questgate_common::{CardRecord, Goal, GoalId, GoalKind, NullifierSet};
use questgate_engine::{
    evaluate_goal, powers_completed, CardRegistry, DigestProver, EngineConfig, HttpScoreSubmitter,
    JsonGoalCatalog, ProofOrchestrator, ProvingState, UnlockStatus,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "questgate",
    about = "Inspect and prove card-gated quests and powers"
)]
struct Cli {
    /// Engine config file; `QUESTGATE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock status and progress for every quest and its powers.
    Status(StatusArgs),
    /// Show spent signatures from the nullifier store.
    Nullifiers(NullifierArgs),
    /// Prove the cards for one goal and submit them to its leaderboard.
    Prove(ProveArgs),
}

#[derive(Args)]
struct StatusArgs {
    /// Goal catalog; defaults to the configured path.
    #[arg(long)]
    goals: Option<PathBuf>,
    /// Owned card records (JSON array).
    #[arg(long)]
    cards: PathBuf,
    /// Card registry for glyphs; defaults to the configured path when it exists.
    #[arg(long)]
    registry: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct NullifierArgs {
    #[arg(long)]
    kind: Option<GoalKind>,
    #[arg(long, requires = "kind")]
    id: Option<GoalId>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ProveArgs {
    #[arg(long)]
    goals: Option<PathBuf>,
    #[arg(long)]
    cards: PathBuf,
    #[arg(long, default_value_t = GoalKind::Quest)]
    kind: GoalKind,
    #[arg(long)]
    id: GoalId,
    /// Leaderboard base URL; overrides `QUESTGATE_SUBMIT_URL`.
    #[arg(long)]
    submit_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,questgate_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Status(args) => status(&config, args),
        Commands::Nullifiers(args) => nullifiers(&config, args),
        Commands::Prove(args) => prove(&config, args).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = base.with_env(|var| std::env::var(var).ok())?;
    tracing::debug!(
        backend = %config.nullifier_backend,
        goals = %config.goals_path.display(),
        fixed_clock = config.fixed_now.is_some(),
        "configuration loaded"
    );
    Ok(config)
}

fn load_catalog(config: &EngineConfig, goals: Option<PathBuf>) -> Result<JsonGoalCatalog> {
    let path = goals.unwrap_or_else(|| config.goals_path.clone());
    JsonGoalCatalog::from_path(&path)
        .with_context(|| format!("failed to load goals {}", path.display()))
}

fn load_cards(path: &PathBuf) -> Result<Vec<CardRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read cards {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse cards {}", path.display()))
}

fn output<T>(value: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", value);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalReport {
    id: GoalId,
    name: String,
    #[serde(flatten)]
    status: UnlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    glyphs: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    powers: Vec<GoalReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    powers_completed: Option<usize>,
}

#[derive(Serialize)]
struct StatusReport {
    quests: Vec<GoalReport>,
}

impl GoalReport {
    fn new(goal: &Goal, owned: &[CardRecord], registry: Option<&CardRegistry>) -> Self {
        let glyphs = registry.map(|registry| {
            registry
                .collection_glyphs(goal, owned)
                .into_iter()
                .map(|glyph| glyph.glyph)
                .collect::<Vec<_>>()
                .join(" ")
        });
        let powers: Vec<_> = goal
            .powers
            .iter()
            .map(|power| GoalReport::new(power, owned, registry))
            .collect();
        Self {
            id: goal.id,
            name: goal.name.clone(),
            status: evaluate_goal(goal, owned),
            glyphs,
            powers_completed: (!powers.is_empty()).then(|| powers_completed(goal, owned)),
            powers,
        }
    }

    fn write_line(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let lock = if self.status.locked { "locked" } else { "unlocked" };
        write!(
            f,
            "{indent}[{}] {} ({lock}, {}/{})",
            self.id, self.name, self.status.num_cards_collected, self.status.num_cards_total
        )?;
        if let Some(glyphs) = &self.glyphs {
            write!(f, "  {glyphs}")?;
        }
        if let Some(done) = self.powers_completed {
            write!(f, "  powers {done}/{}", self.powers.len())?;
        }
        writeln!(f)?;
        for power in &self.powers {
            power.write_line(f, "    ")?;
        }
        Ok(())
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for quest in &self.quests {
            quest.write_line(f, "")?;
        }
        Ok(())
    }
}

fn status(config: &EngineConfig, args: StatusArgs) -> Result<()> {
    let catalog = load_catalog(config, args.goals)?;
    let owned = load_cards(&args.cards)?;
    let registry = match args.registry {
        Some(path) => Some(
            CardRegistry::from_path(&path)
                .with_context(|| format!("failed to load registry {}", path.display()))?,
        ),
        None if config.registry_path.exists() => {
            Some(CardRegistry::from_path(&config.registry_path)?)
        }
        None => None,
    };

    let report = StatusReport {
        quests: catalog
            .goals(GoalKind::Quest)
            .map(|quest| GoalReport::new(quest, &owned, registry.as_ref()))
            .collect(),
    };
    output(&report, args.json)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NULLIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct NullifierReport(NullifierSet);

impl fmt::Display for NullifierReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in [GoalKind::Quest, GoalKind::Power] {
            for (id, signatures) in self.0.group(kind) {
                writeln!(f, "{kind} {id}: {} spent", signatures.len())?;
                for signature in signatures {
                    writeln!(f, "  {signature}")?;
                }
            }
        }
        Ok(())
    }
}

fn nullifiers(config: &EngineConfig, args: NullifierArgs) -> Result<()> {
    let store = config.open_nullifier_store()?;
    let full = store.load()?;

    let report = match (args.kind, args.id) {
        (Some(kind), Some(id)) => {
            let mut set = NullifierSet::new();
            set.merge(kind, id, full.spent(kind, id));
            set
        }
        (Some(kind), None) => {
            let mut set = NullifierSet::new();
            for (id, signatures) in full.group(kind) {
                set.merge(kind, *id, signatures.iter().cloned());
            }
            set
        }
        _ => full,
    };
    output(&NullifierReport(report), args.json)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROVE
// ═══════════════════════════════════════════════════════════════════════════════

async fn prove(config: &EngineConfig, args: ProveArgs) -> Result<()> {
    let catalog = load_catalog(config, args.goals)?;
    let owned = load_cards(&args.cards)?;
    let Some(goal) = catalog.get(args.kind, args.id) else {
        bail!("{} {} not found", args.kind, args.id);
    };

    let Some(submit_url) = args.submit_url.or_else(|| config.submit_url.clone()) else {
        bail!("no leaderboard configured; pass --submit-url or set QUESTGATE_SUBMIT_URL");
    };
    let submitter = HttpScoreSubmitter::new(submit_url)?;
    let store = config.open_nullifier_store()?;
    let orchestrator =
        ProofOrchestrator::new(DigestProver, submitter, store).with_clock(config.clock());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let listener = |state: &ProvingState| {
        println!("[{:>3.0}%] {}", state.percentage(), state.display_text());
    };
    let outcome = orchestrator
        .run_until_cancelled(goal, &owned, &listener, &cancel)
        .await
        .with_context(|| format!("proof session for {} {} failed", goal.kind, goal.id))?;

    println!(
        "Added {} points. {} card(s) nullified, bundle {}",
        outcome.score_delta, outcome.newly_nullified, outcome.bundle_digest
    );
    Ok(())
}
