use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use zk_card_engine::proof_manager::BatchProofRequest;
use zk_card_engine::relations::DECK_SIZE;
use zk_card_engine::{Engine, EngineConfig, ScalarField};

const LOG_TARGET: &str = "bin::card_proof_demo";

#[derive(Debug, Parser)]
#[command(name = "card_proof_demo")]
#[command(about = "Run trusted setup for every card relation and prove one hand", long_about = None)]
struct Args {
    /// JSON engine config; defaults apply when omitted
    #[arg(long, env = "CARD_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Seed the deck-generation proof is run against
    #[arg(long, env = "CARD_ENGINE_SEED", default_value = "game-42")]
    seed: String,

    /// Game the shuffle, dealing and commitment proofs are attributed to
    #[arg(long, env = "CARD_ENGINE_GAME_ID", default_value = "g1")]
    game_id: String,

    /// Overrides the config's ceremony quorum
    #[arg(long, env = "CARD_ENGINE_MIN_CONTRIBUTIONS")]
    min_contributions: Option<usize>,

    /// Optional RNG seed for reproducible runs
    #[arg(long, env = "CARD_ENGINE_RNG_SEED")]
    rng_seed: Option<u64>,

    /// JSON batch request to prove after the scripted hand
    #[arg(long, env = "CARD_ENGINE_BATCH")]
    batch: Option<PathBuf>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "CARD_ENGINE_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let config = build_config(&args)?;
    let engine = Engine::new(config).context("failed to build engine")?;
    engine.initialize();

    let published = engine
        .trusted_setup_all()
        .await
        .context("trusted setup failed")?;
    for keys in &published {
        info!(
            target: LOG_TARGET,
            relation = %keys.relation,
            version = keys.version,
            fingerprint = %keys.fingerprint,
            "keys published"
        );
    }

    run_hand(&engine, &args.seed, &args.game_id).await?;

    if let Some(path) = &args.batch {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let request: BatchProofRequest =
            serde_json::from_str(&raw).context("invalid batch request")?;
        let result = engine.proofs().generate_batch_proofs(request).await;
        print_json("batch", &result)?;
    }

    print_json("statistics", &engine.proofs().get_statistics())?;
    Ok(())
}

fn load_dotenv() {
    let manifest_env_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    let installed = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };

    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(min) = args.min_contributions {
        config.min_contributions = min;
    }
    if args.rng_seed.is_some() {
        config.rng_seed = args.rng_seed;
    }
    Ok(config)
}

/// Deck generation, a reversing shuffle, a four-card deal and one commitment.
async fn run_hand(engine: &Engine, seed: &str, game_id: &str) -> Result<()> {
    let proofs = engine.proofs();
    let original: Vec<u64> = (0..DECK_SIZE as u64).collect();
    let shuffled: Vec<u64> = original.iter().rev().copied().collect();
    // Against the identity deck, each card's source position is its value.
    let permutation = shuffled.clone();

    let results = vec![
        proofs.create_deck_generation_proof(seed).await,
        proofs
            .create_card_shuffle_proof(&original, &shuffled, &permutation, game_id)
            .await,
        proofs
            .create_card_dealing_proof(&shuffled, &[0, 1, 2, 3], game_id, Some("player-1"))
            .await,
        proofs
            .create_card_commitment_proof(10, ScalarField::from(777u64), game_id, Some("player-1"))
            .await,
    ];
    for result in &results {
        print_json("proof", result)?;
    }

    let generated: Vec<_> = results.into_iter().filter_map(|r| r.proof).collect();
    let verification = proofs.verify_batch_proofs(&generated).await;
    info!(
        target: LOG_TARGET,
        valid = verification.valid,
        failures = verification.failures.len(),
        "hand verified"
    );
    print_json("verification", &verification)
}

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to render {label}"))?;
    println!("{rendered}");
    Ok(())
}
