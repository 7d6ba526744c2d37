//! Quiz Arena Server
//!
//! Runs the WebSocket quiz server until Ctrl-C, or a scripted demo game
//! when started with the `demo` argument.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quiz_arena::{
    content::Account,
    game::session::GameError,
    CityCategory, DeterministicRng, EngineConfig, GameConfig, GameEngine, GameServer,
    InMemoryAccounts, InMemoryStore, QuestionBank, ServerConfig, DEFAULT_COUNTDOWN_SECS, VERSION,
};

/// Bank seed used when `QUIZ_BANK_SEED` is unset.
const DEFAULT_BANK_SEED: u64 = 0x5EED;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Quiz Arena Server v{}", VERSION);

    let engine_config = EngineConfig::from_env();
    info!(
        "Scoring: {} ({} points), policy {:?}, provider timeout {:?}",
        engine_config.scoring,
        engine_config.correct_points,
        engine_config.submission_policy,
        engine_config.provider_timeout
    );

    let seed = match std::env::var("QUIZ_BANK_SEED") {
        Ok(raw) => raw.parse::<u64>().with_context(|| format!("invalid QUIZ_BANK_SEED {raw:?}"))?,
        Err(_) => DEFAULT_BANK_SEED,
    };

    let accounts = Arc::new(InMemoryAccounts::new());
    let names = std::env::var("QUIZ_ACCOUNTS").unwrap_or_else(|_| "alice,bob,carol".to_string());
    let mut players = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let account = accounts.register(name).await;
        info!("Registered account {} ({})", account.id, account.display_name);
        players.push(account);
    }

    let engine = Arc::new(
        GameEngine::new(engine_config, Arc::new(QuestionBank::with_builtin(seed)), accounts)
            .with_store(Arc::new(InMemoryStore::new())),
    );

    if std::env::args().nth(1).as_deref() == Some("demo") {
        return demo_game(&engine, &players).await;
    }

    let server = GameServer::new(ServerConfig::from_env(), engine);
    tokio::select! {
        result = server.run() => result.context("server failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

/// Play one game with every registered account guessing at random.
async fn demo_game(engine: &GameEngine, players: &[Account]) -> anyhow::Result<()> {
    info!("=== Starting Demo Game ===");

    let created = engine
        .create_game(GameConfig {
            category: CityCategory::Landmarks,
            total_rounds: 4,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        })
        .await?;
    let game_id = created.game_id;
    info!("Game {}: {} rounds of {}", game_id, created.total_rounds, created.category);

    for player in players {
        engine.join_game(game_id, player.id).await?;
    }

    let mut rng = DeterministicRng::new(12345);
    loop {
        let question = match engine.advance_round(game_id).await {
            Ok(question) => question,
            Err(GameError::SessionEnded) => break,
            Err(e) => return Err(e.into()),
        };
        info!(
            "Round {}/{}: {} [{}]",
            question.round,
            question.total_rounds,
            question.prompt,
            question.options.join(", ")
        );

        // Handing out the last question ends the game
        if question.round == question.total_rounds {
            info!("Last question handed out, game over");
            break;
        }

        for player in players {
            let Some(guess) = rng.choose(&question.options) else {
                continue;
            };
            let delta = engine.submit_answer(game_id, player.id, guess).await?;
            info!("{} answered {:?}: +{}", player.display_name, guess, delta);
        }
    }

    info!("=== Final Scoreboard ===");
    let progress = engine.get_progress(game_id).await?;
    for entry in &progress.ranking {
        info!("#{}: {} - {} points", entry.rank, entry.display_name, entry.score);
    }

    let winners = engine.get_winners(game_id).await?;
    let names: Vec<&str> = winners.iter().map(|w| w.display_name.as_str()).collect();
    info!("Winners: {}", names.join(", "));

    Ok(())
}
