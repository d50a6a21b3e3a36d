//! Power Grid Game Server
//!
//! Runs the WebSocket server, or with `demo` plays a scripted table
//! and checks that a replay lands on the same state hash.

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use powergrid::{
    VERSION,
    game::{
        bot::play_rounds,
        events::GameEventData,
        state::{MatchConfig, MatchState},
        PlayerId,
    },
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Power Grid Server v{}", VERSION);

    if std::env::args().nth(1).as_deref() == Some("demo") {
        return demo_match();
    }

    let config = ServerConfig::from_env();
    info!(
        bind = %config.bind_addr,
        turn_timeout = ?config.session.turn_timeout,
        max_players = config.session.match_config.max_players,
        "Starting server"
    );
    let server = GameServer::new(config);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
            server.shutdown();
        }
    }

    Ok(())
}

const DEMO_ROUNDS: u32 = 5;

fn demo_table(match_id: [u8; 16]) -> anyhow::Result<MatchState> {
    let mut state = MatchState::new(match_id, MatchConfig::default());
    for i in 1..=4u8 {
        state.add_player(PlayerId::new([i; 16]), &format!("bot{i}"))?;
    }
    state.start_match()?;
    Ok(state)
}

/// Play a scripted match and replay it.
fn demo_match() -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let match_id = [1u8; 16];
    let mut state = demo_table(match_id)?;
    info!("Match ID: {}", hex::encode(match_id));
    info!("RNG Seed: {}", state.rng_seed);

    let moves = play_rounds(&mut state, DEMO_ROUNDS)?;

    for event in state.take_events() {
        match &event.data {
            GameEventData::AuctionWon { player_id, plant, price, .. } => {
                info!("Round {}: {} bought plant {} for {}", event.round, player_id, plant, price);
            }
            GameEventData::PhaseChanged { new_phase, .. } => {
                info!("Round {}: phase {:?}", event.round, new_phase);
            }
            _ => {}
        }
    }

    info!(
        "=== Table After {} Rounds ({} moves, {} plants left in deck) ===",
        DEMO_ROUNDS,
        moves,
        state.market.deck_size()
    );
    for id in &state.player_order {
        if let Some(player) = state.players.get(id) {
            info!(
                "{}: money {}, plants {:?}, cities {}",
                player.name,
                player.money,
                player.plants.iter().map(|p| p.market_cost).collect::<Vec<_>>(),
                state.cities_of(id)
            );
        }
    }

    let hash = state.compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let mut replay = demo_table(match_id)?;
    play_rounds(&mut replay, DEMO_ROUNDS)?;
    let replay_hash = replay.compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }
    Ok(())
}
