//! Dark Waters demo client
//!
//! Plays a full game between two local players on the in-memory chain:
//! both sides commit boards, run the state and auto-reveal subscriptions,
//! and attack whenever their snapshot says it is their turn. Partway
//! through, one player loses their session key and recovers it from the
//! exported recovery package.

use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dark_waters::{
    chain::{ChainWriter, GameAction, MemoryAccount, MemoryChain},
    codes,
    core::board::{Board, Coord},
    core::felt::{felt_key, Felt},
    proof::commitment::{attack_commitment, commit, random_reveal_nonce, MasterSecret},
    storage::{FileStore, KeyValueStore, MemoryStore},
    sync::{
        spawn_subscription, GamePhase, GameStateSnapshot, GameStateSync, RevealCoordinator,
        SubscriptionHandle,
    },
    vault::SecretVault,
    Deployment, SyncConfig, VERSION,
};

const DEMO_TIMEOUT: Duration = Duration::from_secs(60);

struct Player {
    name: &'static str,
    account: MemoryAccount,
    durable: Arc<dyn KeyValueStore>,
    session: Arc<MemoryStore>,
    vault: SecretVault,
}

impl Player {
    fn new(
        name: &'static str,
        chain: &MemoryChain,
        address: Felt,
        durable: Arc<dyn KeyValueStore>,
    ) -> Self {
        let session = Arc::new(MemoryStore::new());
        let vault = SecretVault::new(durable.clone(), session.clone());
        Self { name, account: chain.account(address), durable, session, vault }
    }

    fn address(&self) -> Felt {
        self.account.address()
    }
}

fn durable_store(name: &str) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match std::env::var("DARK_WATERS_STORE_DIR") {
        Ok(dir) => {
            let path = std::path::Path::new(&dir).join(format!("{name}.json"));
            let store = FileStore::open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            Ok(Arc::new(store))
        }
        Err(_) => Ok(Arc::new(MemoryStore::new())),
    }
}

fn row(y: u8) -> anyhow::Result<Vec<Coord>> {
    (0..10).map(|x| Coord::new(x, y).map_err(Into::into)).collect()
}

async fn attack(player: &Player, game_id: u64, coord: Coord) -> anyhow::Result<()> {
    let nonce = random_reveal_nonce();
    let commit_action =
        GameAction::CommitAttack { game_id, commitment: attack_commitment(coord, &nonce) };
    info!(
        code = codes::TX_EXECUTE,
        player = player.name,
        entrypoint = commit_action.entrypoint(),
        %coord,
        "attacking"
    );
    if let Err(e) = player.account.execute(commit_action).await {
        warn!(
            code = codes::ATTACK_COMMIT_FAILED,
            player = player.name,
            error = %e,
            "attack commit failed"
        );
        return Err(e.into());
    }
    player
        .account
        .execute(GameAction::RevealAttack { game_id, coord, reveal_nonce: nonce })
        .await
        .context("opening attack commitment")?;
    Ok(())
}

/// Attack the next target each time the snapshot hands us the turn.
async fn play(
    player: &Player,
    game_id: u64,
    mut rx: watch::Receiver<Option<GameStateSnapshot>>,
    targets: Vec<Coord>,
    lose_key_after: Option<usize>,
) -> anyhow::Result<Option<GameStateSnapshot>> {
    let mut targets = targets.into_iter();
    let mut answered = 0usize;
    let mut fired = 0usize;

    loop {
        rx.changed().await.context("state subscription stopped")?;
        let Some(snapshot) = rx.borrow_and_update().clone() else {
            continue;
        };
        if snapshot.phase == GamePhase::Finished {
            return Ok(Some(snapshot));
        }
        if !snapshot.is_my_turn || snapshot.reveals.len() < answered {
            continue;
        }

        if lose_key_after == Some(fired) {
            warn!(player = player.name, "session storage lost");
            player.session.clear();
        }

        let Some(target) = targets.next() else {
            bail!("{} ran out of targets", player.name);
        };
        attack(player, game_id, target).await?;
        fired += 1;
        answered = snapshot.reveals.len() + 1;
    }
}

fn start(
    player: &Player,
    chain: &MemoryChain,
    deployment: &Deployment,
    config: &SyncConfig,
    game_id: u64,
) -> (watch::Receiver<Option<GameStateSnapshot>>, SubscriptionHandle, SubscriptionHandle) {
    let state = GameStateSync::new(
        chain.clone(),
        deployment,
        config,
        player.durable.clone(),
        game_id,
        player.address(),
    );
    let rx = state.subscribe();
    let reveals = RevealCoordinator::new(
        chain.clone(),
        player.account.clone(),
        player.vault.clone(),
        deployment,
        config,
        player.durable.clone(),
        game_id,
    )
    .with_game_state(state.subscribe());

    let state_handle = spawn_subscription(state, config.state_poll_interval);
    let reveal_handle = spawn_subscription(reveals, config.reveal_poll_interval);
    (rx, state_handle, reveal_handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")?;

    let deployment = Deployment::from_env();
    // demo pace
    let config = SyncConfig {
        state_poll_interval: Duration::from_millis(150),
        reveal_poll_interval: Duration::from_millis(100),
        ..SyncConfig::from_env()
    };
    info!("Dark Waters v{}", VERSION);
    info!(fingerprint = %deployment.fingerprint(), chain_id = %deployment.chain_id, "deployment");

    let chain = MemoryChain::new(deployment.world_address, deployment.deployed_block);
    let alice = Player::new("alice", &chain, Felt::from(0xa11ceu64), durable_store("alice")?);
    let bob = Player::new("bob", &chain, Felt::from(0xb0bu64), durable_store("bob")?);

    alice.account.execute(GameAction::SpawnGame { opponent: bob.address() }).await?;
    let game_id = chain.latest_game_id().context("spawn produced no game")?;
    info!(
        game_id,
        player1 = %felt_key(&alice.address()),
        player2 = %felt_key(&bob.address()),
        "game spawned"
    );

    let alice_board = Board::from_ships(row(0)?);
    let bob_board = Board::from_ships(row(9)?);
    let mut packages = Vec::new();
    for (player, board) in [(&alice, &alice_board), (&bob, &bob_board)] {
        let secret = MasterSecret::random();
        packages.push(player.vault.store(game_id, &player.address(), board, &secret)?);
        let root = commit(board, &secret);
        player.account.execute(GameAction::CommitBoard { game_id, root }).await?;
        info!(player = player.name, root = %felt_key(&root), "board committed");
    }
    let bob_backup = packages.pop().context("recovery package unavailable")?.to_json()?;

    let (alice_rx, alice_state, alice_reveals) =
        start(&alice, &chain, &deployment, &config, game_id);
    let (bob_rx, bob_state, bob_reveals) = start(&bob, &chain, &deployment, &config, game_id);

    // bob re-imports his backup whenever the vault goes locked
    let recovery = {
        let vault = bob.vault.clone();
        let address = bob.address();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let locked = vault.has_payload(game_id, &address)
                    && vault.load(game_id, &address).is_none();
                if locked && vault.import_recovery_package(&bob_backup).is_some() {
                    info!("bob restored secrets from recovery package");
                }
            }
        })
    };

    let (hits, misses) = (row(9)?, row(5)?);
    let outcome = tokio::time::timeout(DEMO_TIMEOUT, async {
        tokio::try_join!(
            play(&alice, game_id, alice_rx, hits, None),
            play(&bob, game_id, bob_rx, misses, Some(3)),
        )
    })
    .await;
    recovery.abort();

    for handle in [alice_state, alice_reveals, bob_state, bob_reveals] {
        handle.shutdown().await;
    }

    let (alice_final, _) = match outcome {
        Ok(result) => result?,
        Err(_) => bail!("game did not finish within {:?}", DEMO_TIMEOUT),
    };
    if let Some(snapshot) = alice_final {
        info!(
            winner = %snapshot.winner.as_ref().map(felt_key).unwrap_or_default(),
            alice_hits = snapshot.hits_for(&alice.address()),
            bob_hits = snapshot.hits_for(&bob.address()),
            reveals = snapshot.reveals.len(),
            "game over"
        );
    }
    Ok(())
}
