//! WebSocket Game Server
//!
//! Async WebSocket server for quiz clients. Each text frame is one request,
//! answered by one response frame. Connections that subscribe to a game
//! also receive that game's events.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::session::GameConfig;
use crate::network::protocol::{
    ClientMessage, ErrorCode, ProgressDto, QuestionDto, ServerMessage,
};
use crate::network::session::{env_parse, GameEngine};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How often expired rounds are swept when countdowns are enforced.
    pub sweep_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            sweep_interval: Duration::from_secs(1),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("QUIZ_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("QUIZ_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            sweep_interval: env_parse::<u64>("QUIZ_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            version: defaults.version,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Games this client receives events for.
    subscriptions: usize,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Game engine.
    engine: Arc<GameEngine>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, engine: Arc<GameEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind to the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Quiz server v{} listening on {}", self.config.version, listener.local_addr()?);

        let sweep_handle = self.engine.config().enforce_countdown.then(|| {
            let engine = self.engine.clone();
            let every = self.config.sweep_interval;
            tokio::spawn(async move {
                Self::run_sweep_loop(engine, every).await;
            })
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_connection(stream, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(handle) = sweep_handle {
            handle.abort();
        }

        Ok(())
    }

    /// Tell a client over the limit why it is dropped.
    fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            let reply = ServerMessage::Error {
                request_id: None,
                code: ErrorCode::ServerOverloaded,
                message: GameServerError::ConnectionLimitReached.to_string(),
            };
            if let Ok(text) = reply.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
            debug!("Rejected {}", addr);
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let mut events = engine.subscribe();
            let mut subscriptions = BTreeSet::new();

            // Register client
            clients.write().await.insert(addr, ConnectedClient {
                connected_at: Instant::now(),
                subscriptions: 0,
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let reply = match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(request) => dispatch(&engine, request).await,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    ServerMessage::invalid_input(format!("Invalid message format: {e}"))
                                }
                            },
                            Some(Ok(Message::Binary(_))) => {
                                ServerMessage::invalid_input("Binary frames are not supported")
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // Ping/pong frames are answered by tungstenite
                            Some(Ok(_)) => continue,
                        };

                        if let ServerMessage::Subscribed { game_id, .. } = &reply {
                            if subscriptions.insert(*game_id) {
                                if let Some(client) = clients.write().await.get_mut(&addr) {
                                    client.subscriptions = subscriptions.len();
                                }
                            }
                        }
                        if msg_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) if subscriptions.contains(&event.game_id) => {
                                // Nothing follows a terminal event
                                if event.is_terminal() {
                                    subscriptions.remove(&event.game_id);
                                }
                                if msg_tx.send(ServerMessage::Event { event }).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Client {} missed {} events", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies drain before closing
            drop(msg_tx);
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} cleaned up after {:?} ({} subscriptions)",
                    addr,
                    client.connected_at.elapsed(),
                    client.subscriptions
                );
            }
        });
    }

    /// Close rounds whose countdown ran out.
    async fn run_sweep_loop(engine: Arc<GameEngine>, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            match engine.sweep_expired_rounds(Utc::now()).await {
                Ok(0) => {}
                Ok(closed) => debug!("Closed {} expired rounds", closed),
                Err(e) => warn!("Round sweep failed: {}", e),
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live game count.
    pub async fn game_count(&self) -> usize {
        self.engine.game_count().await
    }
}

/// Execute one request against the engine and build its response.
///
/// Engine errors become [`ServerMessage::Error`] carrying the request id.
pub async fn dispatch(engine: &GameEngine, msg: ClientMessage) -> ServerMessage {
    let echo = msg.request_id().map(str::to_string);

    let result = match msg {
        ClientMessage::CreateGame { request_id, category, total_rounds, countdown_secs } => {
            let config = GameConfig { category, total_rounds, countdown_secs };
            engine.create_game(config).await.map(|progress| ServerMessage::GameCreated {
                request_id,
                game: ProgressDto::from(progress),
            })
        }
        ClientMessage::AdvanceRound { request_id, game_id } => {
            engine.advance_round(game_id).await.map(|view| ServerMessage::Question {
                request_id,
                question: QuestionDto::new(game_id, view),
            })
        }
        ClientMessage::GetGame { request_id, game_id } => {
            engine.get_progress(game_id).await.map(|progress| ServerMessage::Progress {
                request_id,
                game: ProgressDto::from(progress),
            })
        }
        ClientMessage::AddPlayer { request_id, game_id, account_id } => {
            engine.join_game(game_id, account_id).await.map(|added| ServerMessage::PlayerAdded {
                request_id,
                game_id,
                account_id,
                added,
            })
        }
        ClientMessage::RemovePlayer { request_id, game_id, account_id } => {
            engine.remove_player(game_id, account_id).await.map(|removed| ServerMessage::PlayerRemoved {
                request_id,
                game_id,
                account_id,
                removed,
            })
        }
        ClientMessage::SubmitAnswer { request_id, game_id, account_id, answer } => {
            engine
                .submit_answer(game_id, account_id, &answer)
                .await
                .map(|delta| ServerMessage::AnswerScored {
                    request_id,
                    game_id,
                    account_id,
                    delta,
                })
        }
        ClientMessage::GetWinners { request_id, game_id } => {
            engine.get_winners(game_id).await.map(|winners| ServerMessage::Winners {
                request_id,
                game_id,
                winners: winners.into_iter().map(Into::into).collect(),
            })
        }
        ClientMessage::Subscribe { request_id, game_id } => engine
            .get_progress(game_id)
            .await
            .map(|_| ServerMessage::Subscribed { request_id, game_id }),
        ClientMessage::Ping { timestamp } => Ok(ServerMessage::Pong {
            timestamp,
            server_time: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
        }),
    };

    result.unwrap_or_else(|e| {
        debug!("Request failed: {}", e);
        ServerMessage::error(echo, &e)
    })
}
