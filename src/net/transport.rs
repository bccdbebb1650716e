//! WebTransport server implementation
//!
//! Accepts client sessions and bridges them into the shared game session:
//! open → entity created, control frames → intent applied, close → entity
//! destroyed.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wtransport::endpoint::IncomingSession;
use wtransport::Endpoint;

use crate::config::ServerConfig;
use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, ClientMessage};
use crate::net::session::{start_game_loop, GameSession, SharedWriter};
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    session: Arc<RwLock<GameSession>>,
}

impl WebTransportServer {
    /// Create a new WebTransport server
    pub async fn new(
        config: ServerConfig,
        session: Arc<RwLock<GameSession>>,
    ) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        Ok(Self {
            config,
            tls_config,
            session,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        // Dual-stack bind (IPv4 + IPv6) so both localhost and LAN clients work.
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_default(self.config.port)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on port {}", self.config.port);

        // Start the simulation loop background task.
        start_game_loop(self.session.clone(), self.config.tick_hz);

        loop {
            let incoming = server.accept().await;
            let session = self.session.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, session).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single client connection for its whole lifetime.
async fn handle_connection(
    incoming: IncomingSession,
    session: Arc<RwLock<GameSession>>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "New session request: authority={}, path={}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;

    // The client opens one bidirectional stream; its send half becomes the
    // connection's output channel for state broadcasts.
    let (send, mut recv) = connection.accept_bi().await?;
    let writer: SharedWriter = Arc::new(RwLock::new(Some(send)));

    let connection_id = Uuid::new_v4();
    {
        let mut session_guard = session.write().await;
        if let Err(e) = session_guard.add_connection(connection_id, writer.clone()) {
            error!("Failed to register connection {}: {}", connection_id, e);
            return Err(e.into());
        }
    }

    let mut buffer = vec![0u8; 4096];
    loop {
        // Read a length-prefixed frame.
        let mut len_buf = [0u8; 4];
        if let Err(e) = recv.read_exact(&mut len_buf).await {
            debug!("Stream read ended for {}: {}", connection_id, e);
            break;
        }
        let msg_len = u32::from_le_bytes(len_buf) as usize;

        if msg_len > MAX_MESSAGE_SIZE {
            warn!("Rejected oversized message: {} bytes", msg_len);
            break;
        }
        if msg_len > buffer.len() {
            buffer.resize(msg_len, 0);
        }
        if let Err(e) = recv.read_exact(&mut buffer[..msg_len]).await {
            debug!("Stream read ended for {}: {}", connection_id, e);
            break;
        }

        // Input is never trusted to be well-formed: malformed frames are
        // logged and dropped, the connection stays up.
        let message: ClientMessage = match decode(&buffer[..msg_len]) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed message from {}: {}", connection_id, e);
                continue;
            }
        };

        match message {
            ClientMessage::Move { controls } => {
                let mut session_guard = session.write().await;
                session_guard.apply_intent(connection_id, &controls);
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown message type from {}", connection_id);
            }
        }
    }

    // Stream ended or errored: tear the connection down either way.
    session.write().await.remove_connection(connection_id);
    Ok(())
}
