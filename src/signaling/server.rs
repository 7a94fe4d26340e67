use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message, Utf8Bytes};
use tracing::{debug, error, info, warn};

use super::manager::{SessionManager, SignalingHooks};
use super::policy::AccessPolicy;
use super::types::{Connection, SessionId, SignalingError};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ping cadence and how long a pong may take before the socket is dropped.
#[derive(Debug, Clone, Copy)]
struct KeepAlive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

pub struct SignalingServer<H = SessionManager> {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    policy: Arc<AccessPolicy>,
    keepalive: KeepAlive,
    hooks: H,
}

impl<H> SignalingServer<H>
where
    H: SignalingHooks + Clone + Send + Sync + 'static,
{
    /// Bind the listener. Plain TCP with an open access policy until configured otherwise.
    pub async fn bind(addr: &str, hooks: H) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            tls: None,
            policy: Arc::new(AccessPolicy::default()),
            keepalive: KeepAlive::default(),
            hooks,
        })
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Override the 30 s ping interval and 10 s pong timeout.
    pub fn with_keepalive(mut self, ping_interval: Duration, pong_timeout: Duration) -> Self {
        self.keepalive = KeepAlive {
            ping_interval,
            pong_timeout,
        };
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        info!(
            "Signaling server listening on {}://{}",
            if self.tls.is_some() { "wss" } else { "ws" },
            self.listener.local_addr()?
        );

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let hooks = self.hooks.clone();
            let policy = self.policy.clone();
            let tls = self.tls.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = accept_connection(stream, addr, tls, hooks, policy, keepalive).await
                {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn accept_connection<H>(
    stream: TcpStream,
    addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    hooks: H,
    policy: Arc<AccessPolicy>,
    keepalive: KeepAlive,
) -> Result<(), BoxError>
where
    H: SignalingHooks + Send + Sync,
{
    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(stream).await?;
            handle_connection(stream, addr, hooks, policy, keepalive).await
        }
        None => handle_connection(stream, addr, hooks, policy, keepalive).await,
    }
}

/// Map a handshake-time error to the HTTP response the client sees.
fn rejection(err: &SignalingError) -> ErrorResponse {
    let (status, body) = match err {
        SignalingError::SpaceFull(_) => (StatusCode::BAD_REQUEST, "Space Full"),
        SignalingError::InvalidPath(_) => (StatusCode::NOT_FOUND, "Not Found"),
        SignalingError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    };
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

fn header_value<'a>(request: &'a Request, name: header::HeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn handle_connection<S, H>(
    stream: S,
    addr: SocketAddr,
    hooks: H,
    policy: Arc<AccessPolicy>,
    keepalive: KeepAlive,
) -> Result<(), BoxError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: SignalingHooks + Send + Sync,
{
    let mut admitted: Option<SessionId> = None;
    let gate = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let path = request.uri().path();
        let session = policy
            .admit(
                path,
                header_value(request, header::HOST),
                header_value(request, header::ORIGIN),
            )
            .and_then(|session| hooks.on_handshake(&session).map(|()| session))
            .map_err(|e| {
                warn!("Handshake from {} for {} rejected: {}", addr, path, e);
                rejection(&e)
            })?;
        admitted = Some(session);
        Ok(response)
    };
    let accepted = tokio_tungstenite::accept_hdr_async(stream, gate).await;
    let ws_stream = match accepted {
        Ok(ws_stream) => ws_stream,
        // rejected by the gate, which already logged why
        Err(WsError::Http(_)) if admitted.is_none() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let session = admitted
        .ok_or_else(|| SignalingError::Internal("handshake accepted without a session".to_string()))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (conn, ends) = Connection::open(session, addr);
    let mut outbound = ends.outbound;
    let mut closed = ends.closed;
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        loop {
            // queued text goes out before a close frame
            tokio::select! {
                biased;
                Some(msg) = outbound.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    let is_close = matches!(ctrl_msg, Message::Close(_));
                    if ws_tx.send(ctrl_msg).await.is_err() || is_close {
                        break;
                    }
                }
                else => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    if let Err(e) = hooks.on_open(&conn) {
        let (code, reason) = match e {
            SignalingError::SpaceFull(_) => (CloseCode::Policy, "space full"),
            _ => (CloseCode::Error, "internal error"),
        };
        let _ = ctrl_tx.send(close_message(code, reason));
        drop(conn);
        drop(ctrl_tx);
        finish(send_task).await;
        return match e {
            SignalingError::SpaceFull(_) => Ok(()),
            e => Err(e.into()),
        };
    }

    info!("WebSocket connection {} from {}", conn.id(), addr);

    let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;
    let mut close_with: Option<Message> = None;

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.pong_timeout);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            _ = closed.changed() => {
                info!("Peer of {} hung up, closing", conn.id());
                close_with = Some(close_message(CloseCode::Normal, "peer left"));
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match hooks.on_message(&conn, text.as_str()) {
                        Ok(()) => {}
                        Err(SignalingError::Protocol(e)) => {
                            warn!("Protocol error from {}: {}", addr, e);
                            close_with = Some(close_message(CloseCode::Protocol, "invalid message"));
                            break;
                        }
                        Err(e) => {
                            error!("Message handling error from {}: {}", addr, e);
                            close_with = Some(close_message(CloseCode::Error, "internal error"));
                            break;
                        }
                    },
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        break;
                    }
                    Message::Binary(_) => {
                        warn!("Ignoring binary frame from {}", addr);
                    }
                    _ => {}
                }
            }
        }
    }

    if let Err(e) = hooks.on_close(&conn) {
        error!("Close handling error for {}: {}", conn.id(), e);
    }
    if let Some(msg) = close_with {
        let _ = ctrl_tx.send(msg);
    }

    info!("WebSocket disconnected: {}", addr);
    drop(conn);
    drop(ctrl_tx);
    finish(send_task).await;

    Ok(())
}

fn close_message(code: CloseCode, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Let the writer flush what is queued, but never wait on it forever.
async fn finish(mut send_task: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(CLOSE_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}
