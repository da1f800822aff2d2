//! HTTP + WebSocket client for a Tavern server

use futures_util::{SinkExt, StreamExt};
use reqwest::header;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{
    AuthResponse, ClientFrame, Credentials, MeResponse, WireMessage, SESSION_COOKIE,
};

/// Client for the Tavern HTTP API
///
/// Holds the session token after a successful login or registration and
/// presents it on every subsequent request.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user_id: Option<Uuid>,
}

impl Client {
    /// Create a client for a server base URL (e.g. `http://127.0.0.1:8000`)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: None,
            user_id: None,
        }
    }

    /// Current session token, if logged in
    pub fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// User ID of the logged-in user
    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// Register a new account
    ///
    /// Registration logs the account in; the returned session token is
    /// stored on the client.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<AuthResponse> {
        self.authenticate("register", username, password).await
    }

    /// Log in with existing credentials
    pub async fn login(&mut self, username: &str, password: &str) -> Result<AuthResponse> {
        self.authenticate("login", username, password).await
    }

    async fn authenticate(
        &mut self,
        endpoint: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let response = self
            .http
            .post(format!("{}/api/{}", self.base_url, endpoint))
            .json(&Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let auth: AuthResponse = response.json().await?;
        self.token = Some(auth.session_token.clone());
        self.user_id = Some(auth.user_id);
        info!(username = %username, "Authenticated");
        Ok(auth)
    }

    /// Validate the current session and fetch identity
    pub async fn me(&self) -> Result<MeResponse> {
        let response = self
            .http
            .get(format!("{}/api/me", self.base_url))
            .header(header::COOKIE, self.session_cookie()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(response.json().await?)
    }

    /// Log out, invalidating the session server-side
    pub async fn logout(&mut self) -> Result<()> {
        let cookie = self.session_cookie()?;
        let response = self
            .http
            .post(format!("{}/api/logout", self.base_url))
            .header(header::COOKIE, cookie)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        self.token = None;
        self.user_id = None;
        Ok(())
    }

    /// Fetch recent chat history, oldest first
    pub async fn history(&self, limit: Option<u32>) -> Result<Vec<WireMessage>> {
        let mut request = self
            .http
            .get(format!("{}/api/get_chat_history", self.base_url));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(response.json().await?)
    }

    /// Open the realtime chat connection
    ///
    /// Requires a session: every outgoing frame carries the token.
    pub async fn connect(&self) -> Result<ChatConnection> {
        let token = self.token.clone().ok_or(Error::NotLoggedIn)?;
        let url = ws_url(&self.base_url)?;

        info!(url = %url, "Connecting to chat");
        let (stream, _) = connect_async(url.as_str()).await?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(stream, event_tx, cmd_rx));

        Ok(ChatConnection {
            event_rx,
            cmd_tx,
            session_token: token,
        })
    }

    fn session_cookie(&self) -> Result<String> {
        let token = self.token.as_deref().ok_or(Error::NotLoggedIn)?;
        Ok(format!("{}={}", SESSION_COOKIE, token))
    }
}

/// Extract the error message from a failed response
///
/// The server sends auth failures as bare JSON strings; anything else is
/// rendered as-is.
async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let message = match response.json::<serde_json::Value>().await {
        Ok(serde_json::Value::String(s)) => s,
        Ok(value) => value.to_string(),
        Err(_) => "could not connect to server".to_string(),
    };
    Error::Api { status, message }
}

/// Derive the WebSocket URL from the HTTP base URL
fn ws_url(base_url: &str) -> Result<String> {
    if let Some(rest) = base_url.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else {
        Err(Error::Protocol(format!(
            "Unsupported base URL: {}",
            base_url
        )))
    }
}

/// Event received over the chat connection
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A chat message was broadcast
    Message(WireMessage),
    /// Connection closed (server shutdown or network failure)
    Disconnected,
}

enum ChatCommand {
    Send(ClientFrame),
    Disconnect,
}

/// Handle for a live chat connection
pub struct ChatConnection {
    event_rx: mpsc::Receiver<ChatEvent>,
    cmd_tx: mpsc::Sender<ChatCommand>,
    session_token: String,
}

impl ChatConnection {
    /// Get the next chat event
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.event_rx.recv().await
    }

    /// Send a chat message
    pub async fn send(&self, content: impl Into<String>) -> Result<()> {
        let frame = ClientFrame {
            session_token: self.session_token.clone(),
            content: content.into(),
        };
        self.cmd_tx
            .send(ChatCommand::Send(frame))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Close the connection
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ChatCommand::Disconnect).await;
    }
}

/// Main connection task: pumps the socket and the command channel
async fn connection_task(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: mpsc::Sender<ChatEvent>,
    mut cmd_rx: mpsc::Receiver<ChatCommand>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            // Incoming frame from the server
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WireMessage>(&text) {
                            Ok(wire) => {
                                if event_tx.send(ChatEvent::Message(wire)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Unparseable frame from server");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            // Outgoing command
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChatCommand::Send(frame)) => {
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ChatCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    let _ = event_tx.send(ChatEvent::Disconnected).await;
    debug!("Chat connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_derivation() {
        assert_eq!(
            ws_url("http://127.0.0.1:8000").unwrap(),
            "ws://127.0.0.1:8000/ws"
        );
        assert_eq!(
            ws_url("https://chat.example.com").unwrap(),
            "wss://chat.example.com/ws"
        );
        assert!(ws_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_base_url_normalized() {
        let client = Client::new("http://localhost:8000/");
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
