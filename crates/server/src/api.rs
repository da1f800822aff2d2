//! HTTP API: authentication, session management, history

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use tavern_core::{auth, MessageRepository, Session, User, UserRepository};
use tavern_net::protocol::{
    AuthResponse, Credentials, HistoryQuery, MeResponse, WireMessage, SESSION_COOKIE,
};

use crate::state::AppState;
use crate::ws;

/// Build the application router (shared between startup and tests)
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/me", get(me))
        .route("/api/logout", post(logout))
        .route("/api/get_chat_history", get(chat_history))
        .route("/health", get(health))
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> Response {
    let user = {
        let db = state.db.lock().unwrap();
        match db.find_user_by_username(credentials.username.trim()) {
            Ok(Some(user)) => user,
            Ok(None) => return invalid_credentials(),
            Err(e) => return internal_error(e),
        }
    };

    // Verify outside the database lock
    match auth::verify_password(&credentials.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(e) => return internal_error(e),
    }

    let session = Session::new(user.id, state.config.session_ttl_hours);
    {
        let db = state.db.lock().unwrap();
        if let Err(e) = db.update_last_login(user.id) {
            warn!(user_id = %user.id, error = %e, "Failed to record last login");
        }
        if let Err(e) = db.create_session(&session) {
            return internal_error(e);
        }
    }

    info!(user_id = %user.id, username = %user.username, "Login successful");
    auth_success(jar, "Login successful!", &user, session)
}

async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> Response {
    let username = credentials.username.trim().to_string();
    if username.len() < 3 {
        return bad_request("Username must be at least 3 characters");
    }
    if credentials.password.len() < 6 {
        return bad_request("Password must be at least 6 characters");
    }

    let password_hash = match auth::hash_password(&credentials.password) {
        Ok(hash) => hash,
        Err(e) => return internal_error(e),
    };
    let user = User::new(username, password_hash);
    let session = Session::new(user.id, state.config.session_ttl_hours);

    {
        // Uniqueness check and insert under one lock
        let db = state.db.lock().unwrap();
        match db.find_user_by_username(&user.username) {
            Ok(Some(_)) => {
                return (StatusCode::CONFLICT, Json("Username already taken")).into_response()
            }
            Ok(None) => {}
            Err(e) => return internal_error(e),
        }
        if let Err(e) = db.create_user(&user) {
            return internal_error(e);
        }
        if let Err(e) = db.create_session(&session) {
            return internal_error(e);
        }
    }

    info!(user_id = %user.id, username = %user.username, "User registered");
    auth_success(jar, "Registered successfully", &user, session)
}

async fn me(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return unauthorized();
    };

    let db = state.db.lock().unwrap();
    match db.find_user_by_session(&token) {
        Ok(Some(user)) => Json(MeResponse {
            user_id: user.id,
            username: user.username,
        })
        .into_response(),
        Ok(None) => unauthorized(),
        Err(e) => internal_error(e),
    }
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    if let Some(token) = token {
        let db = state.db.lock().unwrap();
        if let Err(e) = db.delete_session(&token) {
            warn!(error = %e, "Failed to delete session");
        }
    }

    // Clear the cookie whether or not a session existed
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(removal), Json("Logged out")).into_response()
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.min(state.config.history_max_limit);

    let db = state.db.lock().unwrap();
    match db.list_recent_messages(limit) {
        Ok(messages) => {
            let wire: Vec<WireMessage> = messages
                .into_iter()
                .map(|m| WireMessage {
                    username: m.sender_username,
                    content: m.content,
                })
                .collect();
            Json(wire).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let messages = state.db.lock().unwrap().count_messages().unwrap_or(0);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connection_count(),
        "messages": messages,
    }))
    .into_response()
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, Json(message)).into_response()
}

/// Deliberately identical for unknown user and wrong password
fn invalid_credentials() -> Response {
    (StatusCode::UNAUTHORIZED, Json("Invalid username or password")).into_response()
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json("Not logged in")).into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json("Internal server error")).into_response()
}

fn auth_success(jar: CookieJar, message: &str, user: &User, session: Session) -> Response {
    let cookie = Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    let body = AuthResponse {
        message: message.to_string(),
        user_id: user.id,
        session_token: session.token,
    };
    (jar.add(cookie), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use futures_util::SinkExt;
    use tavern_core::Database;
    use tavern_net::protocol::ClientFrame;
    use tavern_net::{ChatConnection, ChatEvent, Client, Error};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use super::*;
    use crate::config::ServerConfig;

    async fn spawn_server() -> (String, Arc<AppState>) {
        let config = ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            session_ttl_hours: 24,
            ..ServerConfig::default()
        };
        let db = Database::open_in_memory().unwrap();
        let state = Arc::new(AppState::with_database(db, config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), state)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Condition not met within timeout");
    }

    async fn expect_message(chat: &mut ChatConnection) -> tavern_net::WireMessage {
        let event = tokio::time::timeout(Duration::from_secs(5), chat.next_event())
            .await
            .expect("Timed out waiting for chat event");
        match event {
            Some(ChatEvent::Message(msg)) => msg,
            other => panic!("Expected chat message, got {:?}", other),
        }
    }

    fn api_status(error: Error) -> u16 {
        match error {
            Error::Api { status, .. } => status,
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_login_me_logout() {
        let (base_url, _state) = spawn_server().await;

        let mut client = Client::new(&base_url);
        let auth = client.register("alice", "password123").await.unwrap();
        assert_eq!(auth.message, "Registered successfully");
        assert!(!auth.session_token.is_empty());

        // Registration logs in
        assert_eq!(client.user_id(), Some(auth.user_id));
        let me = client.me().await.unwrap();
        assert_eq!(me.username, "alice");
        assert_eq!(me.user_id, auth.user_id);

        client.logout().await.unwrap();
        assert!(client.session_token().is_none());

        // A fresh login produces a new session
        let mut client = Client::new(&base_url);
        let auth2 = client.login("alice", "password123").await.unwrap();
        assert_eq!(auth2.user_id, auth.user_id);
        assert_ne!(auth2.session_token, auth.session_token);
        assert_eq!(client.me().await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_invalid_credentials_rejected() {
        let (base_url, _state) = spawn_server().await;

        let mut client = Client::new(&base_url);
        client.register("alice", "password123").await.unwrap();

        let mut other = Client::new(&base_url);
        let err = other.login("alice", "wrong-password").await.unwrap_err();
        assert_eq!(api_status(err), 401);

        let err = other.login("nobody", "password123").await.unwrap_err();
        assert_eq!(api_status(err), 401);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (base_url, _state) = spawn_server().await;

        let mut client = Client::new(&base_url);
        let err = client.register("ab", "password123").await.unwrap_err();
        assert_eq!(api_status(err), 400);

        let err = client.register("alice", "short").await.unwrap_err();
        assert_eq!(api_status(err), 400);

        client.register("alice", "password123").await.unwrap();
        let mut dup = Client::new(&base_url);
        let err = dup.register("alice", "password456").await.unwrap_err();
        assert_eq!(api_status(err), 409);
    }

    #[tokio::test]
    async fn test_logged_out_session_rejected() {
        let (base_url, _state) = spawn_server().await;

        let mut client = Client::new(&base_url);
        client.register("alice", "password123").await.unwrap();
        let token = client.session_token().unwrap().to_string();
        client.me().await.unwrap();
        client.logout().await.unwrap();

        // The same token presented again must be refused
        let response = reqwest::Client::new()
            .get(format!("{}/api/me", base_url))
            .header("cookie", format!("{}={}", SESSION_COOKIE, token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_chat_broadcast_reaches_all_clients() {
        let (base_url, state) = spawn_server().await;

        let mut alice = Client::new(&base_url);
        alice.register("alice", "password123").await.unwrap();
        let mut bob = Client::new(&base_url);
        bob.register("bob", "password123").await.unwrap();

        let mut alice_chat = alice.connect().await.unwrap();
        let mut bob_chat = bob.connect().await.unwrap();

        // Both sockets subscribed before anything is sent
        wait_until(|| state.connection_count() == 2).await;

        alice_chat.send("hello from alice").await.unwrap();

        let to_alice = expect_message(&mut alice_chat).await;
        assert_eq!(to_alice.username, "alice");
        assert_eq!(to_alice.content, "hello from alice");

        let to_bob = expect_message(&mut bob_chat).await;
        assert_eq!(to_bob.username, "alice");
        assert_eq!(to_bob.content, "hello from alice");

        bob_chat.send("hi alice").await.unwrap();
        assert_eq!(expect_message(&mut alice_chat).await.username, "bob");

        alice_chat.disconnect().await;
        bob_chat.disconnect().await;
    }

    #[tokio::test]
    async fn test_history_window() {
        let (base_url, state) = spawn_server().await;

        let mut alice = Client::new(&base_url);
        alice.register("alice", "password123").await.unwrap();
        let alice_chat = alice.connect().await.unwrap();

        for i in 0..5 {
            alice_chat.send(format!("message {}", i)).await.unwrap();
        }
        wait_until(|| state.db.lock().unwrap().count_messages().unwrap() == 5).await;

        // Most recent two, oldest first
        let history = alice.history(Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "message 3");
        assert_eq!(history[1].content, "message 4");
        assert_eq!(history[0].username, "alice");

        // Default limit covers everything here
        let history = alice.history(None).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].content, "message 0");
    }

    #[tokio::test]
    async fn test_invalid_token_frames_dropped() {
        let (base_url, state) = spawn_server().await;

        let mut alice = Client::new(&base_url);
        alice.register("alice", "password123").await.unwrap();
        let token = alice.session_token().unwrap().to_string();

        let mut rx = state.chat_tx.subscribe();

        let ws_url = format!("ws://{}/ws", base_url.strip_prefix("http://").unwrap());
        let (mut socket, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await.unwrap();

        // Bogus token, then empty content, then a valid frame on the same
        // socket; frames are processed in order, so seeing the valid
        // broadcast proves the first two were dropped
        socket
            .send(WsMessage::Text(
                r#"{"session_token":"bogus","content":"evil"}"#.into(),
            ))
            .await
            .unwrap();
        socket
            .send(WsMessage::Text(
                serde_json::to_string(&ClientFrame {
                    session_token: token.clone(),
                    content: String::new(),
                })
                .unwrap()
                .into(),
            ))
            .await
            .unwrap();
        socket
            .send(WsMessage::Text(
                serde_json::to_string(&ClientFrame {
                    session_token: token,
                    content: "real".to_string(),
                })
                .unwrap()
                .into(),
            ))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timed out waiting for broadcast")
            .unwrap();
        let wire: WireMessage = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire.content, "real");

        assert_eq!(state.db.lock().unwrap().count_messages().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_connections() {
        let (base_url, _state) = spawn_server().await;

        let mut alice = Client::new(&base_url);
        alice.register("alice", "password123").await.unwrap();
        let _chat = alice.connect().await.unwrap();

        let body: serde_json::Value = reqwest::get(format!("{}/health", base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }
}
