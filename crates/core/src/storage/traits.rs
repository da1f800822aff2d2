//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, mock, future network backend).

use uuid::Uuid;

use crate::error::Result;
use crate::models::{ChatMessage, MessageDisplay, Session, User};

/// User and session repository operations
pub trait UserRepository {
    /// Create a new user
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find user by username
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Update user's last login time
    fn update_last_login(&self, user_id: Uuid) -> Result<()>;

    /// Create a session
    fn create_session(&self, session: &Session) -> Result<()>;

    /// Find a valid (non-expired) session by token
    fn find_valid_session(&self, token: &str) -> Result<Option<Session>>;

    /// Resolve a session token to its user
    fn find_user_by_session(&self, token: &str) -> Result<Option<User>>;

    /// Delete a session
    fn delete_session(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user
    fn delete_user_sessions(&self, user_id: Uuid) -> Result<()>;

    /// Clean up expired sessions
    fn cleanup_expired_sessions(&self) -> Result<u64>;
}

/// Message repository operations
pub trait MessageRepository {
    /// Persist a new message
    fn create_message(&self, message: &ChatMessage) -> Result<()>;

    /// List the most recent messages, oldest first
    fn list_recent_messages(&self, limit: u32) -> Result<Vec<MessageDisplay>>;

    /// Total message count
    fn count_messages(&self) -> Result<u64>;
}

/// Combined storage interface
///
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage: UserRepository + MessageRepository {}

// Blanket implementation: any type implementing both traits implements Storage
impl<T> Storage for T where T: UserRepository + MessageRepository {}
