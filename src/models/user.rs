//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Registered user, as shown back to the client (never carries the hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique login name (also the primary key)
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Registration data for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
}
