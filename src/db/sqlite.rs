// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (credentials)
//! - User profiles (one row per user, replace-all upsert)
//! - Events (per-user recommendations, replaced wholesale)
//!
//! Every call opens its own connection and runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::db::tables;
use crate::error::AppError;
use crate::models::{Event, NewUser, User, UserProfile};
use crate::services::password;

/// SQLite database handle.
#[derive(Clone)]
pub struct Database {
    path: Arc<PathBuf>,
}

impl Database {
    /// Create a handle for the database file at `path`.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run `f` with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::connect(&path)?;
            f(&mut conn)
        })
        .await?
    }

    // ─── Schema ──────────────────────────────────────────────────

    /// Create tables if missing and apply the `interests` column migration.
    pub async fn init_schema(&self) -> Result<(), AppError> {
        self.with_connection(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {users} (
                    username TEXT PRIMARY KEY,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    password_hash TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {profiles} (
                    username TEXT PRIMARY KEY,
                    age INTEGER,
                    gender TEXT,
                    condition_type TEXT,
                    city TEXT,
                    FOREIGN KEY(username) REFERENCES {users}(username)
                );
                CREATE TABLE IF NOT EXISTS {events} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL,
                    name TEXT,
                    address TEXT,
                    zip TEXT,
                    accessible TEXT,
                    priceless TEXT,
                    date TEXT,
                    text TEXT,
                    relevance_score REAL,
                    FOREIGN KEY(username) REFERENCES {users}(username)
                );
                CREATE INDEX IF NOT EXISTS idx_events_user_date ON {events}(username, date);",
                users = tables::USERS,
                profiles = tables::USER_PROFILES,
                events = tables::EVENTS,
            ))?;

            ensure_column(conn, tables::USER_PROFILES, "interests", "TEXT")?;
            Ok(())
        })
        .await?;

        tracing::info!(path = %self.path.display(), "Database schema ready");
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Insert a new user.
    ///
    /// Returns `false` (and leaves the existing row alone) when the username
    /// is already taken.
    pub async fn create_user(&self, user: NewUser) -> Result<bool, AppError> {
        self.with_connection(move |conn| {
            let result = conn.execute(
                &format!(
                    "INSERT INTO {} (username, first_name, last_name, email, password_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    tables::USERS
                ),
                params![
                    user.username,
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.password_hash
                ],
            );

            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    tracing::info!(username = %user.username, "Username already taken");
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Check a username/password pair against the stored hash.
    ///
    /// Unknown users and unreadable hashes both verify as `false`.
    pub async fn verify_credentials(
        &self,
        username: &str,
        plain_password: &str,
    ) -> Result<bool, AppError> {
        let username = username.to_string();
        let plain_password = plain_password.to_string();

        self.with_connection(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    &format!("SELECT password_hash FROM {} WHERE username = ?1", tables::USERS),
                    params![username],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(hash) = stored else {
                return Ok(false);
            };

            match password::verify_password(&plain_password, &hash) {
                Ok(matches) => Ok(matches),
                Err(e) => {
                    tracing::warn!(username = %username, error = %e, "Stored password hash is unreadable");
                    Ok(false)
                }
            }
        })
        .await
    }

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>, AppError> {
        let username = username.to_string();
        self.with_connection(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT username, first_name, last_name, email FROM {} WHERE username = ?1",
                        tables::USERS
                    ),
                    params![username],
                    |row| {
                        Ok(User {
                            username: row.get(0)?,
                            first_name: row.get(1)?,
                            last_name: row.get(2)?,
                            email: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Insert or fully replace a user's profile.
    pub async fn upsert_profile(
        &self,
        username: &str,
        profile: &UserProfile,
    ) -> Result<(), AppError> {
        let username = username.to_string();
        let profile = profile.clone();

        self.with_connection(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (username, age, gender, condition_type, city, interests)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(username) DO UPDATE SET
                         age = excluded.age,
                         gender = excluded.gender,
                         condition_type = excluded.condition_type,
                         city = excluded.city,
                         interests = excluded.interests",
                    tables::USER_PROFILES
                ),
                params![
                    username,
                    profile.age,
                    profile.gender,
                    profile.condition_type,
                    profile.city,
                    profile.interests
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Get a user's profile, if one was ever saved.
    pub async fn get_profile(&self, username: &str) -> Result<Option<UserProfile>, AppError> {
        let username = username.to_string();
        self.with_connection(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT age, gender, condition_type, city, interests
                         FROM {} WHERE username = ?1",
                        tables::USER_PROFILES
                    ),
                    params![username],
                    |row| {
                        Ok(UserProfile {
                            age: row.get(0)?,
                            gender: row.get(1)?,
                            condition_type: row.get(2)?,
                            city: row.get(3)?,
                            interests: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    /// Whether the user has a complete profile (age, gender and city).
    pub async fn user_has_profile(&self, username: &str) -> Result<bool, AppError> {
        Ok(self
            .get_profile(username)
            .await?
            .is_some_and(|p| p.is_complete()))
    }

    // ─── Event Operations ────────────────────────────────────────

    /// Replace all of a user's events with `events`.
    pub async fn replace_events(&self, username: &str, events: Vec<Event>) -> Result<usize, AppError> {
        let username = username.to_string();

        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                &format!("DELETE FROM {} WHERE username = ?1", tables::EVENTS),
                params![username],
            )?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {}
                        (username, name, address, zip, accessible, priceless, date, text, relevance_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    tables::EVENTS
                ))?;
                for event in &events {
                    stmt.execute(params![
                        username,
                        event.name,
                        event.address,
                        event.zip,
                        event.accessible,
                        event.priceless,
                        event.date,
                        event.text,
                        event.relevance_score
                    ])?;
                }
            }
            tx.commit()?;

            tracing::debug!(
                username = %username,
                removed,
                inserted = events.len(),
                "Replaced events"
            );
            Ok(events.len())
        })
        .await
    }

    /// Events for a user dated in `[start, end)`.
    ///
    /// Bounds are `YYYY-MM-DD` strings; comparison is lexicographic, so both
    /// stored date formats fall inside the day they start with.
    pub async fn events_in_range(
        &self,
        username: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Event>, AppError> {
        let username = username.to_string();
        let start = start.to_string();
        let end = end.to_string();

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT name, address, zip, accessible, priceless, date, text, relevance_score
                 FROM {}
                 WHERE username = ?1 AND date >= ?2 AND date < ?3
                 ORDER BY date, id",
                tables::EVENTS
            ))?;
            let rows = stmt.query_map(params![username, start, end], |row| {
                Ok(Event {
                    name: row.get(0)?,
                    address: row.get(1)?,
                    zip: row.get(2)?,
                    accessible: row.get(3)?,
                    priceless: row.get(4)?,
                    date: row.get(5)?,
                    text: row.get(6)?,
                    relevance_score: row.get(7)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

/// Add `column` to `table` unless it already exists.
fn ensure_column(conn: &Connection, table: &str, column: &str, sql_type: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .iter()
        .any(|name| name == column);

    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}"))?;
        tracing::info!(table, column, "Added missing column");
    }
    Ok(())
}
