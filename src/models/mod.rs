// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod event;
pub mod profile;
pub mod user;

pub use event::Event;
pub use profile::{ProfileDocument, UserProfile};
pub use user::{NewUser, User};
