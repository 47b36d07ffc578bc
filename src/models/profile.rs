// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Health profile model.

use serde::{Deserialize, Serialize};

/// Separator used for the multi-valued profile columns.
const LIST_SEPARATOR: char = ',';

/// A user's health profile (one row per user).
///
/// `condition_type` and `interests` are stored comma-joined.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub condition_type: Option<String>,
    pub city: Option<String>,
    pub interests: Option<String>,
}

impl UserProfile {
    /// Build a profile from form values, joining the list fields.
    ///
    /// Empty lists and blank strings become `None`.
    pub fn from_parts(
        age: Option<u32>,
        gender: Option<String>,
        conditions: &[String],
        city: Option<String>,
        interests: &[String],
    ) -> Self {
        Self {
            age,
            gender: non_blank(gender),
            condition_type: join_list(conditions),
            city: non_blank(city),
            interests: join_list(interests),
        }
    }

    /// A profile counts only when age, gender and city are all filled in.
    pub fn is_complete(&self) -> bool {
        self.age.is_some_and(|age| age > 0)
            && self.gender.as_deref().is_some_and(|g| !g.trim().is_empty())
            && self.city.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    pub fn condition_list(&self) -> Vec<String> {
        split_list(self.condition_type.as_deref())
    }

    pub fn interest_list(&self) -> Vec<String> {
        split_list(self.interests.as_deref())
    }
}

/// Profile document uploaded to the events workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDocument<'a> {
    pub username: &'a str,
    pub age: Option<u32>,
    pub gender: Option<&'a str>,
    pub condition_type: Option<&'a str>,
    pub city: Option<&'a str>,
    pub interests: Option<&'a str>,
}

impl<'a> ProfileDocument<'a> {
    pub fn new(username: &'a str, profile: &'a UserProfile) -> Self {
        Self {
            username,
            age: profile.age,
            gender: profile.gender.as_deref(),
            condition_type: profile.condition_type.as_deref(),
            city: profile.city.as_deref(),
            interests: profile.interests.as_deref(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn join_list(items: &[String]) -> Option<String> {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items.join(&LIST_SEPARATOR.to_string()))
    }
}

fn split_list(joined: Option<&str>) -> Vec<String> {
    joined
        .map(|s| {
            s.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
