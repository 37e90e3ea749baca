// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Squad (group) membership model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquadRole {
    Owner,
    Admin,
    #[default]
    Member,
}

/// Stored squad document (`squads/{squadId}`).
///
/// `active_sessions` is maintained with atomic array-union/remove on
/// session create and end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Squad {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// userId -> role
    #[serde(default)]
    pub members: HashMap<String, SquadRole>,
    #[serde(default)]
    pub active_sessions: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Squad {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }
}
