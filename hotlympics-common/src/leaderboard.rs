//! Leaderboard data model
//!
//! Boards are ranked and published by the backend; the client only reads
//! them. Four boards exist: the top and bottom of each cohort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Cohort;
use crate::Error;

/// Rating deviation assumed when the backend omits `rd`
const DEFAULT_DEVIATION: f64 = 50.0;

/// Which published board to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    FemaleTop,
    FemaleBottom,
    MaleTop,
    MaleBottom,
}

impl BoardKind {
    pub const ALL: [BoardKind; 4] = [
        BoardKind::FemaleTop,
        BoardKind::FemaleBottom,
        BoardKind::MaleTop,
        BoardKind::MaleBottom,
    ];

    /// Path segment used by the backend (`female_top`, ...)
    pub fn as_str(self) -> &'static str {
        match self {
            BoardKind::FemaleTop => "female_top",
            BoardKind::FemaleBottom => "female_bottom",
            BoardKind::MaleTop => "male_top",
            BoardKind::MaleBottom => "male_bottom",
        }
    }

    pub fn cohort(self) -> Cohort {
        match self {
            BoardKind::FemaleTop | BoardKind::FemaleBottom => Cohort::Female,
            BoardKind::MaleTop | BoardKind::MaleBottom => Cohort::Male,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BoardKind::FemaleTop => "Top Women",
            BoardKind::FemaleBottom => "Bottom Women",
            BoardKind::MaleTop => "Top Men",
            BoardKind::MaleBottom => "Bottom Men",
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        BoardKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown leaderboard: {:?}", s)))
    }
}

/// One ranked item on a board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: usize,
    pub id: String,
    pub media_ref: String,
    pub owner_id: String,
    pub rating: f64,
    pub deviation: f64,
    pub battles: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl LeaderboardEntry {
    /// Fraction of battles won; 0 before the first battle
    pub fn win_rate(&self) -> f64 {
        if self.battles == 0 {
            0.0
        } else {
            self.wins as f64 / self.battles as f64
        }
    }
}

/// A board as served to callers
#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub kind: BoardKind,
    /// Entries in rank order
    pub entries: Vec<LeaderboardEntry>,
    /// Size of the board as reported by the backend
    pub total_count: usize,
    /// When the backend generated the board, if known
    pub generated_at: Option<DateTime<Utc>>,
}

impl Leaderboard {
    /// Board with no data yet
    pub fn empty(kind: BoardKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            total_count: 0,
            generated_at: None,
        }
    }

    /// Rank the wire entries by position
    pub fn from_response(kind: BoardKind, response: LeaderboardResponse) -> Self {
        let total_count = response
            .metadata
            .actual_entry_count
            .unwrap_or(response.entries.len());
        let generated_at = response
            .metadata
            .generated_at
            .as_deref()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|at| at.with_timezone(&Utc));

        let entries = response
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| LeaderboardEntry {
                rank: index + 1,
                id: entry.image_id,
                media_ref: entry.image_url,
                owner_id: entry.user_id,
                rating: entry.rating,
                deviation: entry.rd.unwrap_or(DEFAULT_DEVIATION),
                battles: entry.battles,
                wins: entry.wins,
                losses: entry.losses,
                draws: entry.draws,
            })
            .collect();

        Self {
            kind,
            entries,
            total_count,
            generated_at,
        }
    }

    /// The first three entries
    pub fn podium(&self) -> &[LeaderboardEntry] {
        &self.entries[..self.entries.len().min(3)]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Body of `GET /leaderboards/<kind>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    #[serde(default)]
    pub entries: Vec<LeaderboardWireEntry>,
    #[serde(default)]
    pub metadata: LeaderboardMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardWireEntry {
    pub image_id: String,
    pub image_url: String,
    pub user_id: String,
    pub rating: f64,
    #[serde(default)]
    pub rd: Option<f64>,
    #[serde(default)]
    pub battles: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardMetadata {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub actual_entry_count: Option<usize>,
    #[serde(default)]
    pub update_count: Option<u64>,
}
