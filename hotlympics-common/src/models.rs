//! Comparison data model
//!
//! Items are immutable value objects from the client's point of view: every
//! mutation (ratings, battle counts, pool membership) happens server-side and
//! is only observed by fetching a fresh block.
//!
//! Field names follow the backend's JSON (`imageId`, `glicko`, ...). The
//! neutral names (`id`, `mediaRef`, `rating`, ...) are accepted as aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::time::wire_timestamp;
use crate::Error;

/// Category used to select which pool of items is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cohort {
    Female,
    Male,
}

impl Cohort {
    /// The other cohort
    pub fn opposite(self) -> Self {
        match self {
            Cohort::Female => Cohort::Male,
            Cohort::Male => Cohort::Female,
        }
    }

    /// Tag used in query strings and JSON
    pub fn as_str(self) -> &'static str {
        match self {
            Cohort::Female => "female",
            Cohort::Male => "male",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cohort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" => Ok(Cohort::Female),
            "male" => Ok(Cohort::Male),
            other => Err(Error::InvalidInput(format!("unknown cohort: {:?}", other))),
        }
    }
}

/// Cumulative comparison statistics for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonStats {
    #[serde(default)]
    pub battles: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
}

impl ComparisonStats {
    /// Fraction of battles won, `None` before the first battle
    pub fn win_rate(&self) -> Option<f64> {
        if self.battles == 0 {
            None
        } else {
            Some(self.wins as f64 / self.battles as f64)
        }
    }
}

/// Server-maintained Glicko-2 rating state at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub rating: f64,

    /// Rating deviation (RD)
    #[serde(rename = "rd", alias = "deviation")]
    pub deviation: f64,

    pub volatility: f64,

    /// Glicko-2 scale rating
    #[serde(default)]
    pub mu: f64,

    /// Glicko-2 scale deviation
    #[serde(default)]
    pub phi: f64,

    /// Monotonic version of the rating record
    #[serde(rename = "systemVersion", alias = "version")]
    pub version: u64,

    #[serde(rename = "lastUpdateAt", alias = "updatedAt", with = "wire_timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A comparison candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "imageId", alias = "id")]
    pub id: String,

    /// Opaque media reference (an image URL for the HTTP backend)
    #[serde(rename = "imageUrl", alias = "mediaRef")]
    pub media_ref: String,

    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: String,

    #[serde(rename = "gender", alias = "cohort")]
    pub cohort: Cohort,

    #[serde(flatten)]
    pub stats: ComparisonStats,

    #[serde(rename = "glicko", alias = "rating")]
    pub rating: RatingSnapshot,

    #[serde(rename = "inPool", default)]
    pub in_pool: bool,

    #[serde(default)]
    pub status: Option<String>,
}

/// Two items presented side by side
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub left: Item,
    pub right: Item,
}

impl Pair {
    pub fn new(left: Item, right: Item) -> Self {
        Self { left, right }
    }

    /// Identifiers as `(left, right)`
    pub fn ids(&self) -> (&str, &str) {
        (&self.left.id, &self.right.id)
    }
}

/// A viewer's decision on a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Left,
    Right,
    Draw,
}

/// Outcome of one pairwise comparison
///
/// Built, submitted and dropped. Only the winner, loser and draw flag go over
/// the wire; `decided_at` is kept for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    pub winner_id: String,
    pub loser_id: String,
    #[serde(default)]
    pub is_draw: bool,
    #[serde(skip_serializing, default = "crate::time::now")]
    pub decided_at: DateTime<Utc>,
}

impl ComparisonOutcome {
    pub fn new(winner_id: impl Into<String>, loser_id: impl Into<String>) -> Self {
        Self {
            winner_id: winner_id.into(),
            loser_id: loser_id.into(),
            is_draw: false,
            decided_at: crate::time::now(),
        }
    }

    /// Outcome for `choice` made on `pair`
    ///
    /// A draw keeps left/right in the winner/loser slots and sets `is_draw`.
    pub fn from_choice(pair: &Pair, choice: Choice) -> Self {
        let (winner, loser) = match choice {
            Choice::Left | Choice::Draw => (&pair.left, &pair.right),
            Choice::Right => (&pair.right, &pair.left),
        };
        Self {
            is_draw: choice == Choice::Draw,
            ..Self::new(winner.id.clone(), loser.id.clone())
        }
    }
}

/// Envelope returned by the block endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub success: bool,
    #[serde(default, alias = "images", deserialize_with = "block_items")]
    pub items: Vec<Item>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decode block items, skipping entries tagged with a cohort this client
/// does not know; any other malformed entry fails the whole block
fn block_items<'de, D>(deserializer: D) -> Result<Vec<Item>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        if let Some(tag) = unknown_cohort_tag(&value) {
            let id = value.get("imageId").or_else(|| value.get("id"));
            warn!(item = ?id, cohort = %tag, "Skipping item with unknown cohort");
            continue;
        }
        items.push(serde_json::from_value(value).map_err(serde::de::Error::custom)?);
    }
    Ok(items)
}

fn unknown_cohort_tag(value: &serde_json::Value) -> Option<&serde_json::Value> {
    let tag = value.get("gender").or_else(|| value.get("cohort"))?;
    (tag.is_string() && Cohort::deserialize(tag).is_err()).then_some(tag)
}

/// Envelope returned by the comparison endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
