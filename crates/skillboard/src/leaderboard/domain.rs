use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for ranked users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External activity source such as a coding judge or VCS host.
///
/// Identities are trimmed and upper-cased on construction so `leetcode`, `LeetCode` and
/// `LEETCODE` resolve to the same weight and range entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Platform(String);

impl Platform {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Platform {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field of a platform metric record.
///
/// Collectors emit whatever their upstream API returns, so anything that is not a number is
/// retained verbatim and ignored by scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Other(serde_json::Value),
}

impl MetricValue {
    /// Finite numeric value, if this field carries one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        MetricValue::Number(f64::from(value))
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Other(serde_json::Value::String(value.to_string()))
    }
}

/// Ordered mapping from field name to value for one platform capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(BTreeMap<String, MetricValue>);

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<MetricValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&MetricValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, MetricValue)> for MetricRecord {
    fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One timestamped capture of a user's metrics on one platform account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub user_id: UserId,
    pub platform: Platform,
    /// Account handle on the platform; distinct handles are scored as separate connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_handle: Option<String>,
    pub metrics: MetricRecord,
    /// Normalized 0-100 score stored by the collector, when already computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_score: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// All snapshots known for one user. Users without any connected platform still appear
/// here with an empty list so they rank with a composite score of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshots {
    pub user_id: UserId,
    #[serde(default)]
    pub snapshots: Vec<MetricSnapshot>,
}

impl UserSnapshots {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            snapshots: Vec::new(),
        }
    }
}

/// Group a flat snapshot stream by owner, ordered by user id.
pub fn group_by_user<I>(snapshots: I) -> Vec<UserSnapshots>
where
    I: IntoIterator<Item = MetricSnapshot>,
{
    let mut grouped: BTreeMap<UserId, Vec<MetricSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        grouped
            .entry(snapshot.user_id.clone())
            .or_default()
            .push(snapshot);
    }

    grouped
        .into_iter()
        .map(|(user_id, snapshots)| UserSnapshots { user_id, snapshots })
        .collect()
}

/// Normalized (0-100) contribution of one platform connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformScore {
    pub platform: Platform,
    pub score: f64,
}

impl PlatformScore {
    pub fn new(platform: impl Into<Platform>, score: f64) -> Self {
        Self {
            platform: platform.into(),
            score,
        }
    }
}

/// Composite score for one user, computed fresh on every build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: UserId,
    pub score: f64,
}

impl UserScore {
    pub fn new(user_id: impl Into<String>, score: f64) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            score,
        }
    }
}

/// Leaderboard row. Tied scores share a rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub user_id: UserId,
    pub score: f64,
    pub rank: u32,
}

/// Which slice of history a leaderboard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardScope {
    Global,
    Weekly,
}

impl LeaderboardScope {
    pub fn ordered() -> [LeaderboardScope; 2] {
        [LeaderboardScope::Global, LeaderboardScope::Weekly]
    }

    pub fn label(&self) -> &'static str {
        match self {
            LeaderboardScope::Global => "global",
            LeaderboardScope::Weekly => "weekly",
        }
    }

    /// Trailing window of snapshots considered, `None` meaning all history.
    pub fn window(&self) -> Option<Duration> {
        match self {
            LeaderboardScope::Global => None,
            LeaderboardScope::Weekly => Some(Duration::days(7)),
        }
    }
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown leaderboard scope '{0}' (expected 'global' or 'weekly')")]
pub struct UnknownScope(pub String);

impl FromStr for LeaderboardScope {
    type Err = UnknownScope;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" | "all" | "all-time" => Ok(LeaderboardScope::Global),
            "weekly" | "week" => Ok(LeaderboardScope::Weekly),
            _ => Err(UnknownScope(value.to_string())),
        }
    }
}
