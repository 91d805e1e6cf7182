use crate::infra::load_snapshots;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use skillboard::error::AppError;
use skillboard::leaderboard::export::write_csv;
use skillboard::leaderboard::{
    AggregationPolicy, LeaderboardBuild, LeaderboardScope, RankedEntry, ScoringConfig,
    ScoringEngine, SkippedUser,
};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum RankFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    /// JSON export of metric snapshots, either flat or grouped per user
    #[arg(long)]
    pub(crate) snapshots: PathBuf,
    /// Leaderboard scope (global or weekly)
    #[arg(long, default_value_t = LeaderboardScope::Global)]
    pub(crate) scope: LeaderboardScope,
    /// Aggregation policy; defaults to the scoring configuration's policy
    #[arg(long)]
    pub(crate) policy: Option<AggregationPolicy>,
    /// Scoring configuration JSON (weights and ranges); defaults to the standard table
    #[arg(long)]
    pub(crate) scoring_config: Option<PathBuf>,
    /// Reference time for windowed scopes (RFC 3339, defaults to now)
    #[arg(long)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Only print the first N entries
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    #[arg(long, value_enum, default_value_t = RankFormat::Table)]
    pub(crate) format: RankFormat,
}

#[derive(Debug, Serialize)]
struct RankOutput<'a> {
    scope: LeaderboardScope,
    policy: AggregationPolicy,
    computed_at: DateTime<Utc>,
    total: usize,
    entries: &'a [RankedEntry],
    skipped: &'a [SkippedUser],
}

pub(crate) fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let RankArgs {
        snapshots,
        scope,
        policy,
        scoring_config,
        now,
        limit,
        format,
    } = args;

    let users = load_snapshots(&snapshots)?;
    let config = match scoring_config {
        Some(path) => ScoringConfig::from_path(path)?,
        None => ScoringConfig::standard(),
    };
    let policy = policy.unwrap_or(config.policy);
    let engine = ScoringEngine::new(config)?;

    let now = now.unwrap_or_else(Utc::now);
    let since = scope.window().map(|window| now - window);
    let build = engine.build_with(&users, policy, since);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(&mut out, format, scope, policy, now, &build, limit)?;

    for skipped in &build.skipped {
        eprintln!("skipped {}: {}", skipped.user_id, skipped.reason);
    }
    Ok(())
}

fn render<W: Write>(
    out: &mut W,
    format: RankFormat,
    scope: LeaderboardScope,
    policy: AggregationPolicy,
    computed_at: DateTime<Utc>,
    build: &LeaderboardBuild,
    limit: Option<usize>,
) -> Result<(), AppError> {
    let shown = match limit {
        Some(limit) => &build.entries[..limit.min(build.entries.len())],
        None => &build.entries[..],
    };

    match format {
        RankFormat::Table => render_table(out, scope, policy, build.entries.len(), shown)?,
        RankFormat::Json => {
            let output = RankOutput {
                scope,
                policy,
                computed_at,
                total: build.entries.len(),
                entries: shown,
                skipped: &build.skipped,
            };
            serde_json::to_writer_pretty(&mut *out, &output)?;
            writeln!(out)?;
        }
        RankFormat::Csv => write_csv(&mut *out, shown)?,
    }
    Ok(())
}

fn render_table<W: Write>(
    out: &mut W,
    scope: LeaderboardScope,
    policy: AggregationPolicy,
    total: usize,
    entries: &[RankedEntry],
) -> io::Result<()> {
    writeln!(out, "{scope} leaderboard ({policy}, {total} ranked)")?;
    if entries.is_empty() {
        writeln!(out, "No users ranked")?;
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|entry| entry.user_id.0.len())
        .max()
        .unwrap_or(0)
        .max("user".len());
    writeln!(out, "{:>4}  {:<width$}  {:>7}", "rank", "user", "score")?;
    for entry in entries {
        writeln!(
            out,
            "{:>4}  {:<width$}  {:>7.2}",
            entry.rank, entry.user_id.0, entry.score
        )?;
    }
    Ok(())
}
