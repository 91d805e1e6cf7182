use super::domain::{RankedEntry, UserScore};

/// Order users by descending score using competition ("1224") ranking.
///
/// Each entry's rank is its 1-based position in the sorted sequence, except that an entry
/// whose score equals the previous entry's score inherits that entry's rank. The sort is
/// stable, so equal scores keep their input order and repeated calls on the same input
/// produce identical output.
pub fn rank(users: Vec<UserScore>) -> Vec<RankedEntry> {
    let mut sorted = users;
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut entries: Vec<RankedEntry> = Vec::with_capacity(sorted.len());
    for (index, user) in sorted.into_iter().enumerate() {
        let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let rank = match entries.last() {
            Some(previous) if previous.score == user.score => previous.rank,
            _ => position,
        };
        entries.push(RankedEntry {
            user_id: user.user_id,
            score: user.score,
            rank,
        });
    }
    entries
}
