use std::io::Write;

use serde::Serialize;

use super::domain::RankedEntry;

#[derive(Serialize)]
struct CsvRow<'a> {
    rank: u32,
    user_id: &'a str,
    score: f64,
}

/// Write entries as `rank,user_id,score` CSV with a header row.
pub fn write_csv<W: Write>(writer: W, entries: &[RankedEntry]) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        csv_writer.serialize(CsvRow {
            rank: entry.rank,
            user_id: &entry.user_id.0,
            score: entry.score,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
