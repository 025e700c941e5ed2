use std::path::{Path, PathBuf};

use crate::errors::BlindsightError;

/// Write a dumped table to `<dir>/dump/<db>/<table>.csv`, replacing any
/// previous dump only once the new file is complete.
pub fn write_table_csv(
    dir: &Path,
    db: &str,
    table: &str,
    columns: &[String],
    rows: &[Vec<String>],
) -> Result<PathBuf, BlindsightError> {
    let target_dir = dir.join("dump").join(file_safe(db));
    std::fs::create_dir_all(&target_dir)?;
    let path = target_dir.join(format!("{}.csv", file_safe(table)));
    let staging = target_dir.join(format!(".{}.csv.tmp", file_safe(table)));

    let mut writer = csv::Writer::from_path(&staging)?;
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    drop(writer);

    std::fs::rename(&staging, &path)?;
    Ok(path)
}

fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "_".to_string(),
        rest => rest.to_string(),
    }
}
