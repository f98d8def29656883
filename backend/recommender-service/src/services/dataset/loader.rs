use crate::error::{RecommenderError, Result};
use crate::models::{ProblemId, ProblemMetadata, RawInteraction};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

const TITLE_COLUMNS: [&str; 2] = ["titleKo", "title"];

/// Load (handle, problem id) rows from the solved-info table.
///
/// The last two columns are used, so an optional leading index column is
/// ignored. Exact duplicate rows are dropped, keeping the first occurrence.
pub fn load_interactions<P: AsRef<Path>>(path: P) -> Result<Vec<RawInteraction>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        RecommenderError::DataLoad(format!("failed to open {}: {}", path.display(), e))
    })?;

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    let mut duplicates = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 2 {
            return Err(RecommenderError::DataLoad(format!(
                "{}:{}: expected at least 2 columns, got {}",
                path.display(),
                line + 2,
                record.len()
            )));
        }
        let user = record[record.len() - 2].trim().to_string();
        let item = parse_problem_id(&record[record.len() - 1]).ok_or_else(|| {
            RecommenderError::DataLoad(format!(
                "{}:{}: invalid problem id {:?}",
                path.display(),
                line + 2,
                &record[record.len() - 1]
            ))
        })?;

        let row = RawInteraction::new(user, item);
        if seen.insert(row.clone()) {
            rows.push(row);
        } else {
            duplicates += 1;
        }
    }

    info!(
        path = %path.display(),
        interactions = rows.len(),
        duplicates,
        "Loaded interactions"
    );
    Ok(rows)
}

/// Load the problem metadata table keyed by problem id.
pub fn load_problem_metadata<P: AsRef<Path>>(path: P) -> Result<BTreeMap<ProblemId, ProblemMetadata>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        RecommenderError::DataLoad(format!("failed to open {}: {}", path.display(), e))
    })?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let missing = |name: &str| {
        RecommenderError::DataLoad(format!(
            "{}: missing column {:?} (available: {:?})",
            path.display(),
            name,
            headers.iter().collect::<Vec<_>>()
        ))
    };

    let id_col = column("problemId").ok_or_else(|| missing("problemId"))?;
    let title_col = TITLE_COLUMNS
        .iter()
        .find_map(|name| column(name))
        .ok_or_else(|| missing("titleKo"))?;
    let tags_col = column("tags").ok_or_else(|| missing("tags"))?;
    let level_col = column("level").ok_or_else(|| missing("level"))?;

    let mut problems = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let Some(problem_id) = parse_problem_id(field(id_col)) else {
            warn!(line = line + 2, "Skipping problem row with invalid id");
            continue;
        };
        let level = field(level_col).trim().parse::<f64>().map(|l| l as u32).unwrap_or(0);

        let extra = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| ![id_col, title_col, tags_col, level_col].contains(idx))
            .map(|(idx, name)| (name.to_string(), field(idx).to_string()))
            .collect();

        problems.insert(
            problem_id,
            ProblemMetadata {
                problem_id,
                title: field(title_col).to_string(),
                tags: parse_tags(field(tags_col)),
                level,
                extra,
            },
        );
    }

    info!(path = %path.display(), problems = problems.len(), "Loaded problem metadata");
    Ok(problems)
}

/// Split a list-like tag cell (`['dp', 'greedy']`, `dp,greedy`, `dp greedy`)
/// into identifier tokens.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_problem_id(raw: &str) -> Option<ProblemId> {
    let raw = raw.trim();
    raw.parse::<ProblemId>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|v| v as ProblemId))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("['dp', 'greedy']"), vec!["dp", "greedy"]);
        assert_eq!(parse_tags("math,number_theory"), vec!["math", "number_theory"]);
        assert!(parse_tags("[]").is_empty());
    }

    #[test]
    fn test_load_interactions_with_index_column() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, ",handle,problemId").unwrap();
        writeln!(file, "0,kim,1000").unwrap();
        writeln!(file, "1,kim,1001").unwrap();
        writeln!(file, "2,kim,1000").unwrap();
        writeln!(file, "3,lee,1000.0").unwrap();

        let rows = load_interactions(file.path()).unwrap();
        assert_eq!(
            rows,
            vec![
                RawInteraction::new("kim", 1000),
                RawInteraction::new("kim", 1001),
                RawInteraction::new("lee", 1000),
            ]
        );
    }

    #[test]
    fn test_load_interactions_rejects_bad_id() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "handle,problemId").unwrap();
        writeln!(file, "kim,abc").unwrap();

        assert!(matches!(
            load_interactions(file.path()),
            Err(RecommenderError::DataLoad(_))
        ));
    }

    #[test]
    fn test_load_problem_metadata_passes_extra_columns() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "problemId,titleKo,tags,level,acceptedUserCount").unwrap();
        writeln!(file, "1000,A+B,\"['math', 'implementation']\",1,300000").unwrap();
        writeln!(file, "1753,최단경로,\"['graphs', 'dijkstra']\",12,20000").unwrap();

        let problems = load_problem_metadata(file.path()).unwrap();
        assert_eq!(problems.len(), 2);

        let p = &problems[&1753];
        assert_eq!(p.title, "최단경로");
        assert_eq!(p.tags, vec!["graphs", "dijkstra"]);
        assert_eq!(p.level, 12);
        assert_eq!(p.extra.get("acceptedUserCount").map(String::as_str), Some("20000"));
    }

    #[test]
    fn test_load_problem_metadata_requires_columns() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "problemId,tags,level").unwrap();
        writeln!(file, "1000,[],1").unwrap();

        assert!(load_problem_metadata(file.path()).is_err());
    }
}
