//! Guards the repository layer against SQLite-isms creeping back in: every
//! sqlx query literal in this crate must use Postgres `$n` binds.

use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Pulls the first string literal after a `sqlx::query*(` call site. Raw
/// strings and `format!`-built column interpolation are both in use here, so
/// the parser only needs plain and raw string openings.
fn parse_sql_literal_from_call(content: &str, call_idx: usize) -> Option<(usize, String)> {
    let open_paren_rel = content[call_idx..].find('(')?;
    let mut i = call_idx + open_paren_rel + 1;
    let bytes = content.as_bytes();

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    if bytes[i] == b'r' {
        let mut j = i + 1;
        let mut hashes = 0usize;
        while j < bytes.len() && bytes[j] == b'#' {
            hashes += 1;
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'"' {
            return None;
        }
        let start = j + 1;
        let mut end_marker = String::from("\"");
        end_marker.push_str(&"#".repeat(hashes));
        let end_rel = content[start..].find(&end_marker)?;
        return Some((i, content[start..start + end_rel].to_string()));
    }

    if bytes[i] == b'"' {
        let start = i + 1;
        let mut j = start;
        let mut escaped = false;
        while j < bytes.len() {
            let b = bytes[j];
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                return Some((i, content[start..j].to_string()));
            }
            j += 1;
        }
    }

    None
}

fn extract_sql_literals(content: &str) -> Vec<(usize, String)> {
    let mut result = Vec::new();
    let mut pos = 0usize;
    while let Some(rel) = content[pos..].find("sqlx::query") {
        let idx = pos + rel;
        if let Some(parsed) = parse_sql_literal_from_call(content, idx) {
            result.push(parsed);
        }
        pos = idx + "sqlx::query".len();
    }
    result
}

#[test]
fn sqlx_queries_must_use_postgres_placeholders() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    collect_rs_files(&root, &mut files);
    assert!(!files.is_empty(), "No source files found under src/");

    let mut violations = Vec::new();
    for file in files {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for (byte_idx, sql) in extract_sql_literals(&content) {
            if sql.contains('?') {
                violations.push(format!(
                    "{}:{} contains '?' placeholder in sqlx query literal",
                    file.display(),
                    line_number(&content, byte_idx)
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Found non-Postgres placeholders in SQL literals:\n{}",
        violations.join("\n")
    );
}

#[test]
fn sqlx_queries_must_not_use_sqlite_syntax() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    collect_rs_files(&root, &mut files);

    let mut violations = Vec::new();
    for file in files {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for (byte_idx, sql) in extract_sql_literals(&content) {
            let lower = sql.to_lowercase();
            if lower.contains("insert or ignore")
                || lower.contains("strftime(")
                || lower.contains("datetime(")
            {
                violations.push(format!(
                    "{}:{} contains SQLite-only SQL syntax",
                    file.display(),
                    line_number(&content, byte_idx)
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Found SQLite-specific SQL in query literals:\n{}",
        violations.join("\n")
    );
}

#[test]
fn plan_activation_serializes_on_the_account_row() {
    let file =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("src/repositories/subscription_repo.rs");
    let content = fs::read_to_string(&file).expect("subscription_repo.rs must be readable");

    let locks_account = extract_sql_literals(&content).into_iter().any(|(_, sql)| {
        let lower = sql.to_lowercase();
        lower.contains("from accounts") && lower.contains("for update")
    });

    assert!(
        locks_account,
        "subscription activation must lock the account row before its \
         update-else-insert, or two racing activations can both insert"
    );
}
