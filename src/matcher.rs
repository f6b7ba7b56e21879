//! External line-matcher collaborator (§9 design note): regex/literal
//! search is delegated to a subprocess rather than reimplemented in-process,
//! the same way `main.rs`'s `Web` subcommand re-execs via
//! `std::process::Command::new(&exe)...status()` — here applied to an
//! external matcher binary instead of re-invoking ourselves.

use crate::error::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub path: String,
    pub line: u32,
    pub snippet: String,
}

pub struct MatcherConfig {
    pub binary: String,
    pub timeout: Duration,
    pub max_results: usize,
    pub pattern_max_chars: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            binary: "rg".to_string(),
            timeout: Duration::from_secs(30),
            max_results: 200,
            pattern_max_chars: 500,
        }
    }
}

fn validate_pattern(pattern: &str, cfg: &MatcherConfig) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::Pattern("empty pattern".into()));
    }
    if pattern.len() > cfg.pattern_max_chars {
        return Err(Error::Pattern(format!("pattern exceeds {} characters", cfg.pattern_max_chars)));
    }
    regex::Regex::new(pattern).map_err(|e| Error::Pattern(e.to_string()))?;
    Ok(())
}

/// Runs the external matcher with structured (`--json`-style, here
/// `--vimgrep`) output and a hard wall-clock timeout (§4.11, §7 `Timeout`).
pub async fn search(root: &std::path::Path, pattern: &str, cfg: &MatcherConfig) -> Result<Vec<MatchRecord>> {
    validate_pattern(pattern, cfg)?;

    let mut child = Command::new(&cfg.binary)
        .arg("--vimgrep")
        .arg("--max-count")
        .arg(cfg.max_results.to_string())
        .arg(pattern)
        .arg(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::WorkerFailure(format!("failed to launch matcher: {e}")))?;

    let stdout = child.stdout.take().ok_or_else(|| Error::WorkerFailure("no stdout".into()))?;
    let mut buf = Vec::new();
    let read = tokio::time::timeout(cfg.timeout, async {
        let mut reader = stdout;
        reader.read_to_end(&mut buf).await
    })
    .await;

    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(Error::WorkerFailure(e.to_string())),
        Err(_) => {
            let _ = child.kill().await;
            return Err(Error::Timeout(format!("matcher exceeded {:?}", cfg.timeout)));
        }
    }
    let _ = child.wait().await;

    let text = String::from_utf8_lossy(&buf);
    Ok(parse_vimgrep(&text, cfg.max_results))
}

/// Parses ripgrep `--vimgrep` output: `path:line:col:text`.
fn parse_vimgrep(text: &str, max_results: usize) -> Vec<MatchRecord> {
    let mut out = Vec::new();
    for line in text.lines() {
        if out.len() >= max_results {
            break;
        }
        let mut parts = line.splitn(4, ':');
        let (Some(path), Some(line_no), Some(_col), Some(snippet)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(line_no) = line_no.parse::<u32>() else { continue };
        out.push(MatchRecord { path: path.to_string(), line: line_no, snippet: snippet.to_string() });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_pattern() {
        let cfg = MatcherConfig { pattern_max_chars: 10, ..Default::default() };
        let pattern = "a".repeat(11);
        assert!(validate_pattern(&pattern, &cfg).is_err());
    }

    #[test]
    fn rejects_invalid_regex() {
        let cfg = MatcherConfig::default();
        assert!(validate_pattern("(unclosed", &cfg).is_err());
    }

    #[test]
    fn accepts_plain_literal() {
        let cfg = MatcherConfig::default();
        assert!(validate_pattern("fn foo", &cfg).is_ok());
    }

    #[test]
    fn parses_vimgrep_lines() {
        let text = "src/a.rs:12:4:fn foo() {}\nsrc/b.rs:3:1:struct Bar;\n";
        let records = parse_vimgrep(text, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "src/a.rs");
        assert_eq!(records[0].line, 12);
    }

    #[test]
    fn respects_max_results() {
        let text = "a.rs:1:1:x\nb.rs:2:1:y\nc.rs:3:1:z\n";
        let records = parse_vimgrep(text, 2);
        assert_eq!(records.len(), 2);
    }
}
