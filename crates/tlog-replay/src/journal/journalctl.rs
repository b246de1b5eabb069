//! Journal source backed by the `journalctl` command.

use std::process::Stdio;

use futures::{StreamExt, future, stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;

use super::{EntryStream, JournalEntry, JournalQuery, JournalSource};
use crate::error::{ReplayError, Result};

/// Default journalctl binary.
pub const DEFAULT_PROGRAM: &str = "journalctl";

/// Runs `journalctl --output=json` for every query.
#[derive(Debug, Clone)]
pub struct JournalctlSource {
    program: String,
    extra_args: Vec<String>,
}

impl Default for JournalctlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl JournalctlSource {
    /// Use `journalctl` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Use a different binary.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass an extra argument on every run, e.g. `--directory=...`.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Build the argument list for a query.
    #[must_use]
    pub fn args(&self, query: &JournalQuery) -> Vec<String> {
        let mut args = vec![
            "--output=json".to_string(),
            "--merge".to_string(),
            "--lines=all".to_string(),
            "--no-pager".to_string(),
        ];
        if query.follow {
            args.push("--follow".to_string());
        }
        if let Some(after) = &query.after {
            args.push(format!("--after-cursor={after}"));
        } else if let Some(cursor) = &query.cursor {
            args.push(format!("--cursor={cursor}"));
        }
        // journalctl takes whole seconds; round outwards so the window
        // covers every requested millisecond.
        if let Some(since) = query.since {
            args.push(format!("--since=@{}", since / 1000));
        }
        if let Some(until) = query.until {
            args.push(format!("--until=@{}", until.div_ceil(1000)));
        }
        if let Some(grep) = &query.grep {
            args.push(format!("--grep={grep}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.extend(query.matches.iter().cloned());
        args
    }
}

fn parse_line(line: std::io::Result<String>) -> Option<Result<JournalEntry>> {
    match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(
            serde_json::from_str(&line)
                .map_err(|e| ReplayError::stream(format!("invalid journal entry: {e}"))),
        ),
        Err(e) => Some(Err(ReplayError::stream(format!(
            "reading journalctl output: {e}"
        )))),
    }
}

impl JournalSource for JournalctlSource {
    fn open(&self, query: &JournalQuery) -> EntryStream {
        let args = self.args(query);
        tracing::debug!(program = %self.program, ?args, "Starting journalctl");

        let spawned = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = ReplayError::stream(format!("failed to run {}: {e}", self.program));
                return stream::once(future::ready(Err(err))).boxed();
            }
        };

        let Some(stdout) = child.stdout.take() else {
            let err = ReplayError::stream("journalctl stdout was not captured");
            return stream::once(future::ready(Err(err))).boxed();
        };

        let entries = LinesStream::new(BufReader::new(stdout).lines())
            .filter_map(|line| future::ready(parse_line(line)));

        // The child lives in the exit future so dropping the stream kills it.
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(ReplayError::stream(format!(
                    "journalctl exited with {status}"
                )))),
                Err(e) => Some(Err(ReplayError::stream(format!(
                    "waiting for journalctl: {e}"
                )))),
            }
        })
        .filter_map(future::ready);

        entries.chain(exit).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_args() {
        let source = JournalctlSource::new();
        let query = JournalQuery::new(["TLOG_REC=abc"]);
        assert_eq!(
            source.args(&query),
            vec![
                "--output=json",
                "--merge",
                "--lines=all",
                "--no-pager",
                "TLOG_REC=abc"
            ]
        );
    }

    #[test]
    fn follow_args_carry_cursor_and_grep() {
        let source = JournalctlSource::new().arg("--directory=/var/log/journal");
        let query = JournalQuery::new(["TLOG_REC=abc"])
            .follow(true)
            .cursor("s=1")
            .grep("ls");
        let args = source.args(&query);
        assert!(args.contains(&"--follow".to_string()));
        assert!(args.contains(&"--cursor=s=1".to_string()));
        assert!(args.contains(&"--grep=ls".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("TLOG_REC=abc"));
    }

    #[test]
    fn time_window_and_after_cursor_args() {
        let source = JournalctlSource::new();
        let query = JournalQuery::new(["_HOSTNAME=build01"])
            .cursor("s=1")
            .after("s=2")
            .since(1_700_000_000_250)
            .until(1_700_003_600_250);
        let args = source.args(&query);
        assert!(args.contains(&"--after-cursor=s=2".to_string()));
        assert!(!args.contains(&"--cursor=s=1".to_string()));
        assert!(args.contains(&"--since=@1700000000".to_string()));
        assert!(args.contains(&"--until=@1700003601".to_string()));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line(Ok("  ".into())).is_none());
        assert!(matches!(parse_line(Ok("not json".into())), Some(Err(_))));
    }

    #[tokio::test]
    async fn missing_binary_yields_stream_error() {
        let source = JournalctlSource::new().program("/nonexistent/journalctl-binary");
        let mut entries = source.open(&JournalQuery::new(["TLOG_REC=x"]));
        let first = entries.next().await;
        assert!(matches!(first, Some(Err(ReplayError::Stream { .. }))));
        assert!(entries.next().await.is_none());
    }
}
