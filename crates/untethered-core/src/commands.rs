//! Command execution tracker.
//!
//! Each remote shell command runs under its own command-session id; any
//! number may run concurrently, each with an independent output buffer.
//! Finished entries are evicted once they have been terminal longer than
//! the configured window, and the map additionally honors a hard cap, so
//! the tracker never grows without bound.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use untethered_types::{CommandExecution, CommandStatus, OutputChunk, OutputStream};

pub struct CommandTracker {
    entries: HashMap<String, CommandExecution>,
    eviction_window: Duration,
    cap: usize,
}

impl CommandTracker {
    pub fn new(eviction_window_secs: i64, cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            eviction_window: Duration::seconds(eviction_window_secs.max(0)),
            cap: cap.max(1),
        }
    }

    /// Record a freshly sent `execute_command`: a Running entry with empty
    /// output. Runs the eviction pass first so a burst of commands cannot
    /// push the map past its cap.
    pub fn begin(
        &mut self,
        command_session_id: &str,
        command_id: &str,
        command: &str,
        working_directory: &str,
        now: DateTime<Utc>,
    ) -> CommandExecution {
        self.evict(now);
        let exec = CommandExecution::started(
            command_session_id,
            command_id,
            command,
            working_directory,
            now,
        );
        self.entries
            .insert(command_session_id.to_string(), exec.clone());
        exec
    }

    /// Append one streamed chunk in arrival order. Output for an unknown
    /// command session (already evicted, or a stale backend) is dropped.
    pub fn append_output(
        &mut self,
        command_session_id: &str,
        stream: OutputStream,
        text: &str,
    ) -> Option<CommandExecution> {
        let Some(exec) = self.entries.get_mut(command_session_id) else {
            warn!(command_session_id, "output for unknown command session dropped");
            return None;
        };
        exec.output.push(OutputChunk {
            stream,
            text: text.to_string(),
        });
        Some(exec.clone())
    }

    /// Finalize an execution: exit code 0 is Completed, anything else
    /// (including 127, command not found) is Failed.
    pub fn complete(
        &mut self,
        command_session_id: &str,
        exit_code: i32,
        duration_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Option<CommandExecution> {
        let result = {
            let exec = self.entries.get_mut(command_session_id)?;
            exec.exit_code = Some(exit_code);
            exec.duration_ms = duration_ms;
            exec.ended_at = Some(now);
            exec.status = if exit_code == 0 {
                CommandStatus::Completed
            } else {
                CommandStatus::Failed
            };
            exec.clone()
        };
        self.evict(now);
        Some(result)
    }

    /// Drop terminal entries older than the eviction window, then enforce
    /// the cap by evicting the oldest-finished terminal entries. Running
    /// entries are never evicted.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let window = self.eviction_window;
        self.entries.retain(|_, exec| {
            !(exec.status.is_terminal()
                && exec
                    .ended_at
                    .is_some_and(|ended| now - ended > window))
        });

        if self.entries.len() > self.cap {
            let mut terminal: Vec<(String, DateTime<Utc>)> = self
                .entries
                .values()
                .filter(|e| e.status.is_terminal())
                .map(|e| (e.command_session_id.clone(), e.ended_at.unwrap_or(e.started_at)))
                .collect();
            terminal.sort_by_key(|(_, ended)| *ended);
            let excess = self.entries.len().saturating_sub(self.cap);
            for (id, _) in terminal.into_iter().take(excess) {
                self.entries.remove(&id);
            }
        }
    }

    pub fn get(&self, command_session_id: &str) -> Option<&CommandExecution> {
        self.entries.get(command_session_id)
    }

    /// All entries still running, unordered.
    pub fn running(&self) -> Vec<&CommandExecution> {
        self.entries
            .values()
            .filter(|e| e.status == CommandStatus::Running)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
