use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code the shell reports for "command not found". Carries no special
/// handling beyond producing a Failed status; kept named for log readability.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Running,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One streamed output line, tagged with the stream it arrived on.
/// Interleaving across stdout/stderr is preserved in arrival order and
/// never re-sorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

/// Client-side bookkeeping for one remote shell command execution. The
/// command-session identifier is a distinct namespace from conversation
/// session identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandExecution {
    pub command_session_id: String,
    pub command_id: String,
    pub command: String,
    pub working_directory: String,
    pub started_at: DateTime<Utc>,
    pub status: CommandStatus,
    #[serde(default)]
    pub output: Vec<OutputChunk>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CommandExecution {
    pub fn started(
        command_session_id: impl Into<String>,
        command_id: impl Into<String>,
        command: impl Into<String>,
        working_directory: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            command_session_id: command_session_id.into(),
            command_id: command_id.into(),
            command: command.into(),
            working_directory: working_directory.into(),
            started_at,
            status: CommandStatus::Running,
            output: Vec::new(),
            exit_code: None,
            duration_ms: None,
            ended_at: None,
        }
    }

    /// Accumulated output as plain text, in arrival order.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Running.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }

    #[test]
    fn output_text_preserves_interleaving() {
        let mut exec =
            CommandExecution::started("cs1", "c1", "ls", "/tmp", Utc::now());
        exec.output.push(OutputChunk {
            stream: OutputStream::Stdout,
            text: "a\n".into(),
        });
        exec.output.push(OutputChunk {
            stream: OutputStream::Stderr,
            text: "warn\n".into(),
        });
        exec.output.push(OutputChunk {
            stream: OutputStream::Stdout,
            text: "b\n".into(),
        });
        assert_eq!(exec.output_text(), "a\nwarn\nb\n");
    }
}
