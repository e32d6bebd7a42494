//! Operator console: line commands in, rendered workflow state out.

use crate::types::TicketId;
use crate::workflow::{Feedback, FeedbackStatus, Phase, WorkflowAction, WorkflowState};
use std::fmt::Write as _;
use thiserror::Error;

/// Help text printed by `help`
pub const HELP: &str = "\
Commands:
  open              start the scanner
  close             stop the scanner
  scan <text>       feed decoded QR text to the running scanner
  remarks <text>    set remarks for the loaded ticket
  commit            mark the loaded ticket used
  cancel            discard the loaded ticket
  status            show the current state
  logout            sign out and exit
  quit              exit";

/// One console command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `open`
    Open,
    /// `close`
    Close,
    /// `scan <text>`
    Scan(String),
    /// `remarks <text>` (text may be empty)
    Remarks(String),
    /// `commit`
    Commit,
    /// `cancel`
    Cancel,
    /// `status`
    Status,
    /// `logout`
    Logout,
    /// `quit`
    Quit,
    /// `help`
    Help,
}

/// Unparseable console input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Not a known command
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    /// Command needs an argument
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
}

impl Command {
    /// Parse one input line; blank lines yield `None`
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for unknown commands or missing arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        let command = match word.to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "close" => Self::Close,
            "scan" if rest.is_empty() => return Err(CommandError::MissingArgument("scan")),
            "scan" => Self::Scan(rest.to_string()),
            "remarks" => Self::Remarks(rest.to_string()),
            "commit" => Self::Commit,
            "cancel" => Self::Cancel,
            "status" => Self::Status,
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            "help" | "?" => Self::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Workflow action for commands that map onto one
    #[must_use]
    pub fn into_action(self) -> Option<WorkflowAction> {
        match self {
            Self::Open => Some(WorkflowAction::OpenScanner),
            Self::Close => Some(WorkflowAction::CloseScanner),
            Self::Remarks(remarks) => Some(WorkflowAction::EditRemarks { remarks }),
            Self::Commit => Some(WorkflowAction::Commit),
            Self::Cancel => Some(WorkflowAction::Cancel),
            Self::Scan(_) | Self::Status | Self::Logout | Self::Quit | Self::Help => None,
        }
    }
}

/// Render one feedback line
#[must_use]
pub fn render_feedback(feedback: &Feedback) -> String {
    let tag = match feedback.status {
        FeedbackStatus::Success => "OK",
        FeedbackStatus::Error => "ERROR",
    };
    format!("{tag}: {}", feedback.message)
}

/// Render the whole workflow state
#[must_use]
pub fn render_state(state: &WorkflowState) -> String {
    let mut out = format!("[{}]", state.phase);
    if let Some(feedback) = &state.feedback {
        let _ = write!(out, " {}", render_feedback(feedback));
    }

    if let Some(details) = state.details() {
        let _ = write!(out, "\n{details}");
        if state.phase == Phase::Review {
            let remarks = if state.remarks.is_empty() {
                "(none)"
            } else {
                state.remarks.as_str()
            };
            let _ = write!(out, "\nRemarks: {remarks}\n> commit | cancel | remarks <text>");
        }
    } else if state.phase == Phase::Scanning {
        out.push_str("\nWaiting for a QR code...");
    }
    out
}

/// Prints state only when something the operator sees has changed
#[derive(Debug, Default)]
pub struct ConsoleView {
    last: Option<(Phase, Option<Feedback>, Option<TicketId>, String)>,
}

impl ConsoleView {
    /// Creates a new `ConsoleView`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered state if it differs from the last one shown
    pub fn update(&mut self, state: &WorkflowState) -> Option<String> {
        let key = (
            state.phase,
            state.feedback.clone(),
            state.ticket.as_ref().map(|t| t.id.clone()),
            state.remarks.clone(),
        );
        if self.last.as_ref() == Some(&key) {
            return None;
        }
        self.last = Some(key);
        Some(render_state(state))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::types::Ticket;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("open").unwrap(), Some(Command::Open));
        assert_eq!(Command::parse("  CLOSE ").unwrap(), Some(Command::Close));
        assert_eq!(
            Command::parse(r#"scan {"ticketId": "T-101"}"#).unwrap(),
            Some(Command::Scan(r#"{"ticketId": "T-101"}"#.to_string()))
        );
        assert_eq!(
            Command::parse("remarks late   arrival").unwrap(),
            Some(Command::Remarks("late   arrival".to_string()))
        );
        assert_eq!(
            Command::parse("remarks").unwrap(),
            Some(Command::Remarks(String::new()))
        );
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("scan"),
            Err(CommandError::MissingArgument("scan"))
        );
        assert_eq!(
            Command::parse("validate T-1"),
            Err(CommandError::Unknown("validate".to_string()))
        );
    }

    #[test]
    fn test_command_actions() {
        assert_eq!(Command::Open.into_action(), Some(WorkflowAction::OpenScanner));
        assert_eq!(
            Command::Remarks("VIP".into()).into_action(),
            Some(WorkflowAction::EditRemarks {
                remarks: "VIP".into()
            })
        );
        assert_eq!(Command::Scan("T-1".into()).into_action(), None);
        assert_eq!(Command::Quit.into_action(), None);
    }

    #[test]
    fn test_render_review() {
        let mut ticket = Ticket::issued("T-101".parse().unwrap());
        ticket.holder_name = Some("Ada".to_string());
        let state = WorkflowState {
            phase: Phase::Review,
            feedback: Some(Feedback::success("Ticket scanned successfully.")),
            ticket: Some(ticket),
            ..WorkflowState::default()
        };

        let text = render_state(&state);

        assert!(text.starts_with("[review] OK: Ticket scanned successfully."));
        assert!(text.contains("Ada"));
        assert!(text.contains("Remarks: (none)"));
    }

    #[test]
    fn test_render_error_feedback() {
        let state = WorkflowState {
            phase: Phase::Scanning,
            feedback: Some(Feedback::error("Invalid QR Code format.")),
            ..WorkflowState::default()
        };
        assert_eq!(
            render_state(&state),
            "[scanning] ERROR: Invalid QR Code format.\nWaiting for a QR code..."
        );
    }

    #[test]
    fn test_view_skips_unchanged_state() {
        let mut view = ConsoleView::new();
        let mut state = WorkflowState::new();

        assert!(view.update(&state).is_some());
        assert!(view.update(&state).is_none());

        state.remarks = "late arrival".to_string();
        assert_eq!(view.update(&state), Some(render_state(&state)));
        assert!(view.update(&state).is_none());

        state.phase = Phase::Scanning;
        assert!(view.update(&state).is_some());
    }
}
