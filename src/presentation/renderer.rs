//! One-line terminal rendering of a presentation snapshot.

use owo_colors::OwoColorize;

use super::PresentationSnapshot;
use crate::feedback::FeedbackStatus;

/// Renders snapshots as single status lines.
#[derive(Debug, Clone, Copy)]
pub struct StatusRenderer {
    colored: bool,
    width: usize,
}

impl Default for StatusRenderer {
    fn default() -> Self {
        Self {
            colored: true,
            width: 72,
        }
    }
}

impl StatusRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables ANSI colors.
    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Sets the maximum line width in characters.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Safely truncates a string to the given maximum character count.
    fn safe_truncate(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            s.to_string()
        } else {
            let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", truncated)
        }
    }

    fn label(status: FeedbackStatus) -> &'static str {
        match status {
            FeedbackStatus::Idle => "[idle]",
            FeedbackStatus::Loading => "[....]",
            FeedbackStatus::Success => "[ ok ]",
            FeedbackStatus::Warning => "[warn]",
            FeedbackStatus::Error => "[fail]",
        }
    }

    fn paint(&self, status: FeedbackStatus, text: &str) -> String {
        if !self.colored {
            return text.to_string();
        }
        match status {
            FeedbackStatus::Idle => text.dimmed().to_string(),
            FeedbackStatus::Loading => text.cyan().to_string(),
            FeedbackStatus::Success => text.green().to_string(),
            FeedbackStatus::Warning => text.yellow().to_string(),
            FeedbackStatus::Error => text.red().to_string(),
        }
    }

    /// Renders the snapshot as one line.
    pub fn render(&self, snapshot: &PresentationSnapshot) -> String {
        let label = Self::label(snapshot.status);
        let mut line = match &snapshot.message {
            Some(message) => format!("{} {}", label, message),
            None => label.to_string(),
        };
        if snapshot.connectivity_timeout {
            line.push_str(" | connection slow, check your network");
        }
        if let Some(prompt) = &snapshot.retry_prompt {
            line.push_str(&format!(
                " | attempt {} timed out: retry or cancel?",
                prompt.attempt
            ));
        }
        let line = Self::safe_truncate(&line, self.width);
        self.paint(snapshot.status, &line)
    }
}
