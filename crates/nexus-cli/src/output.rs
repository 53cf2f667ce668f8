//! Rendering of turn events for stdout.

use nexus_core::StreamEvent;

use crate::cli::OutputFormat;

/// Text to write for `event`, if anything.
pub fn render(event: &StreamEvent, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(event).ok().map(|line| format!("{line}\n")),
        OutputFormat::Text => match event {
            StreamEvent::AssistantChunk { content, .. } => Some(content.clone()),
            StreamEvent::UserQuestion { question, .. } => Some(format!("\n[question] {question}\n")),
            StreamEvent::MessageComplete { .. } => Some("\n".to_owned()),
            StreamEvent::Error { error, .. } => Some(format!("\n[error] {error}\n")),
            StreamEvent::ToolDetected { .. }
            | StreamEvent::ToolStarted { .. }
            | StreamEvent::ToolCompleted { .. }
            | StreamEvent::StateChanged { .. }
            | StreamEvent::Ping { .. } => None,
        },
    }
}
