//! Incremental detector that hides directive markup from the visible stream.
//!
//! Model output arrives as arbitrary fragments. The detector walks it one
//! character at a time through a small state machine:
//!
//! - `Scanning` forwards text until a `<` appears
//! - `BufferingOpenTag` holds a candidate opening tag until it is confirmed
//!   as a known directive or ruled out
//! - `InsideDirective` swallows everything up to the matching closing tag
//!
//! Confirmed directives are replaced by a placeholder naming the action.
//! Anything that turns out not to be a directive is released unchanged.

use std::mem;
use std::sync::Arc;

use crate::parser::quote_after;
use crate::vocabulary::DirectiveVocabulary;

/// Longest opening tag buffered before it is released as plain text.
pub const MAX_OPEN_TAG_LEN: usize = 1024;

/// Longest attribute key accepted while an opening tag is buffered.
const MAX_ATTRIBUTE_KEY_LEN: usize = 32;

/// Detector state between characters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DetectorState {
    /// Forwarding visible text.
    #[default]
    Scanning,
    /// Holding a possible opening tag, starting with `<`.
    BufferingOpenTag {
        /// Text held so far
        buffer: String,
    },
    /// Inside a recognized directive, waiting for `</tag>`.
    InsideDirective {
        /// Directive tag
        tag: String,
        /// Raw directive text so far, opening tag included
        buffer: String,
    },
}

/// Something the detector produced for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorOutput {
    /// Text safe to show the operator.
    Visible(String),
    /// A directive was recognized and is now hidden.
    DirectiveStarted {
        /// Tag as written
        tag: String,
        /// Placeholder to show in its place
        placeholder: String,
    },
    /// A directive closed.
    DirectiveFinished {
        /// Tag as written
        tag: String,
        /// Complete raw directive text
        raw: String,
    },
    /// The stream ended inside a directive.
    DirectiveAbandoned {
        /// Tag as written
        tag: String,
        /// Raw text captured before the stream ended
        raw: String,
    },
}

/// Result of one state machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the step
    pub next: DetectorState,
    /// Outputs produced by the step, in order
    pub outputs: Vec<DetectorOutput>,
}

impl Transition {
    fn to(next: DetectorState) -> Self {
        Self {
            next,
            outputs: Vec::new(),
        }
    }

    fn emit(mut self, output: DetectorOutput) -> Self {
        self.outputs.push(output);
        self
    }
}

impl DetectorState {
    /// Advance by one character.
    pub fn step(self, ch: char, vocabulary: &DirectiveVocabulary) -> Transition {
        match self {
            Self::Scanning => {
                if ch == '<' {
                    Transition::to(Self::BufferingOpenTag {
                        buffer: String::from('<'),
                    })
                } else {
                    Transition::to(Self::Scanning).emit(DetectorOutput::Visible(ch.to_string()))
                }
            }
            Self::BufferingOpenTag { buffer } => step_open_tag(buffer, ch, vocabulary),
            Self::InsideDirective { tag, mut buffer } => {
                buffer.push(ch);
                if ch == '>' && buffer.ends_with(&format!("</{tag}>")) {
                    Transition::to(Self::Scanning)
                        .emit(DetectorOutput::DirectiveFinished { tag, raw: buffer })
                        .emit(DetectorOutput::Visible("\n".to_owned()))
                } else {
                    Transition::to(Self::InsideDirective { tag, buffer })
                }
            }
        }
    }
}

fn step_open_tag(mut buffer: String, ch: char, vocabulary: &DirectiveVocabulary) -> Transition {
    if ch == '<' {
        return Transition::to(DetectorState::BufferingOpenTag {
            buffer: String::from('<'),
        })
        .emit(DetectorOutput::Visible(buffer));
    }

    buffer.push(ch);
    let name = tag_name(&buffer);
    let name_complete = buffer.len() > name.len() + 1;

    if !name_complete {
        // Still reading the tag name.
        return if vocabulary.has_prefix(name) {
            Transition::to(DetectorState::BufferingOpenTag { buffer })
        } else {
            release(buffer)
        };
    }

    if !vocabulary.contains(name) {
        return release(buffer);
    }

    let before = buffer.get(name.len() + 1..buffer.len() - ch.len_utf8()).unwrap_or_default();
    let Some(scan) = AttributeScan::over(before) else {
        return release(buffer);
    };

    let tag = name.to_owned();
    if ch == '>' && !matches!(scan, AttributeScan::Quoted(_)) {
        let placeholder = vocabulary.placeholder(&tag);
        let started = DetectorOutput::DirectiveStarted {
            tag: tag.clone(),
            placeholder,
        };
        if buffer.ends_with("/>") {
            return Transition::to(DetectorState::Scanning)
                .emit(started)
                .emit(DetectorOutput::DirectiveFinished { tag, raw: buffer })
                .emit(DetectorOutput::Visible("\n".to_owned()));
        }
        return Transition::to(DetectorState::InsideDirective { tag, buffer }).emit(started);
    }

    if scan.advance(ch).is_none() || buffer.len() > MAX_OPEN_TAG_LEN {
        return release(buffer);
    }
    Transition::to(DetectorState::BufferingOpenTag { buffer })
}

fn release(buffer: String) -> Transition {
    Transition::to(DetectorState::Scanning).emit(DetectorOutput::Visible(buffer))
}

/// Name characters following the leading `<`.
fn tag_name(buffer: &str) -> &str {
    let rest = buffer.get(1..).unwrap_or_default();
    let end = rest
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
        .unwrap_or(rest.len());
    rest.get(..end).unwrap_or_default()
}

/// Position within the attribute list of a buffered opening tag.
///
/// Text that stops looking like `key=value` pairs is prose that happens to
/// mention a tag name, and is released without waiting for a `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeScan {
    Between,
    Key(usize),
    AfterKey,
    AfterEquals,
    Quoted(char),
    Unquoted,
    Slash,
}

impl AttributeScan {
    /// Scan everything after the tag name, `None` once it cannot be attributes.
    fn over(text: &str) -> Option<Self> {
        text.chars().try_fold(Self::Between, Self::advance)
    }

    fn advance(self, ch: char) -> Option<Self> {
        let is_key_char = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_';
        match self {
            Self::Quoted(open) => Some(quote_after(Some(open), ch).map_or(Self::Between, Self::Quoted)),
            Self::Between | Self::AfterEquals if ch.is_whitespace() => Some(self),
            Self::Between if ch == '/' => Some(Self::Slash),
            Self::Between if ch.is_ascii_alphabetic() => Some(Self::Key(1)),
            Self::Key(len) if is_key_char && len < MAX_ATTRIBUTE_KEY_LEN => Some(Self::Key(len + 1)),
            Self::Key(_) | Self::AfterKey if ch == '=' => Some(Self::AfterEquals),
            Self::Key(_) | Self::AfterKey if ch.is_whitespace() => Some(Self::AfterKey),
            Self::AfterEquals => Some(quote_after(None, ch).map_or(Self::Unquoted, Self::Quoted)),
            Self::Unquoted if ch.is_whitespace() => Some(Self::Between),
            Self::Unquoted => Some(self),
            _ => None,
        }
    }
}

/// Stateful wrapper that feeds fragments through [`DetectorState::step`].
#[derive(Debug, Clone)]
pub struct StreamTagDetector {
    vocabulary: Arc<DirectiveVocabulary>,
    state: DetectorState,
}

impl StreamTagDetector {
    /// Create a detector in the scanning state.
    pub fn new(vocabulary: Arc<DirectiveVocabulary>) -> Self {
        Self {
            vocabulary,
            state: DetectorState::Scanning,
        }
    }

    /// Current state.
    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Process one fragment. Adjacent visible text is merged.
    pub fn feed(&mut self, fragment: &str) -> Vec<DetectorOutput> {
        let mut outputs = Vec::new();
        for ch in fragment.chars() {
            let state = mem::take(&mut self.state);
            let transition = state.step(ch, &self.vocabulary);
            self.state = transition.next;
            for output in transition.outputs {
                push_coalesced(&mut outputs, output);
            }
        }
        outputs
    }

    /// Flush whatever is held when the stream ends.
    ///
    /// A pending opening tag was never confirmed, so it is released as
    /// text. An unterminated directive stays hidden.
    pub fn finish(&mut self) -> Vec<DetectorOutput> {
        match mem::take(&mut self.state) {
            DetectorState::Scanning => Vec::new(),
            DetectorState::BufferingOpenTag { buffer } => vec![DetectorOutput::Visible(buffer)],
            DetectorState::InsideDirective { tag, buffer } => {
                vec![DetectorOutput::DirectiveAbandoned { tag, raw: buffer }]
            }
        }
    }
}

fn push_coalesced(outputs: &mut Vec<DetectorOutput>, output: DetectorOutput) {
    if let DetectorOutput::Visible(text) = &output
        && let Some(DetectorOutput::Visible(previous)) = outputs.last_mut()
    {
        previous.push_str(text);
        return;
    }
    outputs.push(output);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> StreamTagDetector {
        StreamTagDetector::new(Arc::new(DirectiveVocabulary::default()))
    }

    fn run(fragments: &[&str]) -> Vec<DetectorOutput> {
        let mut detector = detector();
        let mut outputs = Vec::new();
        for fragment in fragments {
            for output in detector.feed(fragment) {
                push_coalesced(&mut outputs, output);
            }
        }
        for output in detector.finish() {
            push_coalesced(&mut outputs, output);
        }
        outputs
    }

    fn visible(outputs: &[DetectorOutput]) -> String {
        outputs
            .iter()
            .filter_map(|output| match output {
                DetectorOutput::Visible(text) => Some(text.as_str()),
                DetectorOutput::DirectiveStarted { placeholder, .. } => Some(placeholder.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_plain_text_passes_through() {
        let outputs = run(&["Hello ", "world"]);
        assert_eq!(outputs, vec![DetectorOutput::Visible("Hello world".to_owned())]);
    }

    #[test]
    fn test_directive_split_across_fragments_is_hidden() {
        let outputs = run(&["Sure. <web-sea", "rch query=\"AI tr", "ends\"></web-search> done"]);
        let text = visible(&outputs);
        assert_eq!(text, "Sure. \n\n**Searching Web**\n\n done");
        assert!(!text.contains("query"));
        assert!(outputs.iter().any(|output| matches!(
            output,
            DetectorOutput::DirectiveFinished { tag, raw }
                if tag == "web-search" && raw == "<web-search query=\"AI trends\"></web-search>"
        )));
    }

    #[test]
    fn test_non_directive_markup_is_released() {
        let text = visible(&run(&["a <b>bold</b> and <div class=\"x\">"]));
        assert_eq!(text, "a <b>bold</b> and <div class=\"x\">");
    }

    #[test]
    fn test_comparison_operator_is_released() {
        assert_eq!(visible(&run(&["if x < 3 then"])), "if x < 3 then");
    }

    #[test]
    fn test_unknown_tag_sharing_prefix_is_released() {
        let text = visible(&run(&["<web-searcher q=\"1\"> ok"]));
        assert_eq!(text, "<web-searcher q=\"1\"> ok");
    }

    #[test]
    fn test_self_closing_directive() {
        let outputs = run(&["<list-files path=\".\" /> after"]);
        assert_eq!(visible(&outputs), "\n\n**Listing Files**\n\n after");
        assert!(matches!(
            outputs.get(1),
            Some(DetectorOutput::DirectiveFinished { tag, .. }) if tag == "list-files"
        ));
    }

    #[test]
    fn test_unterminated_directive_stays_hidden() {
        let outputs = run(&["start <create-file path=\"a.md\">secret body"]);
        assert_eq!(visible(&outputs), "start \n\n**Creating File**\n");
        assert!(matches!(
            outputs.last(),
            Some(DetectorOutput::DirectiveAbandoned { tag, .. }) if tag == "create-file"
        ));
    }

    #[test]
    fn test_pending_open_tag_released_at_end() {
        assert_eq!(visible(&run(&["trailing <web"])), "trailing <web");
    }

    #[test]
    fn test_angle_bracket_inside_quoted_attribute() {
        let outputs = run(&["<web-search query=\"a > b\"></web-search>"]);
        assert!(outputs.iter().any(|output| matches!(
            output,
            DetectorOutput::DirectiveFinished { raw, .. } if raw.contains("a > b")
        )));
        assert!(!visible(&outputs).contains("a > b"));
    }

    #[test]
    fn test_angle_bracket_inside_single_quoted_attribute() {
        let outputs = run(&["<web-search query='a > b' /> Here is the rest of my answer."]);
        assert_eq!(
            visible(&outputs),
            "\n\n**Searching Web**\n\n Here is the rest of my answer."
        );
        assert!(outputs.iter().any(|output| matches!(
            output,
            DetectorOutput::DirectiveFinished { raw, .. } if raw == "<web-search query='a > b' />"
        )));
        assert!(
            !outputs
                .iter()
                .any(|output| matches!(output, DetectorOutput::DirectiveAbandoned { .. }))
        );
    }

    #[test]
    fn test_mixed_quotes_inside_attribute() {
        let text = visible(&run(&["<web-search query=\"it's > 3\"></web-search> ok"]));
        assert_eq!(text, "\n\n**Searching Web**\n\n ok");
    }

    #[test]
    fn test_prose_mentioning_tag_is_released_promptly() {
        let mut detector = detector();
        let outputs = detector.feed("use the <web-search tool to");
        assert_eq!(outputs, vec![DetectorOutput::Visible("use the <web-search tool to".to_owned())]);
        assert_eq!(detector.state(), &DetectorState::Scanning);
    }

    #[test]
    fn test_punctuation_after_tag_name_is_released() {
        let text = visible(&run(&["try <list-files, then <create-file: done"]));
        assert_eq!(text, "try <list-files, then <create-file: done");
    }

    #[test]
    fn test_attributes_spanning_lines_stay_buffered() {
        let outputs = run(&["<web-search\n  query=\"q\"\n  num_results=3\n/>"]);
        assert_eq!(visible(&outputs), "\n\n**Searching Web**\n\n");
    }

    #[test]
    fn test_second_angle_restarts_buffer() {
        let text = visible(&run(&["<<web-search query=\"q\"></web-search>"]));
        assert_eq!(text, "<\n\n**Searching Web**\n\n");
    }

    #[test]
    fn test_step_transitions() {
        let vocabulary = DirectiveVocabulary::default();
        let transition = DetectorState::Scanning.step('<', &vocabulary);
        assert_eq!(
            transition.next,
            DetectorState::BufferingOpenTag {
                buffer: "<".to_owned()
            }
        );
        assert!(transition.outputs.is_empty());

        let released = transition.next.step('p', &vocabulary);
        assert_eq!(released.next, DetectorState::Scanning);
        assert_eq!(released.outputs, vec![DetectorOutput::Visible("<p".to_owned())]);
    }

    #[test]
    fn test_every_fragmentation_masks_directive() {
        let response = "Plan: <create-file path=\"todo.md\">[ ] 1. Task</create-file> end";
        for split in 0..=response.len() {
            let (head, tail) = response.split_at(split);
            let text = visible(&run(&[head, tail]));
            assert_eq!(text, "Plan: \n\n**Creating File**\n\n end", "split at {split}");
        }
    }
}
