//! Checklist document format and pure operations over it.
//!
//! A task list is plain text: a free-form header followed by lines of the
//! form `[ ] N. Description` (pending) or `[x] N. Description - COMPLETED`.
//! Task numbers are assigned once and never change; completion only moves
//! forward.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Matches a pending task line
static PENDING_TASK: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"(?mR)\[[ \t]\][ \t]*(\d+)\.[ \t]*(.+?)[ \t]*$") {
        Ok(regex) => regex,
        Err(err) => panic!("Pending task regex is invalid: {err}"),
    });

/// Matches a completed task line, with or without the trailing marker
static COMPLETED_TASK: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?mR)\[[xX]\][ \t]*(\d+)\.[ \t]*(.+?)(?:[ \t]*-[ \t]*COMPLETED)?[ \t]*$") {
        Ok(regex) => regex,
        Err(err) => panic!("Completed task regex is invalid: {err}"),
    }
});

/// Suffix appended to a task line when it is marked done.
pub const COMPLETED_MARKER: &str = " - COMPLETED";

/// Coarse kind of work a task describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Research current market conditions
    MarketResearch,
    /// Analyze a sector
    SectorAnalysis,
    /// Research investment options
    InvestmentResearch,
    /// Look for opportunities
    OpportunitiesAnalysis,
    /// Research strategies or vehicles
    StrategyResearch,
    /// Produce a report document
    CreateReport,
    /// Produce a summary document
    CreateSummary,
    /// Produce a recommendations document
    CreateRecommendations,
    /// Category added by a caller-supplied rule
    Custom(String),
    /// Anything else
    #[default]
    General,
}

impl TaskCategory {
    /// Stable name of the category.
    pub fn as_str(&self) -> &str {
        match self {
            Self::MarketResearch => "market_research",
            Self::SectorAnalysis => "sector_analysis",
            Self::InvestmentResearch => "investment_research",
            Self::OpportunitiesAnalysis => "opportunities_analysis",
            Self::StrategyResearch => "strategy_research",
            Self::CreateReport => "create_report",
            Self::CreateSummary => "create_summary",
            Self::CreateRecommendations => "create_recommendations",
            Self::Custom(name) => name,
            Self::General => "general",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rule mapping a description to a category.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    /// Every keyword must appear
    all_of: Vec<String>,
    /// At least one keyword must appear, when non-empty
    any_of: Vec<String>,
    /// Category assigned on match
    category: TaskCategory,
}

impl CategoryRule {
    /// Rule requiring every keyword.
    pub fn all(keywords: &[&str], category: TaskCategory) -> Self {
        Self {
            all_of: keywords.iter().map(|word| word.to_lowercase()).collect(),
            any_of: Vec::new(),
            category,
        }
    }

    /// Rule requiring any keyword.
    pub fn any(keywords: &[&str], category: TaskCategory) -> Self {
        Self {
            all_of: Vec::new(),
            any_of: keywords.iter().map(|word| word.to_lowercase()).collect(),
            category,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.all_of.iter().all(|word| lowered.contains(word.as_str()))
            && (self.any_of.is_empty()
                || self.any_of.iter().any(|word| lowered.contains(word.as_str())))
    }
}

/// Ordered keyword classifier; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    rules: Vec<CategoryRule>,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        use TaskCategory::{
            CreateRecommendations, CreateReport, CreateSummary, InvestmentResearch, MarketResearch,
            OpportunitiesAnalysis, SectorAnalysis, StrategyResearch,
        };
        Self {
            rules: vec![
                CategoryRule::all(&["research", "market conditions"], MarketResearch),
                CategoryRule::all(&["analyze", "sector"], SectorAnalysis),
                CategoryRule::all(&["research", "investment"], InvestmentResearch),
                CategoryRule::all(&["create", "report"], CreateReport),
                CategoryRule::all(&["generate", "summary"], CreateSummary),
                CategoryRule::all(&["provide", "recommendations"], CreateRecommendations),
                CategoryRule::any(&["opportunities"], OpportunitiesAnalysis),
                CategoryRule::any(&["strategies", "vehicles"], StrategyResearch),
            ],
        }
    }
}

impl TaskClassifier {
    /// Add a rule that takes precedence over the existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: CategoryRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Classify a task description.
    pub fn classify(&self, description: &str) -> TaskCategory {
        let lowered = description.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map_or(TaskCategory::General, |rule| rule.category.clone())
    }
}

/// One checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable ordinal number
    pub number: u32,
    /// Description as written in the document
    pub description: String,
    /// Whether the task has been marked done
    pub completed: bool,
    /// Derived category
    pub category: TaskCategory,
}

/// Result of trying to mark a task complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The line was rewritten; holds the new document
    Marked(String),
    /// The task was already complete; document unchanged
    AlreadyComplete,
    /// No line with this number and description exists
    Missing,
}

/// Parsed view of a checklist document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskList {
    /// Text preceding the first task line
    pub header: String,
    /// Tasks in document order
    pub tasks: Vec<Task>,
}

impl TaskList {
    /// Parse with the default classifier.
    pub fn parse(text: &str) -> Self {
        Self::parse_with(text, &TaskClassifier::default())
    }

    /// Parse, classifying each task with `classifier`.
    pub fn parse_with(text: &str, classifier: &TaskClassifier) -> Self {
        let mut tasks = Vec::new();
        let mut first_task_at = None;
        for (regex, completed) in [(&*PENDING_TASK, false), (&*COMPLETED_TASK, true)] {
            for captures in regex.captures_iter(text) {
                let (Some(whole), Some(number), Some(description)) =
                    (captures.get(0), captures.get(1), captures.get(2))
                else {
                    continue;
                };
                let Ok(number) = number.as_str().parse::<u32>() else {
                    continue;
                };
                first_task_at = Some(first_task_at.map_or(whole.start(), |at: usize| at.min(whole.start())));
                let description = description.as_str().to_owned();
                tasks.push((
                    whole.start(),
                    Task {
                        number,
                        category: classifier.classify(&description),
                        description,
                        completed,
                    },
                ));
            }
        }
        tasks.sort_by_key(|(offset, _)| *offset);

        let header = first_task_at.map_or(text, |first| {
            let line_start = text[..first].rfind('\n').map_or(0, |newline| newline + 1);
            &text[..line_start]
        });
        let header = header.trim().to_owned();

        Self {
            header,
            tasks: tasks.into_iter().map(|(_, task)| task).collect(),
        }
    }

    /// Tasks still pending, in document order.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| !task.completed)
    }

    /// Find a task by number.
    pub fn task(&self, number: u32) -> Option<&Task> {
        self.tasks.iter().find(|task| task.number == number)
    }

    /// Count pending lines directly in a document.
    pub fn remaining_in(text: &str) -> usize {
        PENDING_TASK.find_iter(text).count()
    }

    /// Render a fresh document, numbering tasks from one.
    pub fn render(title: &str, objective: &str, descriptions: &[String]) -> String {
        let mut document = format!("# {title}\n\n## Objective\n{objective}\n\n## Tasks\n");
        for (offset, description) in descriptions.iter().enumerate() {
            document.push_str(&format!("[ ] {}. {}\n", offset + 1, description.trim()));
        }
        document
    }
}

/// Rewrite the line for `number`/`description` from pending to complete.
///
/// Matching is exact on the number and the original description. Marking an
/// already completed task leaves the document untouched.
///
/// # Errors
/// Returns an error only if the rewrite pattern cannot be built.
pub fn mark_complete(text: &str, number: u32, description: &str) -> Result<MarkOutcome> {
    let escaped = regex::escape(description.trim());
    let pending = Regex::new(&format!(r"(?mR)\[[ \t]\][ \t]*{number}\.[ \t]*{escaped}[ \t]*$"))
        .map_err(|err| Error::Other(format!("Invalid task pattern: {err}")))?;

    if let Some(found) = pending.find(text) {
        let mut rewritten = String::with_capacity(text.len() + COMPLETED_MARKER.len());
        rewritten.push_str(&text[..found.start()]);
        rewritten.push_str(&format!("[x] {number}. {}{COMPLETED_MARKER}", description.trim()));
        rewritten.push_str(&text[found.end()..]);
        return Ok(MarkOutcome::Marked(rewritten));
    }

    let done = TaskList::parse(text)
        .tasks
        .into_iter()
        .any(|task| task.completed && task.number == number && task.description == description.trim());
    Ok(if done {
        MarkOutcome::AlreadyComplete
    } else {
        MarkOutcome::Missing
    })
}
