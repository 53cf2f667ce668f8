//! Fixed tool routines run for each task category.

use nexus_core::{Task, TaskCategory, TaskList};

/// One step of a task routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineStep {
    /// Run a web search.
    Search {
        /// Query text
        query: String,
    },
    /// Compile the gathered findings into a workspace document.
    Document {
        /// File to create
        file_name: &'static str,
        /// Document heading
        title: &'static str,
    },
}

impl RoutineStep {
    fn search(query: impl Into<String>) -> Self {
        Self::Search {
            query: query.into(),
        }
    }
}

/// Steps that accomplish `task`.
pub fn routine_for(task: &Task) -> Vec<RoutineStep> {
    let description = task.description.as_str();
    match &task.category {
        TaskCategory::MarketResearch => vec![
            RoutineStep::search("current stock market conditions and trends"),
            RoutineStep::search("economic indicators outlook inflation interest rates"),
        ],
        TaskCategory::SectorAnalysis => vec![
            RoutineStep::search(format!("{description} performance analysis")),
            RoutineStep::search("top performing market sectors outlook"),
        ],
        TaskCategory::InvestmentResearch => vec![
            RoutineStep::search(format!("{description} comparison")),
            RoutineStep::search("investment returns and risk analysis"),
        ],
        TaskCategory::OpportunitiesAnalysis => vec![
            RoutineStep::search(description),
            RoutineStep::search("emerging investment opportunities"),
        ],
        TaskCategory::StrategyResearch => vec![
            RoutineStep::search(description),
            RoutineStep::search("investment vehicles comparison ETFs index funds bonds"),
        ],
        TaskCategory::CreateReport => vec![RoutineStep::Document {
            file_name: "market_analysis_report.md",
            title: "Market Analysis Report",
        }],
        TaskCategory::CreateSummary => vec![RoutineStep::Document {
            file_name: "investment_opportunities_summary.md",
            title: "Summary of Key Findings",
        }],
        TaskCategory::CreateRecommendations => vec![RoutineStep::Document {
            file_name: "comprehensive_recommendations.md",
            title: "Recommendations",
        }],
        TaskCategory::Custom(_) | TaskCategory::General => {
            vec![RoutineStep::search(format!("{description} research analysis"))]
        }
    }
}

/// Objective text from a task list header, if it has one.
pub fn objective_of(list: &TaskList) -> String {
    let mut lines = list.header.lines().skip_while(|line| !line.trim_start().starts_with("## Objective"));
    if lines.next().is_some() {
        let objective = lines
            .take_while(|line| !line.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n");
        let objective = objective.trim();
        if !objective.is_empty() {
            return objective.to_owned();
        }
    }
    list.header
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or("Not specified")
        .to_owned()
}

/// Findings extracted from one saved search results file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Findings {
    /// Workspace file name
    pub file_name: String,
    /// Result headings in the file
    pub headings: Vec<String>,
}

impl Findings {
    /// Collect the numbered result headings from a search results document.
    pub fn from_document(file_name: impl Into<String>, document: &str) -> Self {
        let headings = document
            .lines()
            .filter_map(|line| line.strip_prefix("## "))
            .filter(|heading| heading.starts_with(|ch: char| ch.is_ascii_digit()))
            .map(str::to_owned)
            .collect();
        Self {
            file_name: file_name.into(),
            headings,
        }
    }
}

/// Markdown document summarizing the task list and gathered findings.
pub fn compile_document(title: &str, list: &TaskList, findings: &[Findings]) -> String {
    let mut document = format!("# {title}\n\n## Objective\n{}\n\n## Research Completed\n", objective_of(list));

    let completed: Vec<_> = list.tasks.iter().filter(|task| task.completed).collect();
    if completed.is_empty() {
        document.push_str("No research tasks completed yet.\n");
    }
    for task in completed {
        document.push_str(&format!("- {}. {}\n", task.number, task.description));
    }

    document.push_str("\n## Sources\n");
    if findings.is_empty() {
        document.push_str("No saved search results.\n");
    }
    for found in findings {
        document.push_str(&format!("\n### {}\n", found.file_name));
        for heading in &found.headings {
            document.push_str(&format!("- {heading}\n"));
        }
    }
    document
}
