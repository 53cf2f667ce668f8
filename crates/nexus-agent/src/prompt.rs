//! System prompt assembly.

use nexus_tooling::ToolRegistry;

const SYSTEM_MD: &str = include_str!("../prompts/system.md");

/// System prompt listing every registered tool.
pub fn system_prompt(registry: &ToolRegistry, task_file: &str) -> String {
    let tools = registry
        .list_tools()
        .iter()
        .map(|tool| format!("- {}: {}\n  {}", tool.name(), tool.description(), tool.usage()))
        .collect::<Vec<_>>()
        .join("\n");

    extract_prompt_section(SYSTEM_MD)
        .replace("{tools}", &tools)
        .replace("{task_file}", task_file)
}

/// Text after the `## Prompt` header, or the whole file when it has none.
fn extract_prompt_section(content: &str) -> &str {
    content
        .find("## Prompt")
        .and_then(|start| content.get(start..))
        .and_then(|section| section.split_once('\n'))
        .map_or(content, |(_, body)| body)
        .trim()
}

#[cfg(test)]
mod tests {
    use nexus_core::AgentSettings;

    use super::*;

    #[test]
    fn test_extract_prompt_section() {
        let markdown = "# Title\n\n## Usage\n\nignored\n\n## Prompt\n\nActual prompt.\n\nSecond line.\n";
        assert_eq!(extract_prompt_section(markdown), "Actual prompt.\n\nSecond line.");
        assert_eq!(extract_prompt_section("  bare  "), "bare");
    }

    #[test]
    fn test_prompt_lists_tools_and_task_file() {
        let registry = ToolRegistry::with_defaults(&AgentSettings::default());
        let prompt = system_prompt(&registry, "plan.md");
        assert!(!prompt.contains("## Usage"));
        assert!(!prompt.contains("{tools}"));
        assert!(prompt.contains("<create-file path=\"plan.md\">"));
        for name in registry.names() {
            assert!(prompt.contains(&format!("- {name}: ")), "missing {name}");
        }
    }
}
