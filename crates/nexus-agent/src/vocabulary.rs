//! Fixed set of directive tags the agent recognizes in model output.

/// One recognized directive tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    /// Tag as written by the model
    pub tag: &'static str,
    /// Registry name of the tool it invokes
    pub tool: &'static str,
    /// Friendly label shown while the directive is hidden
    pub display_name: &'static str,
}

/// Allow-list of directive tags.
#[derive(Debug, Clone)]
pub struct DirectiveVocabulary {
    entries: Vec<Directive>,
}

impl Default for DirectiveVocabulary {
    fn default() -> Self {
        let entry = |tag, tool, display_name| Directive {
            tag,
            tool,
            display_name,
        };
        Self {
            entries: vec![
                entry("create-file", "create-file", "Creating File"),
                entry("write-file", "create-file", "Creating File"),
                entry("read-file", "read-file", "Reading File"),
                entry("delete-file", "delete-file", "Deleting File"),
                entry("list-files", "list-files", "Listing Files"),
                entry("web-search", "web-search", "Searching Web"),
                entry("web-scrape", "web-scrape", "Gathering Web Data"),
                entry("scrape-webpage", "web-scrape", "Gathering Web Data"),
                entry("execute-command", "execute-command", "Running Command"),
            ],
        }
    }
}

impl DirectiveVocabulary {
    /// Vocabulary with no tags.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a directive.
    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.entries.retain(|entry| entry.tag != directive.tag);
        self.entries.push(directive);
        self
    }

    /// Look up a tag.
    pub fn get(&self, tag: &str) -> Option<&Directive> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// Whether `tag` is a recognized directive.
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Whether some recognized tag starts with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|entry| entry.tag.starts_with(prefix))
    }

    /// Registry tool name for `name`, resolving aliases. Unknown names map to themselves.
    pub fn tool_for<'name>(&'name self, name: &'name str) -> &'name str {
        self.get(name).map_or(name, |entry| entry.tool)
    }

    /// Label shown while a directive runs.
    pub fn display_name(&self, tag: &str) -> String {
        self.get(tag)
            .map_or_else(|| format!("Running {tag}"), |entry| entry.display_name.to_owned())
    }

    /// Visible text that replaces a hidden directive.
    pub fn placeholder(&self, tag: &str) -> String {
        format!("\n\n**{}**\n", self.display_name(tag))
    }

    /// Recognized tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.tag)
    }
}
