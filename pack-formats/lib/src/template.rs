//! Commit message templating.
//!
//! Supports the small mustache subset used by commit templates:
//! `{{name}}` (and `{{{name}}}`) substitution, `{{#name}}...{{/name}}`
//! sections rendered only when `name` is non-empty, and `{{^name}}...{{/name}}`
//! sections rendered only when it is empty. Unknown names render as empty.
//! Values are inserted verbatim; commit messages are not HTML.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Default commit template.
pub const DEFAULT_COMMIT_TEMPLATE: &str =
    "{{type}}{{#scope}}({{scope}}){{/scope}}: update pack formats for {{versions}}";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{([#^])\s*(\w+)\s*\}\}(.*?)\{\{/\s*(\w+)\s*\}\}")
        .expect("Invalid section regex")
});

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{\s*(\w+)\s*\}\}\}|\{\{\s*(\w+)\s*\}\}").expect("Invalid variable regex")
});

/// Values available to a commit template.
#[derive(Debug, Clone, Default)]
pub struct CommitContext {
    /// Conventional commit type, e.g. `chore`.
    pub kind: String,
    /// Optional conventional commit scope.
    pub scope: Option<String>,
    /// Versions added by this run.
    pub versions: Vec<String>,
}

impl CommitContext {
    fn variables(&self) -> HashMap<&'static str, Cow<'_, str>> {
        HashMap::from([
            ("type", Cow::Borrowed(self.kind.as_str())),
            ("scope", Cow::Borrowed(self.scope.as_deref().unwrap_or(""))),
            ("versions", Cow::Owned(self.versions.join(", "))),
        ])
    }
}

/// Renders `template` against `context`.
///
/// ## Examples
///
/// ```
/// use pack_formats_lib::template::{render, CommitContext};
///
/// let context = CommitContext {
///     kind: "chore".into(),
///     scope: Some("data".into()),
///     versions: vec!["1.21.4".into(), "25w02a".into()],
/// };
/// let message = render("{{type}}{{#scope}}({{scope}}){{/scope}}: add {{versions}}", &context);
/// assert_eq!(message, "chore(data): add 1.21.4, 25w02a");
/// ```
pub fn render(template: &str, context: &CommitContext) -> String {
    let variables = context.variables();
    let lookup = |name: &str| variables.get(name).map(|v| &**v).unwrap_or("");

    let sections = SECTION_RE.replace_all(template, |caps: &Captures| {
        let (open, close) = (&caps[2], &caps[4]);
        if open != close {
            return caps[0].to_string();
        }
        let present = !lookup(open).is_empty();
        let inverted = &caps[1] == "^";
        if present != inverted {
            caps[3].to_string()
        } else {
            String::new()
        }
    });

    VARIABLE_RE
        .replace_all(&sections, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).to_string()
        })
        .into_owned()
}
