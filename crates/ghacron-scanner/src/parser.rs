//! Line-oriented extraction of `# ghacron:` annotations.

use once_cell::sync::Lazy;
use regex::Regex;

// Format: # ghacron: "0 8 * * *" or # ghacron: '0 8 * * *'
static ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*#\s*ghacron:\s*["'](.+?)["']\s*$"#).unwrap());

/// Extract cron annotations from workflow file content, in order of
/// occurrence. Lines with trailing content after the closing quote do
/// not match; empty expressions are dropped.
pub fn parse_annotations(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let captures = ANNOTATION_RE.captures(line)?;
            let expr = captures[1].trim();
            if expr.is_empty() {
                None
            } else {
                Some(expr.to_string())
            }
        })
        .collect()
}

/// Whether `workflow_dispatch` appears inside the `on:` section.
///
/// Tracks the section line by line: entered on a line whose trimmed
/// content is or begins with `on:`, left on the next top-level key (a
/// column-0 character that is not whitespace or `#`).
pub fn has_workflow_dispatch(content: &str) -> bool {
    let mut in_on = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed == "on:" || trimmed.starts_with("on:") {
            in_on = true;
            // workflow_dispatch on the same line as on:
            if trimmed.contains("workflow_dispatch") {
                return true;
            }
            continue;
        }

        if in_on {
            if let Some(first) = line.chars().next() {
                if first != ' ' && first != '\t' && first != '#' {
                    in_on = false;
                    continue;
                }
            }
            if trimmed.contains("workflow_dispatch") {
                return true;
            }
        }
    }

    false
}
