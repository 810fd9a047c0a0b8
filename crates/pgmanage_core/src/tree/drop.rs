//! Drop statements built from stored SQL templates.
//!
//! A template's first comment line is a description; every later `--` line is
//! an optional clause the user can switch on:
//!
//! ```text
//! -- Drop table
//! DROP TABLE public.users
//! --CASCADE
//! ```

use regex::Regex;
use std::sync::LazyLock;

use crate::models::TreeNode;

static FIRST_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*--.*(?:\r?\n|$))").expect("valid regex"));

static OPTION_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^--\s*").expect("valid regex"));

static COUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)\s*$").expect("valid regex"));

/// Option that drops dependent objects too.
pub const CASCADE: &str = "CASCADE";

/// A parsed drop template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTemplate {
    /// Template without its first comment line
    pub query: String,
    /// Optional clauses, in template order
    pub options: Vec<String>,
}

impl DropTemplate {
    pub fn parse(src: &str) -> Self {
        let query = FIRST_COMMENT.replace(src, "").into_owned();
        let options = query
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("--"))
            .map(|l| OPTION_PREFIX.replace(l, "").into_owned())
            .collect();
        Self { query, options }
    }

    /// Uncomment the checked options.
    pub fn build(&self, checked: &[String]) -> String {
        checked
            .iter()
            .fold(self.query.clone(), |query, opt| query.replacen(&format!("--{opt}"), opt, 1))
    }
}

/// Confirmation text for dropping a node.
pub fn drop_message(node: &TreeNode) -> String {
    format!("Are you sure you want to drop {} '{}'?", node.data.node_type, node.title)
}

/// Whether the checked options drop dependent objects.
pub fn is_cascade(checked: &[String]) -> bool {
    checked.iter().any(|o| o.to_uppercase().contains(CASCADE))
}

/// Decrement a trailing `(N)` count, e.g. `Tables (3)` becomes `Tables (2)`.
/// Titles without a count are returned unchanged.
pub fn decrement_count_suffix(title: &str) -> String {
    COUNT_SUFFIX
        .replace(title, |caps: &regex::Captures<'_>| {
            let n: u64 = caps[1].parse().unwrap_or(0);
            format!("({})", n.saturating_sub(1))
        })
        .into_owned()
}

/// Result of a drop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The user declined
    Cancelled,
    /// The node was removed and its parent's count decremented
    Removed,
    /// A cascading drop refreshed the parent subtree
    ParentRefreshed,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "-- Drop table\nDROP TABLE public.users\n--CASCADE\n";

    #[test]
    fn test_parse_skips_description() {
        let template = DropTemplate::parse(TEMPLATE);
        assert_eq!(template.query, "DROP TABLE public.users\n--CASCADE\n");
        assert_eq!(template.options, vec!["CASCADE".to_string()]);
    }

    #[test]
    fn test_parse_multiple_options() {
        let template = DropTemplate::parse("-- Drop index\nDROP INDEX#CONCURRENTLY# idx\n-- CASCADE\n--  RESTRICT");
        assert_eq!(template.options, vec!["CASCADE".to_string(), "RESTRICT".to_string()]);
    }

    #[test]
    fn test_build_uncomments_checked_only() {
        let template = DropTemplate::parse(TEMPLATE);
        assert_eq!(template.build(&[]), "DROP TABLE public.users\n--CASCADE\n");
        assert_eq!(template.build(&["CASCADE".to_string()]), "DROP TABLE public.users\nCASCADE\n");
    }

    #[test]
    fn test_decrement_count_suffix() {
        assert_eq!(decrement_count_suffix("Tables (3)"), "Tables (2)");
        assert_eq!(decrement_count_suffix("Tables (1)"), "Tables (0)");
        assert_eq!(decrement_count_suffix("Tables (0)"), "Tables (0)");
        assert_eq!(decrement_count_suffix("Schemas"), "Schemas");
        assert_eq!(decrement_count_suffix("f(1) (12)"), "f(1) (11)");
    }

    #[test]
    fn test_drop_message() {
        let node = TreeNode::leaf("users", "table");
        assert_eq!(drop_message(&node), "Are you sure you want to drop table 'users'?");
        assert!(is_cascade(&["CASCADE".to_string()]));
        assert!(!is_cascade(&[]));
    }
}
