//! Render access rules for operator review without touching the graph.

use serde::Serialize;

use pathguard_core::{AccessRule, Catalog, EntityInstance};
use pathguard_cypher::check_syntax;

use crate::error::Result;
use crate::rules::build_rule;

/// Statements a rule would run, or why it cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulePreview {
    pub rule_id: u64,
    pub path: Option<String>,
    #[serde(rename = "match")]
    pub match_statement: Option<String>,
    pub diagnostic: Option<String>,
}

/// Render `rule` from a placeholder (pk 0) of its source kind.
pub fn preview_rule(rule: &AccessRule, catalog: &Catalog) -> RulePreview {
    match render(rule, catalog) {
        Ok((path, match_statement)) => {
            let diagnostic = check_syntax(&path)
                .and_then(|()| check_syntax(&match_statement))
                .err()
                .map(|d| d.to_string());
            RulePreview {
                rule_id: rule.id,
                path: Some(path),
                match_statement: Some(match_statement),
                diagnostic,
            }
        }
        Err(e) => RulePreview {
            rule_id: rule.id,
            path: None,
            match_statement: None,
            diagnostic: Some(e.to_string()),
        },
    }
}

fn render(rule: &AccessRule, catalog: &Catalog) -> Result<(String, String)> {
    let builder = build_rule(catalog, rule, EntityInstance::placeholder(&rule.source_kind))?;
    Ok((builder.get_path()?, builder.get_match()?))
}

#[cfg(test)]
mod tests {
    use pathguard_core::{RuleStep, Schema, Value};

    use super::*;

    const BOOKSTORE: &str = include_str!("../../../fixtures/bookstore.json");

    fn rule(steps: Vec<RuleStep>) -> AccessRule {
        AccessRule {
            id: 4,
            description: String::new(),
            source_kind: "auth.user".to_string(),
            target_kind: "testapp.store".to_string(),
            steps,
            permissions: ["change_store".to_string()].into(),
            is_active: false,
            requires_staff: false,
            direction: None,
        }
    }

    #[test]
    fn previews_with_placeholder_instance() {
        let catalog = Catalog::with_named_relationships(Schema::from_json(BOOKSTORE).unwrap(), true);
        let preview = preview_rule(
            &rule(vec![RuleStep::new("AUTHOR"), RuleStep::new("BOOK"), RuleStep::new("STORE")]),
            &catalog,
        );

        assert_eq!(preview.diagnostic, None);
        let path = preview.path.unwrap();
        assert!(path.starts_with("MATCH path = (source0:User {pk: 0}) "));
        assert!(path.ends_with("(target2:Store) RETURN path;"));
        assert!(preview.match_statement.unwrap().ends_with(" RETURN *;"));
    }

    #[test]
    fn broken_rules_report_a_diagnostic() {
        let catalog = Catalog::with_named_relationships(Schema::from_json(BOOKSTORE).unwrap(), true);
        let preview = preview_rule(&rule(vec![RuleStep::new("AUTHOR"), RuleStep::new("NOPE")]), &catalog);
        assert_eq!(preview.path, None);
        assert!(preview.diagnostic.unwrap().contains("NOPE"));
    }

    #[test]
    fn unknown_source_attribute_reports_a_diagnostic() {
        let catalog = Catalog::with_named_relationships(Schema::from_json(BOOKSTORE).unwrap(), true);
        let mut step = RuleStep::new("AUTHOR");
        step.target_filters
            .insert("name".to_string(), Value::from("{source}.nickname"));
        let preview = preview_rule(&rule(vec![step]), &catalog);
        assert!(preview.diagnostic.unwrap().contains("nickname"));
    }
}
