//! Access rule storage and rule-to-path compilation.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use pathguard_core::{AccessRule, Catalog, EntityInstance, SchemaError, Value};
use pathguard_cypher::{HopOptions, PathBuilder};

use crate::error::{AuthzError, Result};

/// Where access rules come from.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rules(&self) -> Result<Vec<AccessRule>>;

    async fn rule(&self, id: u64) -> Result<Option<AccessRule>> {
        Ok(self.rules().await?.into_iter().find(|r| r.id == id))
    }

    /// Active rules from `source_kind` to `target_kind` granting `codename`,
    /// ordered by id.
    async fn candidates(
        &self,
        source_kind: &str,
        target_kind: &str,
        codename: &str,
    ) -> Result<Vec<AccessRule>> {
        let mut rules: Vec<AccessRule> = self
            .rules()
            .await?
            .into_iter()
            .filter(|r| {
                r.is_active
                    && r.source_kind.eq_ignore_ascii_case(source_kind)
                    && r.target_kind.eq_ignore_ascii_case(target_kind)
                    && r.grants(codename)
            })
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }
}

/// Rules held in memory, loaded from JSON.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<AccessRule>>,
}

impl InMemoryRuleStore {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Insert a rule, replacing any rule with the same id.
    pub fn upsert(&self, rule: AccessRule) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    pub fn remove(&self, id: u64) -> Option<AccessRule> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let pos = rules.iter().position(|r| r.id == id)?;
        Some(rules.remove(pos))
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn rules(&self) -> Result<Vec<AccessRule>> {
        Ok(self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Compile a rule into a path builder seeded at `start`.
///
/// `requires_staff` adds `is_staff: true` to the first step's source filters
/// and the rule's direction override applies to every hop.
pub fn build_rule<'c>(
    catalog: &'c Catalog,
    rule: &AccessRule,
    start: EntityInstance,
) -> Result<PathBuilder<'c>> {
    if rule.steps.is_empty() {
        return Err(SchemaError::MalformedStep {
            index: 0,
            reason: format!("rule {} has no steps", rule.id),
        }
        .into());
    }

    let mut builder = PathBuilder::new(catalog, start)?;
    builder.set_direction(rule.direction);
    for (index, step) in rule.steps.iter().enumerate() {
        if step.relation.trim().is_empty() {
            return Err(SchemaError::MalformedStep {
                index,
                reason: "empty relation label".to_string(),
            }
            .into());
        }
        let mut options = HopOptions {
            source_filters: step.source_filters.clone(),
            target_filters: step.target_filters.clone(),
            ..HopOptions::default()
        };
        if index == 0 && rule.requires_staff {
            options
                .source_filters
                .insert("is_staff".to_string(), Value::Bool(true));
        }
        builder.add_with(&step.relation, options)?;
    }
    Ok(builder)
}

/// Check that a rule compiles against the catalog and ends at its target kind.
pub fn validate_rule(rule: &AccessRule, catalog: &Catalog) -> Result<()> {
    let source = catalog.kind(&rule.source_kind)?;
    let target = catalog.kind(&rule.target_kind)?;
    let builder = build_rule(catalog, rule, EntityInstance::placeholder(&source.id))?;

    let last = rule.steps.len() - 1;
    match builder.final_kind() {
        Some(kind) if kind.id == target.id => Ok(()),
        Some(kind) => Err(AuthzError::from(SchemaError::MalformedStep {
            index: last,
            reason: format!("path ends at {}, rule targets {}", kind.id, target.id),
        })),
        None => Err(AuthzError::from(SchemaError::MalformedStep {
            index: last,
            reason: format!("path ends at an untyped node, rule targets {}", target.id),
        })),
    }
}
