//! Object permission evaluation over the mirror graph.
//!
//! A check runs in stages:
//! 1. fast path on the subject's flags (inactive denies, superuser allows)
//! 2. the relational permission-code gate, cached per checker
//! 3. one path query per candidate access rule, run concurrently, where the
//!    first path whose endpoints are the subject and object nodes allows
//!
//! Denial is `Ok(false)`. Errors mean the decision could not be made.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pathguard_core::{AccessRule, Catalog, EntityInstance, PropertyMap, Settings, Subject, Value};
use pathguard_cypher::{check_syntax, PATH_COLUMN};
use pathguard_graph::{
    CypherQuery, GraphError, GraphNode, GraphQueries, QueryExecutor, QueryMode, Row,
};

use crate::error::{AuthzError, Result};
use crate::perms::{check_permissions_app_label, PermissionSource};
use crate::rules::{build_rule, RuleStore};

/// Evaluator tuning, read from the `[evaluator]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Count permission codes assigned to the user's groups.
    #[serde(default = "default_true")]
    pub include_group_permissions: bool,
    /// Upper bound on rule queries in flight for one check.
    #[serde(default = "default_max_concurrent_rules")]
    pub max_concurrent_rules: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            include_group_permissions: true,
            max_concurrent_rules: default_max_concurrent_rules(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_rules() -> usize {
    4
}

/// Read the `[evaluator]` section, falling back to defaults when absent or invalid.
pub fn load_evaluator_config(cfg: &config::Config) -> EvaluatorConfig {
    cfg.get::<EvaluatorConfig>("evaluator").unwrap_or_else(|e| {
        if !matches!(e, config::ConfigError::NotFound(_)) {
            tracing::warn!(error = %e, "Invalid [evaluator] configuration, using defaults");
        }
        EvaluatorConfig::default()
    })
}

/// Shared evaluation state. Cheap to share behind an `Arc`; per-request
/// state lives in [`PermissionChecker`].
pub struct PermissionEvaluator {
    catalog: Arc<Catalog>,
    executor: Arc<dyn QueryExecutor>,
    rules: Arc<dyn RuleStore>,
    permissions: Arc<dyn PermissionSource>,
    settings: Settings,
    config: EvaluatorConfig,
}

impl PermissionEvaluator {
    pub fn new(
        catalog: Arc<Catalog>,
        executor: Arc<dyn QueryExecutor>,
        rules: Arc<dyn RuleStore>,
        permissions: Arc<dyn PermissionSource>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            executor,
            rules,
            permissions,
            settings,
            config: EvaluatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    /// A checker for one subject. Its permission-code cache lives as long as
    /// the checker, so drop it at the end of the logical request.
    pub fn checker(&self, subject: Subject) -> PermissionChecker<'_> {
        PermissionChecker {
            evaluator: self,
            subject,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Permission checks for one subject.
pub struct PermissionChecker<'e> {
    evaluator: &'e PermissionEvaluator,
    subject: Subject,
    /// Assigned codenames keyed by (subject kind, object kind).
    cache: Mutex<HashMap<(String, String), BTreeSet<String>>>,
}

/// One rendered rule statement ready to run.
struct RuleQuery {
    rule_id: u64,
    /// Column of the node the last hop reached.
    reached: String,
    query: CypherQuery,
}

type RuleOutcome = (u64, String, std::result::Result<Vec<Row>, GraphError>);

impl PermissionChecker<'_> {
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Whether the subject holds `perm` (`"app_label.codename"` or
    /// `"codename"`) on `object`.
    pub async fn has_perm(&self, perm: &str, object: &EntityInstance) -> Result<bool> {
        if !self.subject.is_active() {
            return Ok(false);
        }
        if self.subject.is_superuser() {
            return Ok(true);
        }

        let codename = self.codename(perm, &object.kind)?;
        if !self.permission_codes(&object.kind).await?.contains(&codename) {
            tracing::debug!(subject = %self.subject.instance(), %codename, "Permission code not assigned");
            return Ok(false);
        }
        if !self.evaluator.settings.enabled {
            return Ok(true);
        }

        let evaluator = self.evaluator;
        let start = self.subject.instance();
        let candidates = evaluator
            .rules
            .candidates(&start.kind, &object.kind, &codename)
            .await?;
        if candidates.is_empty() {
            tracing::debug!(subject = %start, %object, %codename, "No candidate rules");
            return Ok(false);
        }

        let Some(subject_node) = self.mirror_node(start).await? else {
            tracing::debug!(subject = %start, "Subject has no mirror node");
            return Ok(false);
        };
        let Some(object_node) = self.mirror_node(object).await? else {
            tracing::debug!(%object, "Object has no mirror node");
            return Ok(false);
        };

        let target = PropertyMap::from([("pk".to_string(), Value::Int(object.pk))]);
        let queries = candidates
            .iter()
            .map(|rule| self.compile(rule, target.clone(), true))
            .collect::<Result<Vec<_>>>()?;
        let mut tasks = self.spawn(queries);
        let mut transient: Option<GraphError> = None;
        while let Some(joined) = tasks.join_next().await {
            let (rule_id, _, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => return Err(AuthzError::Task(e.to_string())),
            };
            match result {
                Ok(rows) if confirms(&rows, &subject_node, &object_node) => {
                    tasks.abort_all();
                    tracing::debug!(rule_id, subject = %start, %object, %codename, "Allowed by rule");
                    return Ok(true);
                }
                Ok(rows) => {
                    if !rows.is_empty() {
                        tracing::warn!(rule_id, subject = %start, %object, "Path endpoints do not match subject and object");
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(rule_id, error = %e, "Rule query failed, trying remaining rules");
                    transient = Some(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
            }
        }

        // An unevaluated rule might have allowed.
        match transient {
            Some(e) => Err(e.into()),
            None => Ok(false),
        }
    }

    /// Primary keys of every `target_kind` object the subject reaches through
    /// an active rule granting `perm`.
    pub async fn objects_for(&self, perm: &str, target_kind: &str) -> Result<Vec<i64>> {
        if !self.subject.is_active() {
            return Ok(Vec::new());
        }
        let evaluator = self.evaluator;
        let kind = evaluator.catalog.kind(target_kind)?;
        if !evaluator.settings.enabled {
            return Err(AuthzError::Disabled);
        }
        if self.subject.is_superuser() {
            return Ok(evaluator.executor.object_pks(&kind.label).await?);
        }

        let codename = self.codename(perm, &kind.id)?;
        if !self.permission_codes(&kind.id).await?.contains(&codename) {
            return Ok(Vec::new());
        }

        let start = self.subject.instance();
        let candidates = evaluator
            .rules
            .candidates(&start.kind, &kind.id, &codename)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let Some(subject_node) = self.mirror_node(start).await? else {
            return Ok(Vec::new());
        };

        let queries = candidates
            .iter()
            .map(|rule| self.compile(rule, PropertyMap::new(), false))
            .collect::<Result<Vec<_>>>()?;
        let mut tasks = self.spawn(queries);
        let mut pks = BTreeSet::new();
        let mut transient: Option<GraphError> = None;
        while let Some(joined) = tasks.join_next().await {
            let (rule_id, reached, result) = joined.map_err(|e| AuthzError::Task(e.to_string()))?;
            match result {
                Ok(rows) => {
                    for row in &rows {
                        let from_subject = row.node("source0").is_some_and(|n| n.id == subject_node.id);
                        match row.node(&reached).and_then(GraphNode::pk) {
                            Some(pk) if from_subject => {
                                pks.insert(pk);
                            }
                            _ => tracing::warn!(rule_id, "Skipping row that does not start at the subject"),
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(rule_id, error = %e, "Rule query failed, trying remaining rules");
                    transient = Some(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
            }
        }

        match transient {
            Some(e) => Err(e.into()),
            None => Ok(pks.into_iter().collect()),
        }
    }

    /// Codenames assigned to the subject for objects of `kind`.
    pub async fn permission_codes(&self, kind: &str) -> Result<BTreeSet<String>> {
        let key = (self.subject.instance().kind.clone(), kind.to_lowercase());
        if let Some(codes) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(codes.clone());
        }

        let permissions = &self.evaluator.permissions;
        let codes = match &self.subject {
            Subject::User(user) => {
                let mut codes = permissions.user_permissions(user.instance.pk, kind).await?;
                if self.evaluator.config.include_group_permissions {
                    for group in &user.groups {
                        codes.extend(permissions.group_permissions(*group, kind).await?);
                    }
                }
                codes
            }
            Subject::Group(group) => permissions.group_permissions(group.instance.pk, kind).await?,
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, codes.clone());
        Ok(codes)
    }

    fn codename(&self, perm: &str, kind: &str) -> Result<String> {
        let mut codenames = check_permissions_app_label(&[perm], kind)?;
        Ok(codenames.pop().unwrap_or_default())
    }

    async fn mirror_node(&self, instance: &EntityInstance) -> Result<Option<GraphNode>> {
        let kind = self.evaluator.catalog.kind(&instance.kind)?;
        Ok(self
            .evaluator
            .executor
            .get_node_for_object(&kind.label, instance)
            .await?)
    }

    /// Render a rule from the subject. `full_path` selects `get_path()` over
    /// `get_match()`.
    fn compile(&self, rule: &AccessRule, target: PropertyMap, full_path: bool) -> Result<RuleQuery> {
        let mut builder = build_rule(&self.evaluator.catalog, rule, self.subject.instance().clone())?;
        builder.constrain_target(target)?;

        let (text, columns) = if full_path {
            (builder.get_path()?, vec![PATH_COLUMN.to_string()])
        } else {
            (builder.get_match()?, builder.match_columns())
        };
        check_syntax(&text).map_err(|d| GraphError::syntax(&d, &text))?;

        Ok(RuleQuery {
            rule_id: rule.id,
            reached: builder.final_target().unwrap_or_default(),
            query: CypherQuery::new(text).returning(columns),
        })
    }

    fn spawn(&self, queries: Vec<RuleQuery>) -> JoinSet<RuleOutcome> {
        let limiter = Arc::new(Semaphore::new(self.evaluator.config.max_concurrent_rules.max(1)));
        let mut tasks = JoinSet::new();
        for RuleQuery { rule_id, reached, query } in queries {
            let executor = Arc::clone(&self.evaluator.executor);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let result = match limiter.acquire_owned().await {
                    Ok(_permit) => executor.run(&query, QueryMode::Read).await,
                    Err(_) => Err(GraphError::Query("rule limiter closed".to_string())),
                };
                (rule_id, reached, result)
            });
        }
        tasks
    }
}

/// Whether any returned path runs from `subject` to `object`.
fn confirms(rows: &[Row], subject: &GraphNode, object: &GraphNode) -> bool {
    rows.iter().filter_map(|row| row.path(PATH_COLUMN)).any(|path| {
        path.start().is_some_and(|n| n.id == subject.id)
            && path.end().is_some_and(|n| n.id == object.id)
    })
}
