//! pathguard-authz: object permissions decided by relationship paths.
//!
//! An [`AccessRule`](pathguard_core::AccessRule) grants permission codes
//! from a source kind to a target kind along a chain of relationship labels.
//! [`PermissionEvaluator`] combines relational permission codes with those
//! rules: a subject holds a permission on an object when it holds the code
//! and some active rule's path joins the subject's mirror node to the
//! object's.

pub mod error;
pub mod evaluator;
pub mod perms;
pub mod preview;
pub mod rules;

pub use error::AuthzError;
pub use evaluator::{load_evaluator_config, EvaluatorConfig, PermissionChecker, PermissionEvaluator};
pub use perms::{check_permissions_app_label, PermissionSource, StaticPermissions};
pub use preview::{preview_rule, RulePreview};
pub use rules::{build_rule, validate_rule, InMemoryRuleStore, RuleStore};
