//! Relational permission codes assigned to users and groups.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use pathguard_core::types::split_kind;

use crate::error::{AuthzError, Result};

/// Codenames assigned per entity kind.
pub type KindPermissions = BTreeMap<String, BTreeSet<String>>;

/// Source of directly assigned permission codes.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Codenames assigned to user `pk` for objects of `kind`.
    async fn user_permissions(&self, pk: i64, kind: &str) -> Result<BTreeSet<String>>;

    /// Codenames assigned to group `pk` for objects of `kind`.
    async fn group_permissions(&self, pk: i64, kind: &str) -> Result<BTreeSet<String>>;
}

/// Fixed assignments loaded from JSON:
///
/// ```json
/// {"users": {"1": {"testapp.store": ["change_store"]}},
///  "groups": {"2": {"testapp.book": ["view_book"]}}}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticPermissions {
    #[serde(default)]
    users: BTreeMap<i64, KindPermissions>,
    #[serde(default)]
    groups: BTreeMap<i64, KindPermissions>,
}

impl StaticPermissions {
    /// Parse assignments. Kind keys are matched case-insensitively.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(json)?;
        Ok(Self {
            users: normalize(parsed.users),
            groups: normalize(parsed.groups),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn grant_user(mut self, pk: i64, kind: &str, codename: &str) -> Self {
        insert(&mut self.users, pk, kind, codename);
        self
    }

    pub fn grant_group(mut self, pk: i64, kind: &str, codename: &str) -> Self {
        insert(&mut self.groups, pk, kind, codename);
        self
    }
}

fn normalize(map: BTreeMap<i64, KindPermissions>) -> BTreeMap<i64, KindPermissions> {
    map.into_iter()
        .map(|(pk, kinds)| {
            let mut lowered = KindPermissions::new();
            for (kind, codes) in kinds {
                lowered.entry(kind.to_lowercase()).or_default().extend(codes);
            }
            (pk, lowered)
        })
        .collect()
}

fn insert(map: &mut BTreeMap<i64, KindPermissions>, pk: i64, kind: &str, codename: &str) {
    map.entry(pk)
        .or_default()
        .entry(kind.to_lowercase())
        .or_default()
        .insert(codename.to_string());
}

fn lookup(map: &BTreeMap<i64, KindPermissions>, pk: i64, kind: &str) -> BTreeSet<String> {
    map.get(&pk)
        .and_then(|kinds| kinds.get(&kind.to_lowercase()))
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl PermissionSource for StaticPermissions {
    async fn user_permissions(&self, pk: i64, kind: &str) -> Result<BTreeSet<String>> {
        Ok(lookup(&self.users, pk, kind))
    }

    async fn group_permissions(&self, pk: i64, kind: &str) -> Result<BTreeSet<String>> {
        Ok(lookup(&self.groups, pk, kind))
    }
}

/// Strip app labels from permission strings checked against objects of `kind`.
///
/// Accepts `"app_label.codename"` or a bare `"codename"`. Fails when any app
/// label differs from the kind's.
pub fn check_permissions_app_label<S: AsRef<str>>(perms: &[S], kind: &str) -> Result<Vec<String>> {
    let (expected, _) = split_kind(kind);
    perms
        .iter()
        .map(|perm| {
            let perm = perm.as_ref();
            match perm.split_once('.') {
                Some((app_label, codename)) if app_label.eq_ignore_ascii_case(expected) => {
                    Ok(codename.to_string())
                }
                Some(_) => Err(AuthzError::PermissionLabel {
                    permission: perm.to_string(),
                    expected: expected.to_string(),
                }),
                None => Ok(perm.to_string()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_labels_are_checked_and_stripped() {
        assert_eq!(
            check_permissions_app_label(&["testapp.change_store", "view_store"], "testapp.store").unwrap(),
            vec!["change_store", "view_store"]
        );
        assert!(matches!(
            check_permissions_app_label(&["auth.change_store"], "testapp.store"),
            Err(AuthzError::PermissionLabel { expected, .. }) if expected == "testapp"
        ));
    }

    #[tokio::test]
    async fn static_assignments_from_json() {
        let perms = StaticPermissions::from_json(
            r#"{"users": {"1": {"testapp.store": ["change_store"]}},
                "groups": {"2": {"testapp.Store": ["view_store"]}}}"#,
        )
        .unwrap();

        assert_eq!(
            perms.user_permissions(1, "testapp.store").await.unwrap(),
            BTreeSet::from(["change_store".to_string()])
        );
        assert!(perms.user_permissions(2, "testapp.store").await.unwrap().is_empty());
        assert!(perms.user_permissions(1, "testapp.book").await.unwrap().is_empty());
        assert!(perms.group_permissions(2, "testapp.store").await.unwrap().contains("view_store"));
    }

    #[tokio::test]
    async fn grants_are_case_insensitive_on_kind() {
        let perms = StaticPermissions::default().grant_group(2, "testapp.Store", "view_store");
        assert!(perms
            .group_permissions(2, "TESTAPP.STORE")
            .await
            .unwrap()
            .contains("view_store"));
    }
}
