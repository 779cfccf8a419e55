//! `{source}.<attr>` filter references.
//!
//! A filter value of the exact form `"{source}.<attr>"` is replaced with the
//! start node's `<attr>` when a statement is rendered.

use pathguard_core::{EntityInstance, EntityKind, PropertyMap, Value};

use crate::error::{PathError, Result};

const SOURCE_PREFIX: &str = "{source}.";

/// The attribute named by a `{source}.<attr>` reference, if `value` is one.
pub fn source_reference(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix(SOURCE_PREFIX))
        .filter(|attr| !attr.is_empty())
}

/// Resolve every `{source}.<attr>` value in `filters`.
///
/// `start` is `None` for class-level paths: declared attributes then resolve
/// to `null`. An attribute that is neither present on the instance nor
/// declared on the kind is an error.
pub fn resolve(
    filters: &PropertyMap,
    kind: &EntityKind,
    start: Option<&EntityInstance>,
) -> Result<PropertyMap> {
    filters
        .iter()
        .map(|(key, value)| {
            let resolved = match source_reference(value) {
                Some(attr) => read_attribute(attr, kind, start)?,
                None => value.clone(),
            };
            Ok((key.clone(), resolved))
        })
        .collect()
}

fn read_attribute(attr: &str, kind: &EntityKind, start: Option<&EntityInstance>) -> Result<Value> {
    if let Some(value) = start.and_then(|instance| instance.attribute(attr)) {
        return Ok(value);
    }
    if kind.has_attribute(attr) {
        return Ok(Value::Null);
    }
    Err(PathError::UnknownAttribute {
        node: start.map_or_else(|| kind.id.clone(), ToString::to_string),
        attribute: attr.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pathguard_core::ScalarType;

    use super::*;

    fn user_kind() -> EntityKind {
        EntityKind {
            id: "auth.user".to_string(),
            app_label: "auth".to_string(),
            model_name: "user".to_string(),
            label: "User".to_string(),
            scalar_fields: BTreeMap::from([
                ("username".to_string(), ScalarType::String),
                ("email".to_string(), ScalarType::String),
            ]),
            relationships: Vec::new(),
        }
    }

    fn filters(key: &str, value: &str) -> PropertyMap {
        PropertyMap::from([(key.to_string(), Value::from(value))])
    }

    #[test]
    fn recognises_references() {
        assert_eq!(source_reference(&Value::from("{source}.pk")), Some("pk"));
        assert_eq!(source_reference(&Value::from("{source}.")), None);
        assert_eq!(source_reference(&Value::from("source.pk")), None);
        assert_eq!(source_reference(&Value::Int(1)), None);
    }

    #[test]
    fn resolves_from_instance() {
        let user = EntityInstance::new("auth.user", 3).with_field("username", "ann");
        let resolved = resolve(&filters("name", "{source}.username"), &user_kind(), Some(&user)).unwrap();
        assert_eq!(resolved["name"], Value::from("ann"));

        let resolved = resolve(&filters("owner", "{source}.pk"), &user_kind(), Some(&user)).unwrap();
        assert_eq!(resolved["owner"], Value::Int(3));
    }

    #[test]
    fn literal_values_pass_through() {
        let resolved = resolve(&filters("name", "ann"), &user_kind(), None).unwrap();
        assert_eq!(resolved["name"], Value::from("ann"));
    }

    #[test]
    fn declared_but_unset_is_null() {
        let user = EntityInstance::new("auth.user", 3);
        let resolved = resolve(&filters("mail", "{source}.email"), &user_kind(), Some(&user)).unwrap();
        assert_eq!(resolved["mail"], Value::Null);

        let resolved = resolve(&filters("mail", "{source}.email"), &user_kind(), None).unwrap();
        assert_eq!(resolved["mail"], Value::Null);
    }

    #[test]
    fn unknown_attribute_names_node_and_key() {
        let user = EntityInstance::new("auth.user", 3);
        let err = resolve(&filters("x", "{source}.shoe_size"), &user_kind(), Some(&user)).unwrap_err();
        assert_eq!(
            err,
            PathError::UnknownAttribute {
                node: "<auth.user pk=3>".to_string(),
                attribute: "shoe_size".to_string(),
            }
        );
    }
}
