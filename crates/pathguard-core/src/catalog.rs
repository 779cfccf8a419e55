//! Relationship catalog: entity kinds and their typed relationships.
//!
//! The catalog is constructed once from a [`Schema`] and injected into the
//! path builder, mirror, and evaluator. Entity kinds are resolved lazily on
//! first lookup and cached for the lifetime of the catalog. Relationship
//! targets are stored by kind name and resolved through the catalog at
//! traversal time, so mutually related kinds never recurse during
//! construction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Settings;
use crate::error::SchemaError;
use crate::schema::{FieldKind, ModelSchema, Schema};
use crate::types::{Cardinality, Direction, PropertyMap, ScalarType, Value};

/// Relationship type used for every relation when named relationships are off.
pub const GENERIC_RELATION_TYPE: &str = "RELATES_TO";

/// A typed, directed, labeled edge definition between two entity kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipField {
    /// Field (or related) name on the source kind.
    pub name: String,
    /// Relationship-type label, e.g. `AUTHORS`.
    pub rel_type: String,
    pub source: String,
    /// Target kind name; `None` for generic relations.
    pub target: Option<String>,
    pub direction: Direction,
    pub cardinality: Cardinality,
    pub model: RelationshipModel,
}

/// Property model of a relationship: declared properties and their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipModel {
    pub properties: Vec<RelationshipProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipProperty {
    pub name: String,
    pub scalar: ScalarType,
    pub default: Option<Value>,
}

impl RelationshipModel {
    /// Instantiate the model with `overrides` and return storage-ready values.
    ///
    /// Defaults are applied first; overrides must name declared properties
    /// and match their declared type.
    pub fn deflate(&self, rel_type: &str, overrides: &PropertyMap) -> Result<PropertyMap, SchemaError> {
        let mut deflated = PropertyMap::new();
        for prop in &self.properties {
            if let Some(default) = &prop.default {
                deflated.insert(prop.name.clone(), default.clone());
            }
        }

        for (key, value) in overrides {
            let prop = self
                .properties
                .iter()
                .find(|p| &p.name == key)
                .ok_or_else(|| SchemaError::UnknownRelationProperty {
                    rel_type: rel_type.to_string(),
                    property: key.clone(),
                })?;
            if !prop.scalar.accepts(value) {
                return Err(SchemaError::PropertyType {
                    property: key.clone(),
                    expected: prop.scalar.to_string(),
                    found: value.type_name().to_string(),
                });
            }
            deflated.insert(key.clone(), value.clone());
        }

        Ok(deflated)
    }
}

impl RelationshipField {
    /// Deflated default properties, as written on mirrored edges.
    pub fn default_properties(&self) -> PropertyMap {
        self.model
            .deflate(&self.rel_type, &PropertyMap::new())
            .unwrap_or_default()
    }
}

/// A named type in the source schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKind {
    /// `"<app_label>.<model_name>"`.
    pub id: String,
    pub app_label: String,
    pub model_name: String,
    /// Graph node label.
    pub label: String,
    pub scalar_fields: BTreeMap<String, ScalarType>,
    pub relationships: Vec<RelationshipField>,
}

impl EntityKind {
    /// Resolve a relationship by its type label.
    ///
    /// When the label is not unique (generic relationship labels), the
    /// upper-cased field name is used to disambiguate.
    pub fn relationship(&self, label: &str) -> Result<&RelationshipField, SchemaError> {
        let by_type: Vec<&RelationshipField> = self
            .relationships
            .iter()
            .filter(|r| r.rel_type == label)
            .collect();
        if let [single] = by_type.as_slice() {
            return Ok(*single);
        }

        if let Some(field) = self
            .relationships
            .iter()
            .find(|r| r.name.to_uppercase() == label)
        {
            return Ok(field);
        }

        if by_type.len() > 1 {
            return Err(SchemaError::AmbiguousRelationship {
                kind: self.id.clone(),
                label: label.to_string(),
                candidates: by_type.iter().map(|r| r.name.clone()).collect(),
            });
        }

        Err(SchemaError::NoSuchRelationship {
            kind: self.id.clone(),
            label: label.to_string(),
        })
    }

    /// Whether `name` is a readable attribute of instances of this kind.
    pub fn has_attribute(&self, name: &str) -> bool {
        name == "pk" || self.scalar_fields.contains_key(name)
    }

    /// Default permission codenames for this kind.
    pub fn default_permissions(&self) -> Vec<String> {
        ["add", "change", "delete", "view"]
            .iter()
            .map(|action| format!("{action}_{}", self.model_name))
            .collect()
    }
}

/// Process-wide registry of entity kinds, built lazily from a schema.
#[derive(Debug)]
pub struct Catalog {
    models: HashMap<String, ModelSchema>,
    named_relationships: bool,
    cache: RwLock<HashMap<String, Arc<EntityKind>>>,
}

impl Catalog {
    pub fn new(schema: Schema, settings: &Settings) -> Self {
        Self::with_named_relationships(schema, settings.named_relationships)
    }

    pub fn with_named_relationships(schema: Schema, named_relationships: bool) -> Self {
        let models = schema
            .models
            .into_iter()
            .map(|m| (m.kind_id(), m))
            .collect();
        Self {
            models,
            named_relationships,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Sorted identifiers of every kind in the schema.
    pub fn kind_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve an entity kind, building and caching it on first use.
    pub fn kind(&self, id: &str) -> Result<Arc<EntityKind>, SchemaError> {
        let id = id.to_lowercase();
        if let Some(kind) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(kind.clone());
        }

        // Single-flight: re-check under the write lock so concurrent first
        // lookups build the kind once.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(kind) = cache.get(&id) {
            return Ok(kind.clone());
        }
        let model = self
            .models
            .get(&id)
            .ok_or_else(|| SchemaError::UnknownKind { kind: id.clone() })?;
        let kind = Arc::new(self.build_kind(model)?);
        tracing::debug!(kind = %id, relationships = kind.relationships.len(), "Catalog kind built");
        cache.insert(id, kind.clone());
        Ok(kind)
    }

    /// `lookup(kind, label)`: resolve one relationship of a kind.
    pub fn lookup(&self, kind: &str, label: &str) -> Result<RelationshipField, SchemaError> {
        self.kind(kind)?.relationship(label).cloned()
    }

    /// Build every kind up front. Fails on the first schema error.
    pub fn warm_up(&self) -> Result<usize, SchemaError> {
        let ids = self.kind_ids();
        for id in &ids {
            self.kind(id)?;
        }
        Ok(ids.len())
    }

    fn build_kind(&self, model: &ModelSchema) -> Result<EntityKind, SchemaError> {
        let id = model.kind_id();
        let mut scalar_fields = BTreeMap::new();
        let mut relationships: Vec<RelationshipField> = Vec::new();

        for field in &model.fields {
            let (target, direction, cardinality, remote_field) = match &field.kind {
                FieldKind::Scalar { scalar } => {
                    scalar_fields.insert(field.name.clone(), *scalar);
                    continue;
                }
                FieldKind::ForeignKey { to } | FieldKind::OneToOne { to } => (
                    Some(to.to_lowercase()),
                    Direction::Outgoing,
                    Cardinality::ZeroOrOne,
                    format!("{id}.{}", field.name),
                ),
                FieldKind::ManyToMany { to, symmetrical } => (
                    Some(to.to_lowercase()),
                    if *symmetrical {
                        Direction::Either
                    } else {
                        Direction::Outgoing
                    },
                    Cardinality::ZeroOrMore,
                    format!("{id}.{}", field.name),
                ),
                FieldKind::Reverse { from, field: remote, many } => (
                    Some(from.to_lowercase()),
                    Direction::Outgoing,
                    if *many {
                        Cardinality::ZeroOrMore
                    } else {
                        Cardinality::ZeroOrOne
                    },
                    format!("{}.{remote}", from.to_lowercase()),
                ),
                FieldKind::GenericForeignKey => (
                    None,
                    Direction::Outgoing,
                    Cardinality::ZeroOrOne,
                    format!("{id}.{}", field.name),
                ),
            };

            let rel_type = if self.named_relationships {
                field.name.to_uppercase()
            } else {
                GENERIC_RELATION_TYPE.to_string()
            };
            if self.named_relationships && relationships.iter().any(|r| r.rel_type == rel_type) {
                return Err(SchemaError::DuplicateRelationship {
                    kind: id.clone(),
                    label: rel_type,
                });
            }

            let mut properties = vec![RelationshipProperty {
                name: "remote_field".to_string(),
                scalar: ScalarType::String,
                default: Some(Value::String(remote_field)),
            }];
            if let Some(target) = &target {
                properties.push(RelationshipProperty {
                    name: "target_field".to_string(),
                    scalar: ScalarType::String,
                    default: Some(Value::String(format!("{target}.pk"))),
                });
            }

            relationships.push(RelationshipField {
                name: field.name.clone(),
                rel_type,
                source: id.clone(),
                target,
                direction,
                cardinality,
                model: RelationshipModel { properties },
            });
        }

        Ok(EntityKind {
            id,
            app_label: model.app_label.to_lowercase(),
            model_name: model.model_name.to_lowercase(),
            label: model.object_name.clone(),
            scalar_fields,
            relationships,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOKSTORE: &str = include_str!("../../../fixtures/bookstore.json");

    fn catalog(named: bool) -> Catalog {
        Catalog::with_named_relationships(Schema::from_json(BOOKSTORE).unwrap(), named)
    }

    #[test]
    fn lookup_named_relationship() {
        let catalog = catalog(true);
        let rel = catalog.lookup("auth.user", "AUTHOR").unwrap();
        assert_eq!(rel.target.as_deref(), Some("testapp.author"));
        assert_eq!(rel.cardinality, Cardinality::ZeroOrOne);

        let rel = catalog.lookup("testapp.book", "AUTHORS").unwrap();
        assert_eq!(rel.target.as_deref(), Some("testapp.author"));
        assert_eq!(rel.cardinality, Cardinality::ZeroOrMore);
    }

    #[test]
    fn lookup_missing_relationship_names_kind_and_label() {
        let err = catalog(true).lookup("testapp.book", "NOPE").unwrap_err();
        assert_eq!(
            err,
            SchemaError::NoSuchRelationship {
                kind: "testapp.book".to_string(),
                label: "NOPE".to_string()
            }
        );
        assert_eq!(err.to_string(), "testapp.book has no relation type NOPE");
    }

    #[test]
    fn unknown_kind() {
        assert!(matches!(
            catalog(true).kind("nope.nothing"),
            Err(SchemaError::UnknownKind { .. })
        ));
    }

    #[test]
    fn kinds_are_cached() {
        let catalog = catalog(true);
        let a = catalog.kind("testapp.store").unwrap();
        let b = catalog.kind("TESTAPP.Store").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.warm_up().unwrap(), catalog.kind_ids().len());
    }

    #[test]
    fn concurrent_first_lookups_share_one_kind() {
        let catalog = Arc::new(catalog(true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                std::thread::spawn(move || catalog.kind("testapp.book").unwrap())
            })
            .collect();
        let kinds: Vec<Arc<EntityKind>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(kinds.iter().all(|k| Arc::ptr_eq(k, &kinds[0])));
    }

    #[test]
    fn generic_labels_resolve_by_field_name() {
        let catalog = catalog(false);
        let rel = catalog.lookup("testapp.book", "PUBLISHER").unwrap();
        assert_eq!(rel.rel_type, GENERIC_RELATION_TYPE);
        assert_eq!(rel.target.as_deref(), Some("testapp.publisher"));

        let err = catalog.lookup("testapp.book", GENERIC_RELATION_TYPE).unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousRelationship { .. }));
    }

    #[test]
    fn deflate_applies_defaults_and_overrides() {
        let rel = catalog(true).lookup("testapp.store", "BOOKS").unwrap();
        let defaults = rel.default_properties();
        assert_eq!(
            defaults.get("remote_field"),
            Some(&Value::from("testapp.store.books"))
        );
        assert_eq!(
            defaults.get("target_field"),
            Some(&Value::from("testapp.book.pk"))
        );

        let mut overrides = PropertyMap::new();
        overrides.insert("remote_field".to_string(), Value::from("custom"));
        let deflated = rel.model.deflate(&rel.rel_type, &overrides).unwrap();
        assert_eq!(deflated.get("remote_field"), Some(&Value::from("custom")));

        overrides.insert("bogus".to_string(), Value::Int(1));
        assert!(matches!(
            rel.model.deflate(&rel.rel_type, &overrides),
            Err(SchemaError::UnknownRelationProperty { .. })
        ));

        let mut mistyped = PropertyMap::new();
        mistyped.insert("target_field".to_string(), Value::Int(3));
        assert!(matches!(
            rel.model.deflate(&rel.rel_type, &mistyped),
            Err(SchemaError::PropertyType { .. })
        ));
    }

    #[test]
    fn generic_foreign_key_has_no_target() {
        let rel = catalog(true).lookup("testapp.tag", "CONTENT_OBJECT").unwrap();
        assert!(rel.target.is_none());
        assert!(!rel.default_properties().contains_key("target_field"));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let schema = Schema::from_json(
            r#"{"models": [{
                "app_label": "a", "model_name": "x", "object_name": "X",
                "fields": [
                    {"name": "peer", "type": "foreign_key", "to": "a.x"},
                    {"name": "Peer", "type": "foreign_key", "to": "a.x"}
                ]
            }]}"#,
        )
        .unwrap();
        let catalog = Catalog::with_named_relationships(schema, true);
        assert!(matches!(
            catalog.kind("a.x"),
            Err(SchemaError::DuplicateRelationship { .. })
        ));
    }

    #[test]
    fn default_permissions() {
        let kind = catalog(true).kind("testapp.store").unwrap();
        assert_eq!(
            kind.default_permissions(),
            vec!["add_store", "change_store", "delete_store", "view_store"]
        );
        assert!(kind.has_attribute("pk"));
        assert!(kind.has_attribute("name"));
        assert!(!kind.has_attribute("books"));
    }
}
