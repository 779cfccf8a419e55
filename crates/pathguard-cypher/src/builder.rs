//! Incremental construction of relationship path statements.
//!
//! A [`PathBuilder`] starts at a bound instance or an unbound kind and grows
//! one hop per [`PathBuilder::add`]. Each hop label is resolved against the
//! current frontier kind through the [`Catalog`]. Rendering is deferred until
//! [`PathBuilder::statement`] so `{source}.<attr>` filters read the start
//! node as it is at that moment.

use std::sync::Arc;

use pathguard_core::{Catalog, Direction, EntityInstance, EntityKind, PropertyMap, RelationshipField, Value};

use crate::error::{PathError, Result};
use crate::filters;
use crate::pattern::{Fragment, NodePattern, Pattern, RelPattern};

/// Result column of [`PathBuilder::get_path`].
pub const PATH_COLUMN: &str = "path";

const SOURCE_IDENT: &str = "source0";

/// Optional per-hop arguments to [`PathBuilder::add_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HopOptions {
    /// Overrides for the relationship's property model.
    pub relation_props: PropertyMap,
    /// Filters on the node this hop starts from.
    pub source_filters: PropertyMap,
    /// Filters on the node this hop reaches.
    pub target_filters: PropertyMap,
}

impl HopOptions {
    pub fn relation_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.relation_props.insert(key.to_string(), value.into());
        self
    }

    pub fn source_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.source_filters.insert(key.to_string(), value.into());
        self
    }

    pub fn target_filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.target_filters.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Hop {
    relation: RelationshipField,
    /// Deflated relationship properties.
    rel_props: PropertyMap,
    source_filters: PropertyMap,
    target_filters: PropertyMap,
    /// `n` in the `target<n>` identifier of the reached node.
    target_index: usize,
    /// `None` when the relationship has no fixed target kind.
    target_kind: Option<Arc<EntityKind>>,
}

/// Builds one chained `MATCH` pattern over typed relationship hops.
#[derive(Debug, Clone)]
pub struct PathBuilder<'c> {
    catalog: &'c Catalog,
    start_kind: Arc<EntityKind>,
    start: Option<EntityInstance>,
    hops: Vec<Hop>,
    direction: Option<Direction>,
}

impl<'c> PathBuilder<'c> {
    /// Start at a bound instance. The first node clause carries its `pk`.
    pub fn new(catalog: &'c Catalog, start: EntityInstance) -> Result<Self> {
        let start_kind = catalog.kind(&start.kind)?;
        Ok(Self {
            catalog,
            start_kind,
            start: Some(start),
            hops: Vec::new(),
            direction: None,
        })
    }

    /// Start at an entity kind without a concrete row.
    pub fn unbound(catalog: &'c Catalog, kind: &str) -> Result<Self> {
        Ok(Self {
            catalog,
            start_kind: catalog.kind(kind)?,
            start: None,
            hops: Vec::new(),
            direction: None,
        })
    }

    pub fn start(&self) -> Option<&EntityInstance> {
        self.start.as_ref()
    }

    /// Mutable access to the start instance; `{source}` filters see changes.
    pub fn start_mut(&mut self) -> Option<&mut EntityInstance> {
        self.start.as_mut()
    }

    pub fn start_kind(&self) -> &EntityKind {
        &self.start_kind
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Force every hop's arrow direction, or restore natural directions with `None`.
    pub fn set_direction(&mut self, direction: Option<Direction>) -> &mut Self {
        self.direction = direction;
        self
    }

    pub fn add(&mut self, label: &str) -> Result<&mut Self> {
        self.add_with(label, HopOptions::default())
    }

    /// Append a hop resolved against the current frontier kind.
    ///
    /// `label` is either a relationship-type label or a back-reference
    /// `{i:LABEL}`, which resolves `LABEL` on the frontier and lands on the
    /// node hop `i` reached.
    pub fn add_with(&mut self, label: &str, options: HopOptions) -> Result<&mut Self> {
        if label.trim().is_empty() {
            return Err(PathError::EmptyRelationType);
        }
        let frontier = self.frontier_kind(label)?;

        let (relation, target_index) = match frontier.relationship(label) {
            Ok(relation) => (relation.clone(), self.hops.len()),
            Err(err) => match parse_back_reference(label) {
                Some((index, inner)) => self.resolve_back_reference(&frontier, index, inner)?,
                None => return Err(err.into()),
            },
        };

        let target_kind = relation
            .target
            .as_deref()
            .map(|target| self.catalog.kind(target))
            .transpose()?;
        let rel_props = relation
            .model
            .deflate(&relation.rel_type, &options.relation_props)?;

        tracing::trace!(
            from = %frontier.id,
            rel_type = %relation.rel_type,
            to_kind = relation.target.as_deref().unwrap_or("*"),
            target_index,
            "Hop added"
        );

        self.hops.push(Hop {
            relation,
            rel_props,
            source_filters: options.source_filters,
            target_filters: options.target_filters,
            target_index,
            target_kind,
        });
        Ok(self)
    }

    /// Add filters to the node the last hop reached.
    pub fn constrain_target(&mut self, filters: PropertyMap) -> Result<&mut Self> {
        let hop = self.hops.last_mut().ok_or(PathError::EmptyPath)?;
        hop.target_filters.extend(filters);
        Ok(self)
    }

    /// Add filters to the start node.
    pub fn constrain_source(&mut self, filters: PropertyMap) -> Result<&mut Self> {
        let hop = self.hops.first_mut().ok_or(PathError::EmptyPath)?;
        hop.source_filters.extend(filters);
        Ok(self)
    }

    /// Build the typed pattern with every filter resolved.
    pub fn pattern(&self) -> Result<Pattern> {
        let first = self.hops.first().ok_or(PathError::EmptyPath)?;
        let start = self.start.as_ref();
        let resolve = |map: &PropertyMap| filters::resolve(map, &self.start_kind, start);

        let mut source_filters = resolve(&first.source_filters)?;
        if let Some(instance) = start {
            source_filters.insert("pk".to_string(), Value::Int(instance.pk));
        }
        let mut source = NodePattern::new(SOURCE_IDENT, Some(self.start_kind.label.as_str()))
            .with_filters(source_filters);

        let mut fragments = Vec::with_capacity(self.hops.len());
        for (n, hop) in self.hops.iter().enumerate() {
            // Source filters of the next hop describe this hop's target node.
            let mut target_filters = resolve(&hop.target_filters)?;
            if let Some(next) = self.hops.get(n + 1) {
                target_filters.extend(resolve(&next.source_filters)?);
            }
            let target = NodePattern::new(
                target_ident(hop.target_index),
                hop.target_kind.as_deref().map(|kind| kind.label.as_str()),
            )
            .with_filters(target_filters);

            let rel = RelPattern {
                rel_type: hop.relation.rel_type.clone(),
                properties: hop.rel_props.clone(),
                direction: self.direction.unwrap_or(hop.relation.direction),
            };
            fragments.push(Fragment {
                source: std::mem::replace(&mut source, target.clone()),
                rel,
                target,
            });
        }

        Ok(Pattern { fragments })
    }

    /// The chained pattern text, without `MATCH`/`RETURN`.
    pub fn statement(&self) -> Result<String> {
        self.pattern()?.render()
    }

    /// `MATCH path = <statement> RETURN path;`
    pub fn get_path(&self) -> Result<String> {
        Ok(format!(
            "MATCH {PATH_COLUMN} = {} RETURN {PATH_COLUMN};",
            self.statement()?
        ))
    }

    /// `MATCH <statement> RETURN *;`
    pub fn get_match(&self) -> Result<String> {
        Ok(format!("MATCH {} RETURN *;", self.statement()?))
    }

    /// Node identifiers returned by [`get_match`](Self::get_match), in order.
    pub fn match_columns(&self) -> Vec<String> {
        let mut columns = vec![SOURCE_IDENT.to_string()];
        for hop in &self.hops {
            let ident = target_ident(hop.target_index);
            if !columns.contains(&ident) {
                columns.push(ident);
            }
        }
        columns
    }

    /// Identifier of the node the last hop reached.
    pub fn final_target(&self) -> Option<String> {
        self.hops.last().map(|hop| target_ident(hop.target_index))
    }

    /// Kind of the node the last hop reached, `None` when it has no fixed kind.
    pub fn final_kind(&self) -> Option<&EntityKind> {
        self.hops.last().and_then(|hop| hop.target_kind.as_deref())
    }

    fn frontier_kind(&self, label: &str) -> Result<Arc<EntityKind>> {
        match self.hops.last() {
            None => Ok(self.start_kind.clone()),
            Some(hop) => hop
                .target_kind
                .clone()
                .ok_or_else(|| PathError::UntypedFrontier {
                    label: label.to_string(),
                }),
        }
    }

    fn resolve_back_reference(
        &self,
        frontier: &EntityKind,
        index: usize,
        label: &str,
    ) -> Result<(RelationshipField, usize)> {
        let Some(earlier) = self.hops.get(index) else {
            return Err(PathError::BackReferenceOutOfRange {
                index,
                hops: self.hops.len(),
            });
        };
        let relation = frontier.relationship(label)?.clone();
        if relation.target != earlier.relation.target {
            return Err(PathError::BackReferenceKindMismatch {
                label: label.to_string(),
                index,
                expected: earlier.relation.target.clone().unwrap_or_default(),
                found: relation.target.clone().unwrap_or_default(),
            });
        }
        Ok((relation, earlier.target_index))
    }
}

fn target_ident(index: usize) -> String {
    format!("target{index}")
}

/// Split `{i:LABEL}` into `(i, LABEL)`.
fn parse_back_reference(label: &str) -> Option<(usize, &str)> {
    let (index, inner) = label
        .strip_prefix('{')?
        .strip_suffix('}')?
        .split_once(':')?;
    let index = index.trim().parse().ok()?;
    let inner = inner.trim();
    (!inner.is_empty()).then_some((index, inner))
}

#[cfg(test)]
mod tests {
    use pathguard_core::{Schema, SchemaError};

    use super::*;

    const BOOKSTORE: &str = include_str!("../../../fixtures/bookstore.json");

    const AUTHOR: &str = r#"-[:AUTHOR {remote_field: "testapp.author.user", target_field: "testapp.author.pk"}]->"#;
    const BOOK: &str = r#"-[:BOOK {remote_field: "testapp.book.authors", target_field: "testapp.book.pk"}]->"#;
    const STORE: &str = r#"-[:STORE {remote_field: "testapp.store.books", target_field: "testapp.store.pk"}]->"#;

    fn catalog() -> Catalog {
        Catalog::with_named_relationships(Schema::from_json(BOOKSTORE).unwrap(), true)
    }

    fn user(pk: i64) -> EntityInstance {
        EntityInstance::new("auth.user", pk).with_field("username", "user1")
    }

    #[test]
    fn renders_chained_path() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add("AUTHOR")
            .unwrap()
            .add("BOOK")
            .unwrap()
            .add_with("STORE", HopOptions::default().target_filter("pk", 5))
            .unwrap();

        assert_eq!(
            builder.get_path().unwrap(),
            format!(
                "MATCH path = (source0:User {{pk: 1}}) {AUTHOR} (target0:Author) {BOOK} (target1:Book) {STORE} (target2:Store {{pk: 5}}) RETURN path;"
            )
        );
        assert!(builder.get_match().unwrap().starts_with("MATCH (source0:User {pk: 1}) "));
        assert!(builder.get_match().unwrap().ends_with(" RETURN *;"));
        assert_eq!(builder.match_columns(), vec!["source0", "target0", "target1", "target2"]);
        assert_eq!(builder.final_target().as_deref(), Some("target2"));
    }

    #[test]
    fn boundary_nodes_are_written_once() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with("AUTHOR", HopOptions::default().target_filter("age", 40))
            .unwrap()
            .add("BOOK")
            .unwrap();

        let statement = builder.statement().unwrap();
        assert_eq!(statement.matches("(target0:Author {age: 40})").count(), 1);
        assert_eq!(statement.matches("target0").count(), 1);
        assert_eq!(builder.pattern().unwrap().fragments.len(), 2);
    }

    #[test]
    fn later_source_filters_merge_into_previous_target() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with("AUTHOR", HopOptions::default().target_filter("age", 40))
            .unwrap()
            .add_with("BOOK", HopOptions::default().source_filter("name", "Ann"))
            .unwrap();

        let statement = builder.statement().unwrap();
        assert!(statement.contains(r#"(target0:Author {age: 40, name: "Ann"})"#));
        assert_eq!(statement.matches("target0").count(), 1);
    }

    #[test]
    fn back_reference_lands_on_earlier_target() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add("AUTHOR")
            .unwrap()
            .add("BOOK")
            .unwrap()
            .add_with("{0:AUTHORS}", HopOptions::default().target_filter("age", 40))
            .unwrap();

        let pattern = builder.pattern().unwrap();
        assert_eq!(pattern.fragments[2].target.ident, pattern.fragments[0].target.ident);
        assert_eq!(pattern.fragments[2].target.ident, "target0");
        assert_eq!(pattern.fragments[2].source.ident, "target1");
        assert!(builder
            .statement()
            .unwrap()
            .ends_with("(target1:Book) -[:AUTHORS {remote_field: \"testapp.book.authors\", target_field: \"testapp.author.pk\"}]-> (target0:Author {age: 40})"));
        assert_eq!(builder.match_columns(), vec!["source0", "target0", "target1"]);
    }

    #[test]
    fn back_reference_out_of_range() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder.add("AUTHOR").unwrap();
        let err = builder.add("{3:BOOK}").unwrap_err();
        assert_eq!(err, PathError::BackReferenceOutOfRange { index: 3, hops: 1 });
    }

    #[test]
    fn back_reference_must_reach_same_kind() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder.add("AUTHOR").unwrap().add("BOOK").unwrap();
        let err = builder.add("{0:PUBLISHER}").unwrap_err();
        assert!(matches!(err, PathError::BackReferenceKindMismatch { index: 0, .. }));
    }

    #[test]
    fn unknown_label_names_kind_and_label() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder.add("AUTHOR").unwrap();
        let err = builder.add("STORE").unwrap_err();
        assert_eq!(
            err,
            PathError::Schema(SchemaError::NoSuchRelationship {
                kind: "testapp.author".to_string(),
                label: "STORE".to_string(),
            })
        );
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn empty_label_and_empty_path() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        assert_eq!(builder.add("  ").unwrap_err(), PathError::EmptyRelationType);
        assert_eq!(builder.get_path().unwrap_err(), PathError::EmptyPath);
        assert_eq!(builder.get_match().unwrap_err(), PathError::EmptyPath);
    }

    #[test]
    fn rendering_is_deterministic() {
        let catalog = catalog();
        let build = || {
            let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
            builder
                .add_with(
                    "AUTHOR",
                    HopOptions::default()
                        .source_filter("username", "user1")
                        .source_filter("email", "a@b.c")
                        .target_filter("name", "x"),
                )
                .unwrap()
                .add("BOOK")
                .unwrap();
            builder.get_path().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn string_filters_are_escaped() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with("AUTHOR", HopOptions::default().target_filter("name", r#"O'Brien "Jr""#))
            .unwrap();
        let statement = builder.get_path().unwrap();
        assert!(statement.contains(r#"(target0:Author {name: "O\'Brien \"Jr\""})"#));
        assert_eq!(crate::validate::check_syntax(&statement), Ok(()));
    }

    #[test]
    fn source_references_resolve_at_render_time() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with(
                "AUTHOR",
                HopOptions::default().target_filter("name", "{source}.username"),
            )
            .unwrap();
        assert!(builder.statement().unwrap().contains(r#"(target0:Author {name: "user1"})"#));

        if let Some(start) = builder.start_mut() {
            start.fields.insert("username".to_string(), Value::from("renamed"));
        }
        assert!(builder.statement().unwrap().contains(r#"(target0:Author {name: "renamed"})"#));
    }

    #[test]
    fn unknown_source_attribute_fails_at_render() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with("AUTHOR", HopOptions::default().target_filter("name", "{source}.nickname"))
            .unwrap();
        assert!(matches!(
            builder.statement(),
            Err(PathError::UnknownAttribute { ref attribute, .. }) if attribute == "nickname"
        ));
    }

    #[test]
    fn direction_override_applies_to_every_hop() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder.add("AUTHOR").unwrap().add("BOOK").unwrap();
        builder.set_direction(Some(Direction::Incoming));
        let statement = builder.statement().unwrap();
        assert_eq!(statement.matches("<-[:").count(), 2);
        assert!(!statement.contains("]->"));

        builder.set_direction(None);
        assert_eq!(builder.statement().unwrap().matches("]->").count(), 2);
    }

    #[test]
    fn unbound_start_has_no_pk() {
        let catalog = catalog();
        let mut builder = PathBuilder::unbound(&catalog, "auth.user").unwrap();
        builder
            .add_with(
                "AUTHOR",
                HopOptions::default().source_filter("is_staff", true).target_filter("name", "{source}.email"),
            )
            .unwrap();
        let statement = builder.statement().unwrap();
        assert!(statement.starts_with("(source0:User {is_staff: true}) "));
        assert!(statement.ends_with("(target0:Author {name: null})"));
    }

    #[test]
    fn relation_props_override_defaults() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, user(1)).unwrap();
        builder
            .add_with(
                "AUTHOR",
                HopOptions::default().relation_prop("remote_field", "custom"),
            )
            .unwrap();
        assert!(builder.statement().unwrap().contains(r#"remote_field: "custom""#));

        let err = builder
            .add_with("BOOK", HopOptions::default().relation_prop("weight", 1))
            .unwrap_err();
        assert!(matches!(
            err,
            PathError::Schema(SchemaError::UnknownRelationProperty { .. })
        ));
    }

    #[test]
    fn generic_relation_has_untyped_target() {
        let catalog = catalog();
        let mut builder = PathBuilder::new(&catalog, EntityInstance::new("testapp.tag", 2)).unwrap();
        builder.add("CONTENT_OBJECT").unwrap();
        assert!(builder
            .statement()
            .unwrap()
            .ends_with(r#"-[:CONTENT_OBJECT {remote_field: "testapp.tag.content_object"}]-> (target0)"#));
        assert_eq!(
            builder.add("BOOK").unwrap_err(),
            PathError::UntypedFrontier {
                label: "BOOK".to_string()
            }
        );
    }

    #[test]
    fn parses_back_references() {
        assert_eq!(parse_back_reference("{0:GROUPS}"), Some((0, "GROUPS")));
        assert_eq!(parse_back_reference("{12: BOOK }"), Some((12, "BOOK")));
        assert_eq!(parse_back_reference("{x:BOOK}"), None);
        assert_eq!(parse_back_reference("{0:}"), None);
        assert_eq!(parse_back_reference("BOOK"), None);
    }
}
