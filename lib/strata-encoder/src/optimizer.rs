//! Canonicalization of telemetry trees into ordered rows.
use serde::{Deserialize, Serialize};
use strata_model::{metric::Metric, trace::Span, Metrics, Resource, Scope, Traces};

use crate::entity::EntityKey;

/// Row ordering applied before encoding.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Rows keep their arrival order.
    None,

    /// Rows are stably sorted by resource, then scope, then name.
    ///
    /// Grouping identical entities next to each other makes identifiers and owner IDs compress well.
    #[default]
    ByResourceScopeName,
}

/// A resource or scope, along with its schema URL and precomputed key.
#[derive(Debug)]
pub struct EntityGroup<'a, T> {
    /// The entity.
    pub entity: &'a T,

    /// Schema URL of the group the entity came from.
    pub schema_url: &'a str,

    /// Structural key of the entity.
    pub key: EntityKey,
}

/// A leaf record and the positions of its resource and scope.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a, T> {
    /// Index into [`Flattened::resources`].
    pub resource: usize,

    /// Index into [`Flattened::scopes`].
    pub scope: usize,

    /// The record.
    pub item: &'a T,
}

/// A telemetry tree flattened into rows.
///
/// Entity keys are computed once per resource or scope group rather than once per row.
#[derive(Debug)]
pub struct Flattened<'a, T> {
    /// Resources, in tree order.
    pub resources: Vec<EntityGroup<'a, Resource>>,

    /// Scopes, in tree order.
    pub scopes: Vec<EntityGroup<'a, Scope>>,

    /// Rows, in encoding order.
    pub rows: Vec<Row<'a, T>>,
}

impl<'a, T> Flattened<'a, T> {
    fn new() -> Self {
        Self {
            resources: Vec::new(),
            scopes: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Returns the resource of the given row.
    pub fn resource_of(&self, row: &Row<'a, T>) -> &EntityGroup<'a, Resource> {
        &self.resources[row.resource]
    }

    /// Returns the scope of the given row.
    pub fn scope_of(&self, row: &Row<'a, T>) -> &EntityGroup<'a, Scope> {
        &self.scopes[row.scope]
    }

    fn sort_by_name<F>(&mut self, name: F)
    where
        F: Fn(&T) -> &str,
    {
        let resources = &self.resources;
        let scopes = &self.scopes;
        self.rows.sort_by(|a, b| {
            resources[a.resource]
                .key
                .cmp(&resources[b.resource].key)
                .then_with(|| scopes[a.scope].key.cmp(&scopes[b.scope].key))
                .then_with(|| name(a.item).cmp(name(b.item)))
        });
    }
}

/// Flattens traces into span rows, ordered according to `policy`.
pub fn optimize_traces(traces: &Traces, policy: SortPolicy) -> Flattened<'_, Span> {
    let mut flattened = Flattened::new();
    for rs in &traces.resource_spans {
        let resource = flattened.resources.len();
        flattened.resources.push(EntityGroup {
            entity: &rs.resource,
            schema_url: &rs.schema_url,
            key: EntityKey::resource(&rs.resource, &rs.schema_url),
        });

        for ss in &rs.scope_spans {
            let scope = flattened.scopes.len();
            flattened.scopes.push(EntityGroup {
                entity: &ss.scope,
                schema_url: &ss.schema_url,
                key: EntityKey::scope(&ss.scope, &ss.schema_url),
            });

            flattened
                .rows
                .extend(ss.spans.iter().map(|item| Row { resource, scope, item }));
        }
    }

    if policy == SortPolicy::ByResourceScopeName {
        flattened.sort_by_name(|span| span.name.as_str());
    }
    flattened
}

/// Flattens metrics into metric rows, ordered according to `policy`.
pub fn optimize_metrics(metrics: &Metrics, policy: SortPolicy) -> Flattened<'_, Metric> {
    let mut flattened = Flattened::new();
    for rm in &metrics.resource_metrics {
        let resource = flattened.resources.len();
        flattened.resources.push(EntityGroup {
            entity: &rm.resource,
            schema_url: &rm.schema_url,
            key: EntityKey::resource(&rm.resource, &rm.schema_url),
        });

        for sm in &rm.scope_metrics {
            let scope = flattened.scopes.len();
            flattened.scopes.push(EntityGroup {
                entity: &sm.scope,
                schema_url: &sm.schema_url,
                key: EntityKey::scope(&sm.scope, &sm.schema_url),
            });

            flattened
                .rows
                .extend(sm.metrics.iter().map(|item| Row { resource, scope, item }));
        }
    }

    if policy == SortPolicy::ByResourceScopeName {
        flattened.sort_by_name(|metric| metric.name.as_str());
    }
    flattened
}

#[cfg(test)]
mod tests {
    use strata_model::{
        trace::{ResourceSpans, ScopeSpans},
        AnyValue, KeyValue,
    };

    use super::*;

    fn span(name: &str) -> Span {
        Span {
            name: name.into(),
            ..Default::default()
        }
    }

    fn traces() -> Traces {
        let resource_b = Resource::from_attributes(vec![KeyValue::new("service", "b")]);
        let resource_a = Resource::from_attributes(vec![KeyValue::new("service", "a")]);
        Traces {
            resource_spans: vec![
                ResourceSpans {
                    resource: resource_b.clone(),
                    schema_url: String::new(),
                    scope_spans: vec![ScopeSpans {
                        scope: Scope::new("lib", "1"),
                        schema_url: String::new(),
                        spans: vec![span("z"), span("a")],
                    }],
                },
                ResourceSpans {
                    resource: resource_a,
                    schema_url: String::new(),
                    scope_spans: vec![ScopeSpans {
                        scope: Scope::new("lib", "1"),
                        schema_url: String::new(),
                        spans: vec![span("m")],
                    }],
                },
                ResourceSpans {
                    resource: resource_b,
                    schema_url: String::new(),
                    scope_spans: vec![ScopeSpans {
                        scope: Scope::new("lib", "1"),
                        schema_url: String::new(),
                        spans: vec![span("b")],
                    }],
                },
            ],
        }
    }

    fn names(flattened: &Flattened<'_, Span>) -> Vec<String> {
        flattened.rows.iter().map(|row| row.item.name.clone()).collect()
    }

    #[test]
    fn no_sort_keeps_arrival_order() {
        let traces = traces();
        let flattened = optimize_traces(&traces, SortPolicy::None);
        assert_eq!(names(&flattened), ["z", "a", "m", "b"]);
        assert_eq!(flattened.resources.len(), 3);
        assert_eq!(flattened.scopes.len(), 3);
    }

    #[test]
    fn sort_groups_identical_resources() {
        let traces = traces();
        let flattened = optimize_traces(&traces, SortPolicy::ByResourceScopeName);

        // Both copies of resource "b" end up adjacent, with their spans ordered by name.
        let rows = &flattened.rows;
        let b_positions = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| flattened.resource_of(row).entity.attributes[0].value == AnyValue::Str("b".into()))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(b_positions.len(), 3);
        assert_eq!(b_positions[2] - b_positions[0], 2);

        let b_names = b_positions.iter().map(|&i| rows[i].item.name.as_str()).collect::<Vec<_>>();
        assert_eq!(b_names, ["a", "b", "z"]);
    }

    #[test]
    fn sorting_is_deterministic() {
        let traces = traces();
        let first = names(&optimize_traces(&traces, SortPolicy::ByResourceScopeName));
        let second = names(&optimize_traces(&traces, SortPolicy::ByResourceScopeName));
        assert_eq!(first, second);
    }
}
