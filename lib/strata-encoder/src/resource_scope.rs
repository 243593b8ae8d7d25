//! Resource and scope columns shared by the main tables.
use strata_model::{Resource, Scope};

use crate::{
    column::{
        builder::{PrimitiveBuilder, StringBuilder},
        ColumnData,
    },
    entity::{EntityIndex, EntityKind},
    error::EncodeError,
    optimizer::EntityGroup,
    related::{
        attributes::{RESOURCE_ATTRS, SCOPE_ATTRS},
        Accumulator, AttributesBuilder, FinishedTable,
    },
};

/// Declares the resource and scope columns, which follow the `id` column in every main table.
macro_rules! resource_scope_fields {
    ($($rest:expr),* $(,)?) => {
        &[
            FieldDef::optional("id", DataType::UInt16).delta(),
            FieldDef::required("resource.id", DataType::UInt16).delta(),
            FieldDef::optional("resource.schema_url", DataType::Utf8).dictionary(),
            FieldDef::optional("resource.dropped_attributes_count", DataType::UInt32),
            FieldDef::required("scope.id", DataType::UInt16).delta(),
            FieldDef::optional("scope.name", DataType::Utf8).dictionary(),
            FieldDef::optional("scope.version", DataType::Utf8).dictionary(),
            FieldDef::optional("scope.dropped_attributes_count", DataType::UInt32),
            FieldDef::optional("schema_url", DataType::Utf8).dictionary(),
            $($rest),*
        ]
    };
}
pub(crate) use resource_scope_fields;

/// Appends the resource and scope of every main-table row.
///
/// Resources and scopes are resolved through an [`EntityIndex`] each. Their attributes are written to the resource and
/// scope attribute tables only when an identifier is first allocated.
pub(crate) struct ResourceScopeColumns {
    resources: EntityIndex,
    scopes: EntityIndex,
    resource_attrs: AttributesBuilder<u16>,
    scope_attrs: AttributesBuilder<u16>,
    resource_id: PrimitiveBuilder<u16>,
    resource_schema_url: StringBuilder,
    resource_dropped_attributes_count: PrimitiveBuilder<u32>,
    scope_id: PrimitiveBuilder<u16>,
    scope_name: StringBuilder,
    scope_version: StringBuilder,
    scope_dropped_attributes_count: PrimitiveBuilder<u32>,
    schema_url: StringBuilder,
}

impl ResourceScopeColumns {
    pub fn new(dedup: bool) -> Self {
        Self {
            resources: EntityIndex::new(EntityKind::Resource, dedup),
            scopes: EntityIndex::new(EntityKind::Scope, dedup),
            resource_attrs: AttributesBuilder::new(&RESOURCE_ATTRS),
            scope_attrs: AttributesBuilder::new(&SCOPE_ATTRS),
            resource_id: PrimitiveBuilder::new(),
            resource_schema_url: StringBuilder::new(),
            resource_dropped_attributes_count: PrimitiveBuilder::new(),
            scope_id: PrimitiveBuilder::new(),
            scope_name: StringBuilder::new(),
            scope_version: StringBuilder::new(),
            scope_dropped_attributes_count: PrimitiveBuilder::new(),
            schema_url: StringBuilder::new(),
        }
    }

    /// Returns the number of resource and scope identifiers allocated so far.
    pub fn allocated(&self) -> (usize, usize) {
        (self.resources.allocated(), self.scopes.allocated())
    }

    pub fn append(
        &mut self, resource: &EntityGroup<'_, Resource>, scope: &EntityGroup<'_, Scope>,
    ) -> Result<(), EncodeError> {
        let resource_id = self.resources.resolve(&resource.key)?;
        let scope_id = self.scopes.resolve(&scope.key)?;

        if resource_id.is_new && !resource.entity.attributes.is_empty() {
            self.resource_attrs
                .append_with_id(resource_id.id, &resource.entity.attributes)?;
        }
        if scope_id.is_new && !scope.entity.attributes.is_empty() {
            self.scope_attrs.append_with_id(scope_id.id, &scope.entity.attributes)?;
        }

        self.resource_id.append(resource_id.id);
        self.resource_schema_url.append_non_empty(resource.schema_url);
        self.resource_dropped_attributes_count
            .append_non_zero(resource.entity.dropped_attributes_count);
        self.scope_id.append(scope_id.id);
        self.scope_name.append_non_empty(&scope.entity.name);
        self.scope_version.append_non_empty(&scope.entity.version);
        self.scope_dropped_attributes_count
            .append_non_zero(scope.entity.dropped_attributes_count);
        self.schema_url.append_non_empty(scope.schema_url);
        Ok(())
    }

    /// Finishes the resource and scope columns, in field order.
    pub fn finish_columns(&mut self) -> [ColumnData; 8] {
        [
            self.resource_id.finish(),
            self.resource_schema_url.finish(),
            self.resource_dropped_attributes_count.finish(),
            self.scope_id.finish(),
            self.scope_name.finish(),
            self.scope_version.finish(),
            self.scope_dropped_attributes_count.finish(),
            self.schema_url.finish(),
        ]
    }
}

impl Accumulator for ResourceScopeColumns {
    fn reset(&mut self) {
        self.resources.reset();
        self.scopes.reset();
        self.resource_attrs.reset();
        self.scope_attrs.reset();
        self.resource_id.reset();
        self.resource_schema_url.reset();
        self.resource_dropped_attributes_count.reset();
        self.scope_id.reset();
        self.scope_name.reset();
        self.scope_version.reset();
        self.scope_dropped_attributes_count.reset();
        self.schema_url.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        self.resources.reset();
        self.scopes.reset();
        self.resource_attrs.finish(out);
        self.scope_attrs.finish(out);
    }
}

#[cfg(test)]
mod tests {
    use strata_model::KeyValue;

    use super::*;
    use crate::entity::EntityKey;

    fn group<'a, T>(entity: &'a T, key: EntityKey) -> EntityGroup<'a, T> {
        EntityGroup {
            entity,
            schema_url: "",
            key,
        }
    }

    #[test]
    fn attributes_written_once_per_identifier() {
        let resource = Resource::from_attributes(vec![KeyValue::new("service", "api")]);
        let scope = Scope::new("lib", "1.0");
        let resource_group = group(&resource, EntityKey::resource(&resource, ""));
        let scope_group = group(&scope, EntityKey::scope(&scope, ""));

        let mut columns = ResourceScopeColumns::new(true);
        for _ in 0..3 {
            columns.append(&resource_group, &scope_group).unwrap();
        }
        assert_eq!(columns.allocated(), (1, 1));

        let finished = columns.finish_columns();
        assert_eq!(finished[0], ColumnData::UInt16(vec![Some(0); 3]));
        assert_eq!(finished[4], ColumnData::Utf8(vec![Some("lib".into()); 3]));

        let mut out = Vec::new();
        columns.finish(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].def.name, "resource_attrs");
        assert_eq!(out[0].num_rows(), 1);
        assert_eq!(out[1].num_rows(), 0);
        assert_eq!(columns.allocated(), (0, 0));
    }

    #[test]
    fn without_dedup_every_row_is_new() {
        let resource = Resource::from_attributes(vec![KeyValue::new("service", "api")]);
        let scope = Scope::new("lib", "1.0");
        let resource_group = group(&resource, EntityKey::resource(&resource, ""));
        let scope_group = group(&scope, EntityKey::scope(&scope, ""));

        let mut columns = ResourceScopeColumns::new(false);
        for _ in 0..3 {
            columns.append(&resource_group, &scope_group).unwrap();
        }
        assert_eq!(columns.allocated(), (3, 3));

        let finished = columns.finish_columns();
        assert_eq!(finished[0], ColumnData::UInt16(vec![Some(0), Some(1), Some(2)]));

        let mut out = Vec::new();
        columns.finish(&mut out);
        assert_eq!(out[0].num_rows(), 3);
    }
}
