//! Resource and scope deduplication.
use std::fmt;

use strata_model::{AnyValue, KeyValue, Resource, Scope};

use crate::{collections::FastHashMap, error::EncodeError};

/// Kind of a deduplicated entity.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EntityKind {
    /// A resource.
    Resource,

    /// An instrumentation scope.
    Scope,
}

impl EntityKind {
    /// Returns the entity kind as a static string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Scope => "scope",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural identity of a resource or scope.
///
/// Two entities have the same key if they have the same schema URL, the same dropped-attributes count, the same name
/// and version (scopes only), and the same attributes regardless of order. Keys are a canonical byte encoding, which
/// also gives them a total order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityKey(Box<[u8]>);

impl EntityKey {
    /// Computes the key of a resource.
    pub fn resource(resource: &Resource, schema_url: &str) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(b'R');
        write_str(&mut buf, schema_url);
        write_u64(&mut buf, u64::from(resource.dropped_attributes_count));
        write_attributes(&mut buf, &resource.attributes);
        Self(buf.into_boxed_slice())
    }

    /// Computes the key of a scope.
    pub fn scope(scope: &Scope, schema_url: &str) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(b'S');
        write_str(&mut buf, schema_url);
        write_str(&mut buf, &scope.name);
        write_str(&mut buf, &scope.version);
        write_u64(&mut buf, u64::from(scope.dropped_attributes_count));
        write_attributes(&mut buf, &scope.attributes);
        Self(buf.into_boxed_slice())
    }

    /// Returns the canonical bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, value: &str) {
    write_bytes(buf, value.as_bytes());
}

fn write_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    write_u64(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

fn write_attributes(buf: &mut Vec<u8>, attributes: &[KeyValue]) {
    // Entries are encoded independently and sorted, so attribute order never affects the key.
    let mut entries = attributes
        .iter()
        .map(|kv| {
            let mut entry = Vec::with_capacity(kv.key.len() + 16);
            write_str(&mut entry, &kv.key);
            write_value(&mut entry, &kv.value);
            entry
        })
        .collect::<Vec<_>>();
    entries.sort_unstable();

    write_u64(buf, entries.len() as u64);
    for entry in entries {
        buf.extend_from_slice(&entry);
    }
}

fn write_value(buf: &mut Vec<u8>, value: &AnyValue) {
    match value {
        AnyValue::Empty => buf.push(0),
        AnyValue::Str(s) => {
            buf.push(1);
            write_str(buf, s);
        }
        AnyValue::Bool(b) => {
            buf.push(2);
            buf.push(u8::from(*b));
        }
        AnyValue::Int(i) => {
            buf.push(3);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        AnyValue::Double(d) => {
            buf.push(4);
            write_u64(buf, d.to_bits());
        }
        AnyValue::Bytes(b) => {
            buf.push(5);
            write_bytes(buf, b);
        }
        AnyValue::Array(values) => {
            buf.push(6);
            write_u64(buf, values.len() as u64);
            for value in values {
                write_value(buf, value);
            }
        }
        AnyValue::KvList(kvs) => {
            buf.push(7);
            write_attributes(buf, kvs);
        }
    }
}

/// Outcome of resolving an entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resolved {
    /// Identifier of the entity within the current batch.
    pub id: u16,

    /// Whether the identifier was newly allocated.
    ///
    /// The entity's attributes should only be written when this is `true`.
    pub is_new: bool,
}

/// Assigns batch-scoped identifiers to resources or scopes.
///
/// With deduplication enabled, entities with the same [`EntityKey`] share an identifier. Without it, every resolution
/// allocates a fresh identifier. Identifiers start at zero and must fit in a `u16`.
#[derive(Debug)]
pub struct EntityIndex {
    kind: EntityKind,
    dedup: bool,
    ids: FastHashMap<EntityKey, u16>,
    next_id: u32,
}

impl EntityIndex {
    /// Creates a new, empty `EntityIndex`.
    pub fn new(kind: EntityKind, dedup: bool) -> Self {
        Self {
            kind,
            dedup,
            ids: FastHashMap::default(),
            next_id: 0,
        }
    }

    /// Resolves the identifier for the given entity key.
    ///
    /// # Errors
    ///
    /// If a new identifier is needed but would not fit in a `u16`, a `CapacityExceeded` error is returned. The index is
    /// left unchanged in that case.
    pub fn resolve(&mut self, key: &EntityKey) -> Result<Resolved, EncodeError> {
        if self.dedup {
            if let Some(&id) = self.ids.get(key) {
                return Ok(Resolved { id, is_new: false });
            }
        }

        let id = self.allocate()?;
        if self.dedup {
            self.ids.insert(key.clone(), id);
        }
        Ok(Resolved { id, is_new: true })
    }

    fn allocate(&mut self) -> Result<u16, EncodeError> {
        let id = u16::try_from(self.next_id).map_err(|_| EncodeError::CapacityExceeded {
            entity: self.kind.as_str(),
            id: u64::from(self.next_id),
        })?;
        self.next_id += 1;
        Ok(id)
    }

    /// Returns the number of identifiers allocated since the last reset.
    pub fn allocated(&self) -> usize {
        self.next_id as usize
    }

    /// Forgets all entities and restarts identifier allocation at zero.
    pub fn reset(&mut self) {
        self.ids.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use strata_model::Attributes;

    use super::*;

    fn resource(attributes: Attributes) -> Resource {
        Resource::from_attributes(attributes)
    }

    #[test]
    fn key_is_structural() {
        let a = resource(vec![KeyValue::new("host", "a"), KeyValue::new("pid", 7i64)]);
        let b = resource(vec![KeyValue::new("pid", 7i64), KeyValue::new("host", "a")]);
        let c = resource(vec![KeyValue::new("host", "a"), KeyValue::new("pid", "7")]);

        assert_eq!(EntityKey::resource(&a, ""), EntityKey::resource(&b, ""));
        assert_ne!(EntityKey::resource(&a, ""), EntityKey::resource(&c, ""));
        assert_ne!(EntityKey::resource(&a, ""), EntityKey::resource(&a, "https://schema"));

        let mut dropped = a.clone();
        dropped.dropped_attributes_count = 1;
        assert_ne!(EntityKey::resource(&a, ""), EntityKey::resource(&dropped, ""));
    }

    #[test]
    fn scope_key_includes_name_and_version() {
        let a = Scope::new("lib", "1.0");
        let b = Scope::new("lib", "1.1");
        assert_ne!(EntityKey::scope(&a, ""), EntityKey::scope(&b, ""));
        assert_eq!(EntityKey::scope(&a, ""), EntityKey::scope(&a.clone(), ""));

        // A resource and a scope never collide, even with identical attributes.
        assert_ne!(
            EntityKey::scope(&Scope::default(), "").as_bytes(),
            EntityKey::resource(&Resource::default(), "").as_bytes()
        );
    }

    #[test]
    fn dedup_reuses_ids() {
        let mut index = EntityIndex::new(EntityKind::Resource, true);
        let a = EntityKey::resource(&resource(vec![KeyValue::new("k", "a")]), "");
        let b = EntityKey::resource(&resource(vec![KeyValue::new("k", "b")]), "");

        assert_eq!(index.resolve(&a).unwrap(), Resolved { id: 0, is_new: true });
        assert_eq!(index.resolve(&b).unwrap(), Resolved { id: 1, is_new: true });
        assert_eq!(index.resolve(&a).unwrap(), Resolved { id: 0, is_new: false });
        assert_eq!(index.allocated(), 2);

        index.reset();
        assert_eq!(index.resolve(&b).unwrap(), Resolved { id: 0, is_new: true });
    }

    #[test]
    fn no_dedup_always_allocates() {
        let mut index = EntityIndex::new(EntityKind::Scope, false);
        let key = EntityKey::scope(&Scope::new("lib", ""), "");

        for expected in 0..3 {
            assert_eq!(index.resolve(&key).unwrap(), Resolved { id: expected, is_new: true });
        }
    }

    #[test]
    fn id_space_is_bounded() {
        let mut index = EntityIndex::new(EntityKind::Resource, false);
        let key = EntityKey::resource(&Resource::default(), "");

        for _ in 0..=u16::MAX as usize {
            index.resolve(&key).unwrap();
        }

        match index.resolve(&key) {
            Err(EncodeError::CapacityExceeded { entity, id }) => {
                assert_eq!(entity, "resource");
                assert_eq!(id, 65536);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Still failing, and nothing was consumed by the failed attempt.
        assert!(index.resolve(&key).is_err());
        assert_eq!(index.allocated(), 65536);
    }

    fn arb_value() -> impl Strategy<Value = AnyValue> {
        prop_oneof![
            "[a-c]{0,2}".prop_map(AnyValue::Str),
            any::<bool>().prop_map(AnyValue::Bool),
            (-2i64..2).prop_map(AnyValue::Int),
            Just(AnyValue::Empty),
        ]
    }

    proptest! {
        #[test]
        fn key_ignores_attribute_order(attrs in prop::collection::vec(("[a-d]", arb_value()), 0..6), seed in any::<u64>()) {
            let attributes = attrs.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect::<Vec<_>>();
            let mut shuffled = attributes.clone();
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();
            }

            prop_assert_eq!(
                EntityKey::resource(&resource(attributes), ""),
                EntityKey::resource(&resource(shuffled), "")
            );
        }

        #[test]
        fn dedup_accounting(picks in prop::collection::vec(0usize..8, 1..64)) {
            let keys = (0..8)
                .map(|i| EntityKey::resource(&resource(vec![KeyValue::new("i", i as i64)]), ""))
                .collect::<Vec<_>>();

            let mut dedup = EntityIndex::new(EntityKind::Resource, true);
            let mut no_dedup = EntityIndex::new(EntityKind::Resource, false);
            let mut distinct = std::collections::BTreeSet::new();
            let mut assigned = FastHashMap::default();

            for &pick in &picks {
                distinct.insert(pick);
                let resolved = dedup.resolve(&keys[pick]).unwrap();
                let previous = assigned.insert(pick, resolved.id);
                prop_assert_eq!(resolved.is_new, previous.is_none());
                if let Some(previous) = previous {
                    prop_assert_eq!(previous, resolved.id);
                }
                no_dedup.resolve(&keys[pick]).unwrap();
            }

            prop_assert_eq!(dedup.allocated(), distinct.len());
            prop_assert_eq!(no_dedup.allocated(), picks.len());
        }
    }
}
