/// Hasher used by every map and set in the crate.
pub(crate) type FastBuildHasher = foldhash::quality::RandomState;

/// A hash set based on `hashbrown` using [`FastBuildHasher`].
pub(crate) type FastHashSet<T> = hashbrown::HashSet<T, FastBuildHasher>;

/// A hash map based on `hashbrown` using [`FastBuildHasher`].
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, FastBuildHasher>;
