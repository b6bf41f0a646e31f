/// External storage for the serialized config entry, keyed by a hash of the SDK key.
///
/// Implementations may be shared between processes, so whatever [`ConfigCache::read`]
/// returns is parsed and validated again before the client trusts it.
pub trait ConfigCache: Sync + Send {
    /// Returns the entry stored under `key`, if any.
    fn read(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing the previous entry.
    fn write(&self, key: &str, value: &str);
}

/// The default cache, it never holds anything.
#[derive(Default)]
pub struct EmptyConfigCache;

impl EmptyConfigCache {
    /// Creates the no-op cache.
    pub fn new() -> Self {
        EmptyConfigCache
    }
}

impl ConfigCache for EmptyConfigCache {
    fn read(&self, _key: &str) -> Option<String> {
        None
    }

    fn write(&self, _key: &str, _value: &str) {}
}
