//! Query and mutation descriptors.
//!
//! A descriptor is the configuration record that parameterizes an observer:
//! a key plus a fetch function for queries, a commit function plus an
//! optional success callback for mutations. Descriptor factories build a
//! fresh descriptor on every recompute; the bridge decides from the
//! descriptor's identity whether a new observer is needed.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One primitive element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An ordered sequence of primitives identifying a query.
///
/// Two descriptors with equal keys are the same query; the serialized form
/// returned by [`QueryKey::hash`] is what contexts index by.
///
/// ```rust
/// use settle_core::query::QueryKey;
///
/// let key = QueryKey::new(["reminders"]).with(42);
/// assert_eq!(key.hash(), r#"["reminders",42]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    /// Build a key from homogeneous parts. Use [`QueryKey::with`] to append
    /// parts of other types.
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Append one part.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` matches the leading parts of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Serialized identity of the key.
    pub fn hash(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash())
    }
}

/// Boxed fetch operation of a query.
pub type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Boxed commit operation of a mutation.
pub type CommitFn<T, V> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Callback invoked with the result of a successful mutation.
pub type SuccessFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Describes a query: what to fetch and under which key.
///
/// Equality compares keys only, so a factory that recomputes to the same
/// key does not cause a resubscription.
pub struct QueryDescriptor<T> {
    key: QueryKey,
    fetch: FetchFn<T>,
}

impl<T> QueryDescriptor<T>
where
    T: Send + 'static,
{
    /// Create a descriptor. Fails if the key is empty.
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(BridgeError::InvalidDescriptor(
                "query key must have at least one part".into(),
            ));
        }

        Ok(Self {
            key,
            fetch: Arc::new(move || fetch().boxed()),
        })
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Start one run of the fetch operation.
    pub fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        (self.fetch)()
    }
}

impl<T> Clone for QueryDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<T> PartialEq for QueryDescriptor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> fmt::Debug for QueryDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Describes a mutation: the commit operation and what to do on success.
///
/// Mutations have no persistent identity. Every constructed descriptor is
/// distinct (clones compare equal), so each recompute yields a new observer.
pub struct MutationDescriptor<T, V> {
    id: u64,
    commit: CommitFn<T, V>,
    on_success: Option<SuccessFn<T>>,
}

impl<T, V> MutationDescriptor<T, V>
where
    T: Send + 'static,
    V: Send + 'static,
{
    pub fn new<F, Fut>(commit: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            commit: Arc::new(move |input| commit(input).boxed()),
            on_success: None,
        }
    }

    /// Attach a callback run after each successful commit.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Start one commit with the given input.
    pub fn commit(&self, input: V) -> BoxFuture<'static, Result<T>> {
        (self.commit)(input)
    }

    pub fn success_callback(&self) -> Option<SuccessFn<T>> {
        self.on_success.clone()
    }
}

impl<T, V> Clone for MutationDescriptor<T, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            commit: Arc::clone(&self.commit),
            on_success: self.on_success.clone(),
        }
    }
}

impl<T, V> PartialEq for MutationDescriptor<T, V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T, V> fmt::Debug for MutationDescriptor<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationDescriptor")
            .field("id", &self.id)
            .field("has_on_success", &self.on_success.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_json_of_parts() {
        let key = QueryKey::new(["tasks"])
            .with(7)
            .with(true)
            .with(None::<i64>);
        assert_eq!(key.hash(), r#"["tasks",7,true,null]"#);
        assert_eq!(key.to_string(), key.hash());
    }

    #[test]
    fn key_prefix_matching() {
        let key = QueryKey::new(["reminders", "user"]).with(3);
        assert!(key.starts_with(&QueryKey::new(["reminders"])));
        assert!(key.starts_with(&key));
        assert!(!key.starts_with(&QueryKey::new(["tasks"])));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = QueryDescriptor::new(QueryKey::default(), || async { Ok(1) }).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidDescriptor(_)));
    }

    #[test]
    fn query_descriptors_compare_by_key() {
        let a = QueryDescriptor::new(QueryKey::new(["a"]), || async { Ok(1) }).unwrap();
        let a2 = QueryDescriptor::new(QueryKey::new(["a"]), || async { Ok(2) }).unwrap();
        let b = QueryDescriptor::new(QueryKey::new(["b"]), || async { Ok(1) }).unwrap();

        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn mutation_descriptors_are_distinct_per_construction() {
        let first = MutationDescriptor::new(|v: i32| async move { Ok(v) });
        let second = MutationDescriptor::new(|v: i32| async move { Ok(v) });

        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn descriptor_operations_run() {
        let query = QueryDescriptor::new(QueryKey::new(["n"]), || async { Ok(5) }).unwrap();
        assert_eq!(query.fetch().await, Ok(5));

        let mutation = MutationDescriptor::new(|v: i32| async move { Ok(v * 2) });
        assert_eq!(mutation.commit(4).await, Ok(8));
    }
}
