//! Rule registry and path matching.
//!
//! The host application owns a [`Registry`] and passes it to wherever
//! storage paths are resolved. Extensions register rules under their owner
//! ID and are removed in one call when they unload.
//!
//! Rules are tried in registration order and the first matching one wins.
//! The registry does not check for overlapping matchers; registering a
//! catch-all before more specific rules shadows them.

use crate::{
    error::Result,
    rule::{BufferMap, BuiltinRule, SerDesOptions, SerDesRule},
    Error, OwnerId, Value,
};
use std::fmt;
use std::sync::Arc;

/// Owner under which [`Registry::with_defaults`] registers its rules.
pub const BUILTIN_OWNER: &str = "paneron";

/// Custom path predicate.
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate selecting the storage paths a rule applies to.
///
/// Every condition that is set must hold. A matcher with no conditions
/// matches every path.
#[derive(Clone, Default)]
pub struct PathMatcher {
    /// Accepted file extensions, each with a leading `.`
    pub extensions: Vec<String>,
    /// Required path prefix
    pub prefix: Option<String>,
    predicate: Option<Predicate>,
}

impl PathMatcher {
    /// Matcher accepting every path.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matcher accepting paths ending in one of the extensions.
    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_extensions(extensions)
    }

    /// Matcher accepting paths under a prefix.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::default().with_prefix(prefix)
    }

    /// Matcher accepting paths the predicate approves.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::default().with_predicate(predicate)
    }

    /// Builder-style method to add extensions. A missing leading `.` is added.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.extend(extensions.into_iter().map(|ext| {
            let ext = ext.into();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        }));
        self
    }

    /// Builder-style method to require a prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Builder-style method to require a custom predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether the matcher has no conditions.
    pub fn is_catch_all(&self) -> bool {
        self.extensions.is_empty() && self.prefix.is_none() && self.predicate.is_none()
    }

    /// Check a storage path against every condition.
    pub fn matches(&self, path: &str) -> bool {
        let extension_ok =
            self.extensions.is_empty() || self.extensions.iter().any(|ext| path.ends_with(ext));
        let prefix_ok = self
            .prefix
            .as_deref()
            .map_or(true, |prefix| path.starts_with(prefix));
        let predicate_ok = self.predicate.as_ref().map_or(true, |f| f(path));

        extension_ok && prefix_ok && predicate_ok
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("extensions", &self.extensions)
            .field("prefix", &self.prefix)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A rule registered under an owner.
#[derive(Debug, Clone)]
struct Registration {
    owner: OwnerId,
    rule: SerDesRule,
    matcher: PathMatcher,
}

/// Ordered set of rules and the paths they apply to.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin file rules and a binary catch-all.
    ///
    /// | Extensions | Rule |
    /// |---|---|
    /// | `.json` | `json-file` |
    /// | `.yaml`, `.yml` | `yaml-file` |
    /// | `.txt`, `.md` | `text-file` |
    /// | anything else | `binary-file` |
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(
                BUILTIN_OWNER,
                BuiltinRule::JsonFile.rule(),
                PathMatcher::extensions([".json"]),
            )
            .register(
                BUILTIN_OWNER,
                BuiltinRule::YamlFile.rule(),
                PathMatcher::extensions([".yaml", ".yml"]),
            )
            .register(
                BUILTIN_OWNER,
                BuiltinRule::TextFile.rule(),
                PathMatcher::extensions([".txt", ".md"]),
            )
            .register(
                BUILTIN_OWNER,
                BuiltinRule::BinaryFile.rule(),
                PathMatcher::any(),
            );
        registry
    }

    /// Append a rule at the lowest priority.
    pub fn register(
        &mut self,
        owner: impl Into<OwnerId>,
        rule: SerDesRule,
        matcher: PathMatcher,
    ) -> &mut Self {
        let owner = owner.into();
        tracing::debug!(owner = %owner, rule = %rule.id, ?matcher, "Registered serialization rule");
        self.registrations.push(Registration {
            owner,
            rule,
            matcher,
        });
        self
    }

    /// Remove every rule registered by an owner. Returns how many were removed.
    pub fn unregister(&mut self, owner: &str) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.owner != owner);
        let removed = before - self.registrations.len();
        tracing::debug!(owner = %owner, removed, "Unregistered serialization rules");
        removed
    }

    /// Select the first rule whose matcher accepts the path.
    pub fn resolve(&self, path: &str) -> Result<&SerDesRule> {
        let registration = self
            .registrations
            .iter()
            .find(|r| r.matcher.matches(path))
            .ok_or_else(|| Error::UnsupportedPath(path.to_string()))?;

        tracing::debug!(path = %path, rule = %registration.rule.id, "Resolved serialization rule");
        Ok(&registration.rule)
    }

    /// Look up a registered rule by identifier, falling back to the builtins.
    pub fn rule(&self, id: &str) -> Result<SerDesRule> {
        self.registrations
            .iter()
            .find(|r| r.rule.id == id)
            .map(|r| r.rule.clone())
            .or_else(|| BuiltinRule::from_id(id).map(|builtin| builtin.rule()))
            .ok_or_else(|| Error::UnknownRule(id.to_string()))
    }

    /// Identifiers of the rules registered by an owner, in priority order.
    pub fn rules_of(&self, owner: &str) -> Vec<&str> {
        self.registrations
            .iter()
            .filter(|r| r.owner == owner)
            .map(|r| r.rule.id.as_str())
            .collect()
    }

    /// Serialize the document stored at `path` with the rule selected for it.
    pub fn serialize_path(
        &self,
        path: &str,
        doc: &Value,
        opts: &SerDesOptions,
    ) -> Result<BufferMap> {
        self.resolve(path)?.serialize(doc, opts)
    }

    /// Deserialize the document stored at `path` with the rule selected for it.
    pub fn deserialize_path(
        &self,
        path: &str,
        buffers: &BufferMap,
        opts: &SerDesOptions,
    ) -> Result<Value> {
        self.resolve(path)?.deserialize(buffers, opts)
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
