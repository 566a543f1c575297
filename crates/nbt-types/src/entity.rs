use std::collections::BTreeSet;

use serde_json::Value;

/// Event dispatched after a tool is written into the registry.
pub const TOOL_REGISTER_EVENT: &str = "registry.tool.register";
/// Event dispatched after a datum is written into the registry.
pub const DATA_REGISTER_EVENT: &str = "registry.data.register";
/// Event dispatched when a cached group or data widget is replaced.
pub const REFRESH_DATA_EVENT: &str = "registry.refresh_data";

/// Something that can live in a two-level `origin -> key -> entity` registry.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Human-readable entity kind, used in errors and logs.
    const KIND: &'static str;
    /// Bus event dispatched after a successful registration.
    const REGISTER_EVENT: &'static str;

    fn origin(&self) -> &str;

    /// Local key, unique within the origin (`id` for tools, `uri` for data).
    fn key(&self) -> &str;

    /// Named attribute lookup used by [`Filter`]. `None` means the entity
    /// has no such attribute (or it is unset), which fails any criterion.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Payload carried by [`Entity::REGISTER_EVENT`].
    fn event_payload(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Criterion {
    Equals { attr: String, value: String },
    OneOf { attr: String, values: BTreeSet<String> },
}

/// Conjunction of attribute predicates over registry entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    criteria: Vec<Criterion>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `attr` to equal `value` exactly.
    pub fn equals(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.push(Criterion::Equals {
            attr: attr.into(),
            value: value.into(),
        });
        self
    }

    /// Require `attr` to be a member of `values`.
    pub fn one_of<I, S>(mut self, attr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria.push(Criterion::OneOf {
            attr: attr.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn origin(self, origin: impl Into<String>) -> Self {
        self.equals("origin", origin)
    }

    pub fn kind(self, kind: impl Into<String>) -> Self {
        self.equals("kind", kind)
    }

    /// Set membership on `kind`, the `kinds=` criterion.
    pub fn kinds<I, S>(self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of("kind", kinds)
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        self.criteria.iter().all(|criterion| match criterion {
            Criterion::Equals { attr, value } => {
                entity.attribute(attr).is_some_and(|v| &v == value)
            }
            Criterion::OneOf { attr, values } => {
                entity.attribute(attr).is_some_and(|v| values.contains(&v))
            }
        })
    }
}
