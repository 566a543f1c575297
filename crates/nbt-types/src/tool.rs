use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::{Entity, TOOL_REGISTER_EVENT};
use crate::error::{LoadError, NbError, NbResult};
use crate::widget::Widget;

/// Keyword arguments handed to a tool's load factory.
pub type LoadArgs = serde_json::Map<String, Value>;

/// Factory producing a renderable instance of a tool.
pub type LoadFn = Arc<dyn Fn(&LoadArgs) -> Result<Widget, LoadError> + Send + Sync>;

/// Declarative tool definition, as found in manifests or sent by callers.
///
/// Unknown keys are rejected at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One capability the notebook can present as a widget.
#[derive(Clone)]
pub struct Tool {
    pub origin: String,
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub version: Option<String>,
    pub load: Option<LoadFn>,
}

impl Tool {
    pub fn new(origin: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            id: id.into(),
            name: None,
            description: None,
            tags: BTreeSet::new(),
            version: None,
            load: None,
        }
    }

    pub fn from_spec(spec: ToolSpec) -> Self {
        Self {
            origin: spec.origin,
            id: spec.id,
            name: spec.name,
            description: spec.description,
            tags: spec.tags,
            version: spec.version,
            load: None,
        }
    }

    /// Build a tool from a loosely-typed JSON object.
    pub fn from_value(value: Value) -> NbResult<Self> {
        let spec: ToolSpec = serde_json::from_value(value)
            .map_err(|e| NbError::from_spec_error(Self::KIND, e))?;
        Ok(Self::from_spec(spec))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_loader<F>(mut self, load: F) -> Self
    where
        F: Fn(&LoadArgs) -> Result<Widget, LoadError> + Send + Sync + 'static,
    {
        self.load = Some(Arc::new(load));
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Run the load factory with `args`.
    ///
    /// A factory that rejects arguments is retried once with none. Tools
    /// without a factory load as a descriptive widget of themselves.
    pub fn load(&self, args: &LoadArgs) -> Result<Widget, LoadError> {
        let Some(load) = &self.load else {
            return Ok(Widget::for_tool(self));
        };
        match load(args) {
            Err(LoadError::UnsupportedArgs) if !args.is_empty() => load(&LoadArgs::new()),
            other => other,
        }
    }

    pub fn json_safe(&self) -> ToolJson {
        ToolJson {
            origin: self.origin.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.iter().cloned().collect(),
            version: self.version.clone(),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("origin", &self.origin)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("version", &self.version)
            .field("load", &self.load.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Entity for Tool {
    const KIND: &'static str = "tool";
    const REGISTER_EVENT: &'static str = TOOL_REGISTER_EVENT;

    fn origin(&self) -> &str {
        &self.origin
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "origin" => Some(self.origin.clone()),
            "id" => Some(self.id.clone()),
            "name" => self.name.clone(),
            "description" => self.description.clone(),
            "version" => self.version.clone(),
            _ => None,
        }
    }

    fn event_payload(&self) -> Value {
        json!({
            "origin": self.origin,
            "id": self.id,
            "name": self.display_name(),
        })
    }
}

/// Tool metadata as sent to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolJson {
    pub origin: String,
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub version: Option<String>,
}
