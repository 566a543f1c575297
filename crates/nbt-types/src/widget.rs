use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::data::Data;
use crate::tool::Tool;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Tool,
    Data,
    Group,
    Placeholder,
    Custom,
}

/// A renderable handle. Rendering itself belongs to the front-end; the
/// kernel only tracks identity and the content bundle to display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Widget {
    pub id: Uuid,
    pub kind: WidgetKind,
    pub name: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

impl Widget {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self::with_kind(WidgetKind::Custom, name, content)
    }

    fn with_kind(kind: WidgetKind, name: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            content,
            created_at: Utc::now(),
        }
    }

    pub fn for_tool(tool: &Tool) -> Self {
        Self::with_kind(
            WidgetKind::Tool,
            tool.display_name(),
            json!({
                "origin": tool.origin,
                "id": tool.id,
                "description": tool.description,
                "version": tool.version,
            }),
        )
    }

    pub fn for_data(data: &Data) -> Self {
        Self::with_kind(
            WidgetKind::Data,
            data.label.clone(),
            json!({
                "origin": data.origin,
                "group": data.group,
                "uri": data.uri,
                "kind": data.kind,
                "icon": data.icon,
            }),
        )
    }

    pub fn group(origin: &str, group: &str, items: &[Data]) -> Self {
        let files: Vec<Value> = items
            .iter()
            .map(|d| json!({ "uri": d.uri, "label": d.label, "kind": d.kind }))
            .collect();
        Self::with_kind(
            WidgetKind::Group,
            group,
            json!({ "origin": origin, "group": group, "files": files }),
        )
    }

    /// Error widget shown in place of an unresolved reference.
    pub fn placeholder(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_kind(
            WidgetKind::Placeholder,
            name,
            json!({ "error": error.into() }),
        )
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == WidgetKind::Placeholder
    }
}
