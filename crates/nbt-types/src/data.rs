use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::{Entity, DATA_REGISTER_EVENT};
use crate::error::{NbError, NbResult};

/// Declarative data definition. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSpec {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// A named artifact, usually an output file, produced by running a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub origin: String,
    pub group: String,
    pub uri: String,
    pub label: String,
    pub kind: Option<String>,
    pub icon: Option<String>,
}

impl Data {
    /// Label and kind are derived from the uri.
    pub fn new(origin: impl Into<String>, group: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            origin: origin.into(),
            group: group.into(),
            label: file_name(&uri).to_string(),
            kind: file_type(&uri).map(str::to_string),
            uri,
            icon: None,
        }
    }

    pub fn from_spec(spec: DataSpec) -> Self {
        let mut data = Self::new(spec.origin, spec.group, spec.uri);
        if let Some(label) = spec.label.filter(|l| !l.is_empty()) {
            data.label = label;
        }
        if spec.kind.is_some() {
            data.kind = spec.kind;
        }
        data.icon = spec.icon;
        data
    }

    pub fn from_value(value: Value) -> NbResult<Self> {
        let spec: DataSpec = serde_json::from_value(value)
            .map_err(|e| NbError::from_spec_error(Self::KIND, e))?;
        Ok(Self::from_spec(spec))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Drop the kind, including any derived from the uri.
    pub fn without_kind(mut self) -> Self {
        self.kind = None;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// `widget` reports whether a live renderable is cached for this datum.
    pub fn json_safe(&self, widget: bool) -> DataJson {
        DataJson {
            origin: self.origin.clone(),
            group: self.group.clone(),
            uri: self.uri.clone(),
            label: self.label.clone(),
            kind: self.kind.clone(),
            icon: self.icon.clone(),
            widget,
        }
    }
}

impl Entity for Data {
    const KIND: &'static str = "data";
    const REGISTER_EVENT: &'static str = DATA_REGISTER_EVENT;

    fn origin(&self) -> &str {
        &self.origin
    }

    fn key(&self) -> &str {
        &self.uri
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "origin" => Some(self.origin.clone()),
            "group" => Some(self.group.clone()),
            "uri" => Some(self.uri.clone()),
            "label" => Some(self.label.clone()),
            "kind" => self.kind.clone(),
            "icon" => self.icon.clone(),
            _ => None,
        }
    }

    fn event_payload(&self) -> Value {
        json!({
            "origin": self.origin,
            "group": self.group,
            "id": self.uri,
        })
    }
}

/// Data metadata as sent to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataJson {
    pub origin: String,
    pub group: String,
    pub uri: String,
    pub label: String,
    pub kind: Option<String>,
    pub icon: Option<String>,
    pub widget: bool,
}

fn is_url(uri: &str) -> bool {
    ["http://", "https://", "ftp://", "ftps://"]
        .iter()
        .any(|scheme| uri.starts_with(scheme))
}

/// Last path segment for URLs, the uri itself otherwise.
fn file_name(uri: &str) -> &str {
    if is_url(uri) {
        uri.rsplit('/').next().unwrap_or(uri)
    } else {
        uri
    }
}

/// Extension of the file name, if it has one.
fn file_type(uri: &str) -> Option<&str> {
    let name = uri.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(uri);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Filter;

    #[test]
    fn label_and_kind_from_url() {
        let data = Data::new("GenePattern", "Job 12", "https://example.org/jobs/12/all_aml.gct");
        assert_eq!(data.label, "all_aml.gct");
        assert_eq!(data.kind.as_deref(), Some("gct"));
    }

    #[test]
    fn local_path_keeps_full_label() {
        let data = Data::new("demo", "Step 1", "results/out.txt");
        assert_eq!(data.label, "results/out.txt");
        assert_eq!(data.kind.as_deref(), Some("txt"));
    }

    #[test]
    fn no_extension_means_no_kind() {
        let data = Data::new("demo", "Step 1", "https://example.org/download");
        assert_eq!(data.kind, None);
        assert!(!Filter::new().kinds(["txt"]).matches(&data));
    }

    #[test]
    fn explicit_fields_override_derived_ones() {
        let data = Data::from_value(json!({
            "origin": "demo",
            "group": "Step 1",
            "uri": "out.txt",
            "label": "Output",
            "kind": "text",
        }))
        .unwrap();
        assert_eq!(data.label, "Output");
        assert_eq!(data.kind.as_deref(), Some("text"));
    }

    #[test]
    fn filter_by_kind_and_kinds() {
        let html = Data::new("demo", "g", "a.html");
        let pdf = Data::new("demo", "g", "b.pdf");
        let bare = Data::new("demo", "g", "c").without_kind();

        let by_kind = Filter::new().kind("html");
        assert!(by_kind.matches(&html));
        assert!(!by_kind.matches(&pdf));
        assert!(!by_kind.matches(&bare));

        let by_kinds = Filter::new().kinds(["html", "pdf"]);
        assert!(by_kinds.matches(&html));
        assert!(by_kinds.matches(&pdf));
        assert!(!by_kinds.matches(&bare));
    }
}
