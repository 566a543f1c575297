pub mod comm;
pub mod config;
pub mod data;
pub mod entity;
pub mod error;
pub mod tool;
pub mod widget;

pub use data::{Data, DataJson, DataSpec};
pub use entity::{Entity, Filter};
pub use error::{LoadError, NbError, NbResult};
pub use tool::{LoadArgs, LoadFn, Tool, ToolJson, ToolSpec};
pub use widget::{Widget, WidgetKind};
