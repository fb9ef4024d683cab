//! Export configuration.

use crate::geometry::{Margins, Orientation, PageGeometry, PageSize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the collector does with a generic container that yields several blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPolicy {
    /// Splice a single result in; drop the container otherwise.
    #[default]
    Splice,
    /// Keep multiple results under a `group` node.
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margins: Margins,
    pub include_title: bool,
    /// Overrides the collected title in the title paragraph and package metadata.
    pub title: Option<String>,
    pub author: Option<String>,
    pub convert_diagrams: bool,
    pub container_policy: ContainerPolicy,
    pub print_completion_timeout_ms: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            orientation: Orientation::default(),
            margins: Margins::default(),
            include_title: false,
            title: None,
            author: None,
            convert_diagrams: true,
            container_policy: ContainerPolicy::default(),
            print_completion_timeout_ms: 2000,
        }
    }
}

impl ExportOptions {
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry::new(self.page_size, self.orientation, self.margins)
    }

    pub fn print_completion_timeout(&self) -> Duration {
        Duration::from_millis(self.print_completion_timeout_ms)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
