//! Node info snapshots returned by queries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uase_core_types::Rect;

use crate::errors::LocatorError;
use crate::finder::{Checked, StateFlag};

/// Attributes of one node at the time it was queried.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub value: String,
    /// Screen bounds; absent for nodes without a location.
    #[serde(default)]
    pub location: Option<Rect>,
    #[serde(default)]
    pub state: BTreeMap<String, bool>,
    #[serde(default)]
    pub checked: Option<Checked>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub html_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub child_count: usize,
    #[serde(default)]
    pub parent_count: usize,
}

impl NodeSnapshot {
    pub fn decode(value: Value) -> Result<Self, LocatorError> {
        serde_json::from_value(value).map_err(|err| LocatorError::Decode(err.to_string()))
    }

    pub fn decode_all(value: Value) -> Result<Vec<Self>, LocatorError> {
        serde_json::from_value(value).map_err(|err| LocatorError::Decode(err.to_string()))
    }

    /// Bounds, or an empty rect when the node has no location.
    pub fn bounds(&self) -> Rect {
        self.location.unwrap_or_default()
    }

    pub fn has_state(&self, flag: StateFlag) -> bool {
        match flag {
            StateFlag::Selected => self.selected,
            _ => self.state.get(flag.as_str()).copied().unwrap_or(false),
        }
    }

    pub fn is_focused(&self) -> bool {
        self.has_state(StateFlag::Focused)
    }

    pub fn is_offscreen(&self) -> bool {
        self.has_state(StateFlag::Offscreen)
    }

    pub fn is_invisible(&self) -> bool {
        self.has_state(StateFlag::Invisible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_query_output() {
        let value = json!({
            "role": "button",
            "name": "Launcher",
            "className": "HomeButton",
            "value": "",
            "location": {"left": 10, "top": 700, "width": 48, "height": 48},
            "state": {"focusable": true, "offscreen": false},
            "checked": null,
            "selected": false,
            "htmlAttributes": {},
            "url": null,
            "childCount": 0,
            "parentCount": 1
        });
        let node = NodeSnapshot::decode(value).unwrap();
        assert_eq!(node.class_name, "HomeButton");
        assert_eq!(node.bounds(), Rect::new(10, 700, 48, 48));
        assert!(node.has_state(StateFlag::Focusable));
        assert!(!node.is_offscreen());
        assert!(!node.is_focused());
    }

    #[test]
    fn missing_location_is_empty() {
        let node = NodeSnapshot::decode(json!({"role": "window", "checked": "mixed"})).unwrap();
        assert!(node.bounds().is_empty());
        assert_eq!(node.checked, Some(Checked::Mixed));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            NodeSnapshot::decode(json!(42)),
            Err(LocatorError::Decode(_))
        ));
        assert_eq!(NodeSnapshot::decode_all(json!([])).unwrap(), vec![]);
    }
}
