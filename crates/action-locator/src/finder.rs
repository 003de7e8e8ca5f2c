//! Finder - declarative description of accessibility-tree nodes
//!
//! A finder is a conjunction of predicates, optionally scoped to the subtree
//! of another finder's match and narrowed by an ordinal. Finders are plain
//! values: building one never touches the tree.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::LocatorError;

/// Node states a finder can constrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFlag {
    Focused,
    Focusable,
    Offscreen,
    Invisible,
    Editable,
    Collapsed,
    Expanded,
    Selected,
}

impl StateFlag {
    /// Key of the flag in a node's state map.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFlag::Focused => "focused",
            StateFlag::Focusable => "focusable",
            StateFlag::Offscreen => "offscreen",
            StateFlag::Invisible => "invisible",
            StateFlag::Editable => "editable",
            StateFlag::Collapsed => "collapsed",
            StateFlag::Expanded => "expanded",
            StateFlag::Selected => "selected",
        }
    }
}

/// Checked state of toggles and checkboxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checked {
    True,
    False,
    Mixed,
}

impl Checked {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checked::True => "true",
            Checked::False => "false",
            Checked::Mixed => "mixed",
        }
    }
}

/// How a node's accessible name is matched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NameMatch {
    Exact(String),
    Prefix(String),
    Contains(String),
    /// A regular expression; a leading `(?i)` makes it case-insensitive.
    Regex(String),
}

impl NameMatch {
    /// Pattern and flags for the query side, with `(?i)` lifted into a flag.
    pub(crate) fn regex_parts(pattern: &str) -> (&str, &'static str) {
        match pattern.strip_prefix("(?i)") {
            Some(rest) => (rest, "i"),
            None => (pattern, ""),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    Role(String),
    ClassName(String),
    Name(NameMatch),
    Attribute { key: String, value: String },
    State { flag: StateFlag, value: bool },
    Checked(Checked),
    /// The node has a descendant matching the inner finder's predicates.
    AncestorOf(Box<Finder>),
}

impl Predicate {
    fn pretty(&self) -> String {
        match self {
            Predicate::Role(role) => format!("role: {}", role),
            Predicate::ClassName(class) => format!("className: {:?}", class),
            Predicate::Name(NameMatch::Exact(name)) => format!("name: {:?}", name),
            Predicate::Name(NameMatch::Prefix(prefix)) => format!("name starts with: {:?}", prefix),
            Predicate::Name(NameMatch::Contains(part)) => format!("name contains: {:?}", part),
            Predicate::Name(NameMatch::Regex(pattern)) => {
                let (pattern, flags) = NameMatch::regex_parts(pattern);
                format!("name: /{}/{}", pattern, flags)
            }
            Predicate::Attribute { key, value } => format!("attribute: {{{}: {:?}}}", key, value),
            Predicate::State { flag, value } => format!("state: {{{}: {}}}", flag.as_str(), value),
            Predicate::Checked(checked) => format!("checked: {}", checked.as_str()),
            Predicate::AncestorOf(inner) => format!("ancestor of {}", inner.pretty()),
        }
    }
}

/// Which of several matches a finder selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ordinal {
    Nth(usize),
    Last,
}

/// Description of one node (or a set of nodes) in the accessibility tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FinderSpec", into = "FinderSpec")]
pub struct Finder {
    predicates: Vec<Predicate>,
    within: Option<Box<Finder>>,
    ordinal: Option<Ordinal>,
    label: Option<String>,
}

impl Finder {
    /// A finder matching every node.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(self, role: impl Into<String>) -> Self {
        self.with(Predicate::Role(role.into()))
    }

    pub fn class_name(self, class: impl Into<String>) -> Self {
        self.with(Predicate::ClassName(class.into()))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.with(Predicate::Name(NameMatch::Exact(name.into())))
    }

    pub fn name_prefix(self, prefix: impl Into<String>) -> Self {
        self.with(Predicate::Name(NameMatch::Prefix(prefix.into())))
    }

    pub fn name_containing(self, part: impl Into<String>) -> Self {
        self.with(Predicate::Name(NameMatch::Contains(part.into())))
    }

    pub fn name_regex(self, pattern: impl Into<String>) -> Self {
        self.with(Predicate::Name(NameMatch::Regex(pattern.into())))
    }

    pub fn attribute(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(Predicate::Attribute {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn state(self, flag: StateFlag, value: bool) -> Self {
        self.with(Predicate::State { flag, value })
    }

    pub fn focused(self) -> Self {
        self.state(StateFlag::Focused, true)
    }

    pub fn focusable(self) -> Self {
        self.state(StateFlag::Focusable, true)
    }

    pub fn onscreen(self) -> Self {
        self.state(StateFlag::Offscreen, false)
    }

    pub fn visible(self) -> Self {
        self.state(StateFlag::Invisible, false)
    }

    pub fn checked(self, checked: Checked) -> Self {
        self.with(Predicate::Checked(checked))
    }

    /// Matches nodes that contain a node matching `descendant`.
    ///
    /// Only the predicates of `descendant` are used; its scope and ordinal
    /// are ignored.
    pub fn ancestor_of(self, descendant: Finder) -> Self {
        self.with(Predicate::AncestorOf(Box::new(descendant)))
    }

    /// Restricts the search to the subtree of the single node `ancestor` matches.
    pub fn descendant_of(mut self, ancestor: Finder) -> Self {
        self.within = Some(Box::new(ancestor));
        self
    }

    pub fn nth(mut self, n: usize) -> Self {
        self.ordinal = Some(Ordinal::Nth(n));
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    pub fn last(mut self) -> Self {
        self.ordinal = Some(Ordinal::Last);
        self
    }

    /// Human-readable name shown in logs and errors ahead of the predicates.
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Conjunction of two finders. Scope, ordinal and label of `self` win.
    pub fn and(mut self, other: Finder) -> Self {
        self.predicates.extend(other.predicates);
        if self.within.is_none() {
            self.within = other.within;
        }
        if self.ordinal.is_none() {
            self.ordinal = other.ordinal;
        }
        if self.label.is_none() {
            self.label = other.label;
        }
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn within(&self) -> Option<&Finder> {
        self.within.as_deref()
    }

    pub fn ordinal(&self) -> Option<Ordinal> {
        self.ordinal
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Checks every name pattern, including nested finders.
    pub fn validate(&self) -> Result<(), LocatorError> {
        for predicate in &self.predicates {
            match predicate {
                Predicate::Name(NameMatch::Regex(pattern)) => {
                    Regex::new(pattern).map_err(|err| {
                        LocatorError::InvalidFinder(format!("name pattern {:?}: {}", pattern, err))
                    })?;
                }
                Predicate::Role(role) if role.is_empty() => {
                    return Err(LocatorError::InvalidFinder("empty role".to_string()));
                }
                Predicate::AncestorOf(inner) => inner.validate()?,
                _ => {}
            }
        }
        match &self.within {
            Some(within) => within.validate(),
            None => Ok(()),
        }
    }

    /// Canonical one-line rendering used in errors and logs.
    pub fn pretty(&self) -> String {
        let mut parts: Vec<String> = self.predicates.iter().map(Predicate::pretty).collect();
        if let Some(within) = &self.within {
            parts.push(format!("within: {}", within.pretty()));
        }
        match self.ordinal {
            Some(Ordinal::Nth(0)) => parts.push("first".to_string()),
            Some(Ordinal::Nth(n)) => parts.push(format!("nth: {}", n)),
            Some(Ordinal::Last) => parts.push("last".to_string()),
            None => {}
        }
        let body = format!("{{{}}}", parts.join(", "));
        match &self.label {
            Some(label) => format!("{} {}", label, body),
            None => body,
        }
    }

    fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }
}

impl fmt::Display for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}

/// Flat serialized form used in scenario descriptors.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FinderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_regex: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    state: BTreeMap<StateFlag, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checked: Option<CheckedSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ancestor_of: Option<Box<FinderSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    within: Option<Box<FinderSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nth: Option<usize>,
    #[serde(default, skip_serializing_if = "is_false")]
    first: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    /// Predicates that do not fit the flat fields above, e.g. two name patterns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    and: Vec<FinderSpec>,
}

/// `checked: true` reads better in YAML than `checked: "true"`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CheckedSpec {
    Bool(bool),
    Named(Checked),
}

impl From<CheckedSpec> for Checked {
    fn from(spec: CheckedSpec) -> Self {
        match spec {
            CheckedSpec::Bool(true) => Checked::True,
            CheckedSpec::Bool(false) => Checked::False,
            CheckedSpec::Named(checked) => checked,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl From<FinderSpec> for Finder {
    fn from(spec: FinderSpec) -> Self {
        let mut finder = Finder::new();
        if let Some(role) = spec.role {
            finder = finder.role(role);
        }
        if let Some(class) = spec.class_name {
            finder = finder.class_name(class);
        }
        if let Some(name) = spec.name {
            finder = finder.name(name);
        }
        if let Some(prefix) = spec.name_prefix {
            finder = finder.name_prefix(prefix);
        }
        if let Some(part) = spec.name_contains {
            finder = finder.name_containing(part);
        }
        if let Some(pattern) = spec.name_regex {
            finder = finder.name_regex(pattern);
        }
        for (key, value) in spec.attributes {
            finder = finder.attribute(key, value);
        }
        for (flag, value) in spec.state {
            finder = finder.state(flag, value);
        }
        if let Some(checked) = spec.checked {
            finder = finder.checked(checked.into());
        }
        if let Some(inner) = spec.ancestor_of {
            finder = finder.ancestor_of(Finder::from(*inner));
        }
        for extra in spec.and {
            finder.predicates.extend(Finder::from(extra).predicates);
        }
        finder.within = spec.within.map(|within| Box::new(Finder::from(*within)));
        finder.ordinal = if spec.last {
            Some(Ordinal::Last)
        } else if let Some(n) = spec.nth {
            Some(Ordinal::Nth(n))
        } else if spec.first {
            Some(Ordinal::Nth(0))
        } else {
            None
        };
        finder.label = spec.label;
        finder
    }
}

impl From<Finder> for FinderSpec {
    fn from(finder: Finder) -> Self {
        let mut spec = FinderSpec::default();
        for predicate in finder.predicates {
            let overflow = match predicate {
                Predicate::Role(role) => fill(&mut spec.role, role).map(Predicate::Role),
                Predicate::ClassName(class) => {
                    fill(&mut spec.class_name, class).map(Predicate::ClassName)
                }
                Predicate::Name(NameMatch::Exact(name)) => fill(&mut spec.name, name)
                    .map(|name| Predicate::Name(NameMatch::Exact(name))),
                Predicate::Name(NameMatch::Prefix(prefix)) => fill(&mut spec.name_prefix, prefix)
                    .map(|prefix| Predicate::Name(NameMatch::Prefix(prefix))),
                Predicate::Name(NameMatch::Contains(part)) => fill(&mut spec.name_contains, part)
                    .map(|part| Predicate::Name(NameMatch::Contains(part))),
                Predicate::Name(NameMatch::Regex(pattern)) => fill(&mut spec.name_regex, pattern)
                    .map(|pattern| Predicate::Name(NameMatch::Regex(pattern))),
                Predicate::Attribute { key, value } => {
                    if spec.attributes.contains_key(&key) {
                        Some(Predicate::Attribute { key, value })
                    } else {
                        spec.attributes.insert(key, value);
                        None
                    }
                }
                Predicate::State { flag, value } => {
                    if spec.state.contains_key(&flag) {
                        Some(Predicate::State { flag, value })
                    } else {
                        spec.state.insert(flag, value);
                        None
                    }
                }
                Predicate::Checked(checked) => {
                    if spec.checked.is_some() {
                        Some(Predicate::Checked(checked))
                    } else {
                        spec.checked = Some(CheckedSpec::Named(checked));
                        None
                    }
                }
                Predicate::AncestorOf(inner) => {
                    if spec.ancestor_of.is_some() {
                        Some(Predicate::AncestorOf(inner))
                    } else {
                        spec.ancestor_of = Some(Box::new(FinderSpec::from(*inner)));
                        None
                    }
                }
            };
            if let Some(predicate) = overflow {
                let single = Finder {
                    predicates: vec![predicate],
                    ..Finder::default()
                };
                spec.and.push(FinderSpec::from(single));
            }
        }
        spec.within = finder.within.map(|within| Box::new(FinderSpec::from(*within)));
        match finder.ordinal {
            Some(Ordinal::Nth(0)) => spec.first = true,
            Some(Ordinal::Nth(n)) => spec.nth = Some(n),
            Some(Ordinal::Last) => spec.last = true,
            None => {}
        }
        spec.label = finder.label;
        spec
    }
}

/// Stores `value` in an empty slot, or hands it back when the slot is taken.
fn fill(slot: &mut Option<String>, value: String) -> Option<String> {
    if slot.is_some() {
        Some(value)
    } else {
        *slot = Some(value);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pretty_lists_predicates_in_order() {
        let launcher = Finder::new().class_name("AppListView");
        let finder = Finder::new()
            .role("button")
            .name("Settings")
            .focused()
            .descendant_of(launcher)
            .first();
        assert_eq!(
            finder.pretty(),
            r#"{role: button, name: "Settings", state: {focused: true}, within: {className: "AppListView"}, first}"#
        );
        assert_eq!(finder.to_string(), finder.pretty());
    }

    #[test]
    fn label_prefixes_pretty_form() {
        let finder = Finder::new().name_regex("(?i)^chrome").labelled("browser icon");
        assert_eq!(finder.pretty(), "browser icon {name: /^chrome/i}");
    }

    #[test]
    fn literal_name_matches_are_quoted() {
        let finder = Finder::new().name_prefix("v1.2 (beta").name_containing("a.b*");
        assert_eq!(
            finder.pretty(),
            r#"{name starts with: "v1.2 (beta", name contains: "a.b*"}"#
        );
    }

    #[test]
    fn and_is_conjunction() {
        let a = Finder::new().role("button").nth(2);
        let b = Finder::new().name_prefix("Close").last().labelled("close");
        let both = a.and(b);
        assert_eq!(both.predicates().len(), 2);
        assert_eq!(both.ordinal(), Some(Ordinal::Nth(2)));
        assert_eq!(both.label(), Some("close"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Finder::new().name_regex("([a-z").validate().unwrap_err();
        assert!(matches!(err, LocatorError::InvalidFinder(_)));

        let nested = Finder::new().descendant_of(Finder::new().name_regex("*oops"));
        assert!(nested.validate().is_err());
        assert!(Finder::new().name_regex("^Files$").validate().is_ok());
    }

    #[test]
    fn reads_descriptor_yaml() {
        let yaml = r#"
role: button
name_prefix: "Chrome"
state:
  focusable: true
checked: false
within:
  class_name: Shelf
last: true
"#;
        let finder: Finder = serde_yaml::from_str(yaml).unwrap();
        let expected = Finder::new()
            .role("button")
            .name_prefix("Chrome")
            .focusable()
            .checked(Checked::False)
            .descendant_of(Finder::new().class_name("Shelf"))
            .last();
        assert_eq!(finder, expected);
    }

    #[test]
    fn repeated_predicates_survive_serialization() {
        let finder = Finder::new()
            .name_containing("Wi")
            .attribute("data-id", "net")
            .name_containing("Fi");
        let json = serde_json::to_value(&finder).unwrap();
        assert_eq!(json["name_contains"], "Wi");
        assert_eq!(json["and"][0]["name_contains"], "Fi");
        let back: Finder = serde_json::from_value(json).unwrap();
        assert_eq!(back, finder);
    }

    #[test]
    fn unknown_fields_are_errors() {
        let res: Result<Finder, _> = serde_yaml::from_str("rol: button");
        assert!(res.is_err());
    }
}
