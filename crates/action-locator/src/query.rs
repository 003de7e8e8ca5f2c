//! Compiles finders into accessibility-tree query expressions
//!
//! Every query walks the desktop tree in pre-order (the root itself is never
//! a candidate), so "first" is the first match in document order. Scopes are
//! resolved outermost first and each must resolve to exactly one node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::LocatorError;
use crate::finder::{Finder, NameMatch, Ordinal, Predicate, StateFlag};

/// Node methods a query can invoke on its match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    DoDefault,
    Focus,
    MakeVisible,
}

impl NodeAction {
    pub fn method(&self) -> &'static str {
        match self {
            NodeAction::DoDefault => "doDefault",
            NodeAction::Focus => "focus",
            NodeAction::MakeVisible => "makeVisible",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryMode {
    /// Info of exactly one node; throws on zero or several matches.
    Single,
    /// Info of every match.
    All,
    /// Number of matches.
    Count,
    Invoke(NodeAction),
}

const PRELUDE: &str = r#"
const uaseDesktop = () => new Promise((resolve) => chrome.automation.getDesktop(resolve));
const uaseCollect = (root, pred) => {
  const out = [];
  const walk = (n) => {
    for (const c of n.children || []) {
      if (pred(c)) out.push(c);
      walk(c);
    }
  };
  walk(root);
  return out;
};
const uaseResolve = (nodes, ordinal, props) => {
  if (ordinal === null) {
    if (nodes.length === 0) throw new Error("failed to find node with properties: " + props);
    if (nodes.length > 1) throw new Error("multiple nodes matched, if you expect this and only want the first use first(): " + props);
    return nodes[0];
  }
  const idx = ordinal < 0 ? nodes.length + ordinal : ordinal;
  if (idx < 0 || idx >= nodes.length) throw new Error("failed to find node with properties: " + props);
  return nodes[idx];
};
const uaseInfo = (n) => ({
  role: n.role || "",
  name: n.name || "",
  className: n.className || "",
  value: n.value || "",
  location: n.location ? {
    left: Math.round(n.location.left),
    top: Math.round(n.location.top),
    width: Math.round(n.location.width),
    height: Math.round(n.location.height),
  } : null,
  state: n.state || {},
  checked: n.checked || null,
  selected: !!n.selected,
  htmlAttributes: n.htmlAttributes || {},
  url: n.url || null,
  childCount: (n.children || []).length,
  parentCount: n.parent ? 1 : 0,
});
"#;

/// Builds the expression answering `mode` for `finder`.
pub fn compile(finder: &Finder, mode: QueryMode) -> Result<String, LocatorError> {
    finder.validate()?;

    let mut scopes = Vec::new();
    let mut cur = finder.within();
    while let Some(scope) = cur {
        scopes.push(scope);
        cur = scope.within();
    }

    let mut body = String::from("let scope = await uaseDesktop();\n");
    for scope in scopes.iter().rev() {
        body.push_str(&format!(
            "scope = uaseResolve(uaseCollect(scope, {}), {}, {});\n",
            predicate_fn(scope),
            ordinal_literal(scope.ordinal()),
            js_string(&scope.pretty()),
        ));
    }
    body.push_str(&format!(
        "const nodes = uaseCollect(scope, {});\n",
        predicate_fn(finder)
    ));

    let resolve = format!(
        "uaseResolve(nodes, {}, {})",
        ordinal_literal(finder.ordinal()),
        js_string(&finder.pretty())
    );
    let tail = match mode {
        QueryMode::Single => format!("return uaseInfo({});", resolve),
        QueryMode::All => "return nodes.map(uaseInfo);".to_string(),
        QueryMode::Count => "return nodes.length;".to_string(),
        QueryMode::Invoke(action) => format!(
            "const node = {};\nnode.{}();\nreturn true;",
            resolve,
            action.method()
        ),
    };

    Ok(format!("(async () => {{{}{}{}\n}})()", PRELUDE, body, tail))
}

fn predicate_fn(finder: &Finder) -> String {
    let conditions: Vec<String> = finder.predicates().iter().map(condition).collect();
    if conditions.is_empty() {
        "(n) => true".to_string()
    } else {
        format!("(n) => {}", conditions.join(" && "))
    }
}

fn condition(predicate: &Predicate) -> String {
    match predicate {
        Predicate::Role(role) => format!("n.role === {}", js_string(role)),
        Predicate::ClassName(class) => format!("n.className === {}", js_string(class)),
        Predicate::Name(NameMatch::Exact(name)) => format!("n.name === {}", js_string(name)),
        Predicate::Name(NameMatch::Prefix(prefix)) => {
            format!("(n.name || \"\").startsWith({})", js_string(prefix))
        }
        Predicate::Name(NameMatch::Contains(part)) => {
            format!("(n.name || \"\").includes({})", js_string(part))
        }
        Predicate::Name(NameMatch::Regex(pattern)) => {
            let (pattern, flags) = NameMatch::regex_parts(pattern);
            format!(
                "new RegExp({}, {}).test(n.name || \"\")",
                js_string(pattern),
                js_string(flags)
            )
        }
        Predicate::Attribute { key, value } => format!(
            "(n.htmlAttributes || {{}})[{}] === {}",
            js_string(key),
            js_string(value)
        ),
        Predicate::State {
            flag: StateFlag::Selected,
            value,
        } => format!("!!n.selected === {}", value),
        Predicate::State { flag, value } => format!(
            "!!(n.state || {{}})[{}] === {}",
            js_string(flag.as_str()),
            value
        ),
        Predicate::Checked(checked) => format!("n.checked === {}", js_string(checked.as_str())),
        Predicate::AncestorOf(inner) => {
            format!("uaseCollect(n, {}).length > 0", predicate_fn(inner))
        }
    }
}

fn ordinal_literal(ordinal: Option<Ordinal>) -> String {
    match ordinal {
        None => "null".to_string(),
        Some(Ordinal::Nth(n)) => n.to_string(),
        Some(Ordinal::Last) => "-1".to_string(),
    }
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
