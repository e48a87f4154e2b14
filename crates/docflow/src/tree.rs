//! Serialized component trees.
//!
//! This is what the markup compiler hands over and what composites keep
//! for content they have not instantiated yet (map templates, case
//! branches, group children).

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An uninstantiated component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, AttributeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildSpec>,
    /// Initial essential values, by state variable.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub essential: IndexMap<String, Value>,
    /// Names below this component do not leak into enclosing scopes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_namespace: bool,
}

/// A child is either raw text or a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildSpec {
    Text(String),
    Component(ComponentSpec),
}

/// An attribute is either an owned component subtree or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSpec {
    Component(ComponentSpec),
    Literal(Value),
}

impl ComponentSpec {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            essential: IndexMap::new(),
            new_namespace: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeSpec>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<ChildSpec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ChildSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(ChildSpec::Text(text.into()))
    }

    pub fn essential(mut self, variable: impl Into<String>, value: impl Into<Value>) -> Self {
        self.essential.insert(variable.into(), value.into());
        self
    }

    pub fn new_namespace(mut self) -> Self {
        self.new_namespace = true;
        self
    }

    /// `copy` of the component at `source`.
    pub fn copy(source: impl Into<String>) -> Self {
        ComponentSpec::new("copy").attribute("source", Value::text(source.into()))
    }

    /// `copy` of one state variable of the component at `source`.
    pub fn copy_prop(source: impl Into<String>, prop: impl Into<String>) -> Self {
        Self::copy(source).attribute("prop", Value::text(prop.into()))
    }

    /// Applies `f` to this spec and every nested component spec, attributes
    /// included, parents before children.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut ComponentSpec)) {
        f(self);
        for attribute in self.attributes.values_mut() {
            if let AttributeSpec::Component(spec) = attribute {
                spec.visit_mut(f);
            }
        }
        for child in &mut self.children {
            if let ChildSpec::Component(spec) = child {
                spec.visit_mut(f);
            }
        }
    }

    pub fn literal_attribute(&self, name: &str) -> Option<&Value> {
        match self.attributes.get(name)? {
            AttributeSpec::Literal(value) => Some(value),
            AttributeSpec::Component(_) => None,
        }
    }
}

impl From<ComponentSpec> for ChildSpec {
    fn from(spec: ComponentSpec) -> Self {
        ChildSpec::Component(spec)
    }
}

impl From<&str> for ChildSpec {
    fn from(text: &str) -> Self {
        ChildSpec::Text(text.to_owned())
    }
}

impl From<String> for ChildSpec {
    fn from(text: String) -> Self {
        ChildSpec::Text(text)
    }
}

impl From<ComponentSpec> for AttributeSpec {
    fn from(spec: ComponentSpec) -> Self {
        AttributeSpec::Component(spec)
    }
}

impl From<Value> for AttributeSpec {
    fn from(value: Value) -> Self {
        AttributeSpec::Literal(value)
    }
}

impl From<f64> for AttributeSpec {
    fn from(value: f64) -> Self {
        AttributeSpec::Literal(Value::number(value))
    }
}

impl From<i32> for AttributeSpec {
    fn from(value: i32) -> Self {
        AttributeSpec::Literal(Value::from(value))
    }
}

impl From<bool> for AttributeSpec {
    fn from(value: bool) -> Self {
        AttributeSpec::Literal(Value::Bool(value))
    }
}

impl From<&str> for AttributeSpec {
    fn from(value: &str) -> Self {
        AttributeSpec::Literal(Value::from(value))
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_tree() {
        let json = r#"{
            "component_type": "p",
            "name": "p1",
            "attributes": { "hide": { "Bool": false } },
            "children": [
                "Value: ",
                { "component_type": "number", "children": ["3"] }
            ]
        }"#;
        let spec: ComponentSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name.as_deref(), Some("p1"));
        assert_eq!(spec.literal_attribute("hide"), Some(&Value::Bool(false)));
        assert_eq!(spec.children.len(), 2);
        assert!(matches!(&spec.children[1], ChildSpec::Component(c) if c.component_type == "number"));
    }

    #[test]
    fn visit_reaches_attribute_components() {
        let mut spec = ComponentSpec::new("point")
            .attribute("x", ComponentSpec::copy("a"))
            .child(ComponentSpec::copy("b"));
        let mut seen = Vec::new();
        spec.visit_mut(&mut |c| seen.push(c.component_type.clone()));
        assert_eq!(seen, ["point", "copy", "copy"]);
    }
}
