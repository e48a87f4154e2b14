//! Test harness for driving a document without a renderer.
//! Components are addressed by name from the document root.

#![allow(dead_code)]

use docflow::{
    ActionFlags, ActionOutcome, ActionRequest, CellKey, ComponentId, ComponentRegistry,
    ComponentSpec, ComponentType, Desired, Document, EngineConfig, Value,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test wrapper with name-based helpers.
pub struct TestDocument {
    doc: Document,
}

impl TestDocument {
    /// Build a document whose root is a `document` with `children`.
    pub fn new(children: impl IntoIterator<Item = ComponentSpec>) -> Self {
        Self::with_config(children, EngineConfig::default())
    }

    pub fn with_config(children: impl IntoIterator<Item = ComponentSpec>, config: EngineConfig) -> Self {
        Self::build(ComponentRegistry::with_builtins(), children, config)
    }

    /// Build with extra component types registered next to the builtins.
    pub fn with_types(
        types: impl IntoIterator<Item = ComponentType>,
        children: impl IntoIterator<Item = ComponentSpec>,
    ) -> Self {
        Self::with_types_and_config(types, children, EngineConfig::default())
    }

    pub fn with_types_and_config(
        types: impl IntoIterator<Item = ComponentType>,
        children: impl IntoIterator<Item = ComponentSpec>,
        config: EngineConfig,
    ) -> Self {
        let mut registry = ComponentRegistry::with_builtins();
        for ty in types {
            registry.register(ty);
        }
        Self::build(registry, children, config)
    }

    fn build(
        registry: ComponentRegistry,
        children: impl IntoIterator<Item = ComponentSpec>,
        config: EngineConfig,
    ) -> Self {
        init_logging();
        let mut root = ComponentSpec::new("document");
        for child in children {
            root = root.child(child);
        }
        let doc = Document::with_config(registry, &root, config).expect("document builds");
        Self { doc }
    }

    /// Id of the component at `path`, resolved from the root.
    pub fn id(&mut self, path: &str) -> ComponentId {
        let root = self.doc.root();
        self.doc
            .resolve_path_to_id(path, root)
            .unwrap_or_else(|| panic!("path '{path}' does not resolve"))
    }

    pub fn try_id(&mut self, path: &str) -> Option<ComponentId> {
        let root = self.doc.root();
        self.doc.resolve_path_to_id(path, root)
    }

    pub fn read(&mut self, path: &str, variable: &str) -> Value {
        let id = self.id(path);
        self.doc
            .get_value(id, variable)
            .unwrap_or_else(|err| panic!("{path}.{variable}: {err}"))
    }

    /// Assert that a variable of the component at `path` equals `expected`.
    pub fn assert_value(&mut self, path: &str, variable: &str, expected: impl Into<Value>) {
        let expected = expected.into();
        let actual = self.read(path, variable);
        assert_eq!(
            actual, expected,
            "'{path}.{variable}' expected {expected:?} but got {actual:?}"
        );
    }

    /// Run a named action of the component at `path`.
    pub fn action(&mut self, path: &str, action: &str, args: &[(&str, Value)]) -> ActionOutcome {
        let id = self.id(path);
        let mut request = ActionRequest::new(id, action);
        for (name, value) in args {
            request = request.arg(name, value.clone());
        }
        self.doc
            .request_action(request)
            .unwrap_or_else(|err| panic!("{path}.{action} rejected: {err}"))
    }

    /// Ask `path.variable` to take `desired`.
    pub fn set(&mut self, path: &str, variable: &str, desired: impl Into<Desired>) -> ActionOutcome {
        let id = self.id(path);
        self.doc
            .dispatch(CellKey::new(id, variable), desired, ActionFlags::default())
            .unwrap_or_else(|err| panic!("{path}.{variable} rejected: {err}"))
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }
}

pub fn number(text: &str) -> ComponentSpec {
    ComponentSpec::new("number").text(text)
}

pub fn num(value: f64) -> Value {
    Value::Number(value)
}

pub fn numbers(values: &[f64]) -> Value {
    Value::array(values.iter().map(|v| Value::Number(*v)))
}
