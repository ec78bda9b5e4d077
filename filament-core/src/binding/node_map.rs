//! Node Maps
//!
//! Discovery output for one static markup node: its attributes, the bound
//! expressions found in them (or in its text), the hosted control and any
//! attribute controls. A node map is computed once and shared by `Arc`
//! between the compiled manager and every clone stamped from it.
//!
//! Discovery never fails. A malformed binding or selector is logged as a
//! warning and treated as absent.

use std::sync::Arc;

use indexmap::IndexMap;

use super::control::{ControlDescriptor, ControlKind};
use super::environment::Environment;
use super::expression::{ContextSelector, Interpolation};
use crate::dom::{NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    Attribute(String),
    Text,
}

/// One bound attribute value or text node.
#[derive(Debug, Clone)]
pub struct Binding {
    pub target: BindingTarget,
    pub interpolation: Interpolation,
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    attributes: IndexMap<String, String>,
    bindings: Vec<Binding>,
    host: Option<Arc<ControlDescriptor>>,
    context_selector: Option<ContextSelector>,
    attribute_controls: Vec<Arc<ControlDescriptor>>,
}

impl NodeMap {
    /// Discover `node` as it currently is in the environment's document.
    pub fn discover(env: &Environment, node: NodeId) -> Self {
        let document = env.document();
        match document.kind(node) {
            Ok(NodeKind::Element { tag, attributes }) => Self::discover_element(env, &tag, attributes),
            Ok(NodeKind::Text(text)) => Self::discover_text(env, &text),
            _ => Self::default(),
        }
    }

    fn discover_text(env: &Environment, text: &str) -> Self {
        let mut map = Self::default();
        match Interpolation::parse(text, &env.config().interpolation) {
            Ok(Some(interpolation)) => map.bindings.push(Binding {
                target: BindingTarget::Text,
                identifiers: interpolation.identifiers(),
                interpolation,
            }),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, text, "ignoring malformed text binding"),
        }
        map
    }

    fn discover_element(env: &Environment, tag: &str, attributes: IndexMap<String, String>) -> Self {
        let config = env.config();
        let controls = env.controls();

        let host = match attributes.get(&config.control_attribute) {
            Some(name) => {
                let descriptor = controls.descriptor(name);
                if descriptor.is_none() {
                    tracing::warn!(control = %name, tag, "no control registered under declared name");
                }
                descriptor
            }
            None => controls.descriptor(tag),
        }
        .filter(|d| d.kind == ControlKind::Element);

        let mut attribute_controls = Vec::new();
        let mut bindings = Vec::new();
        let mut context_selector = None;

        for (name, value) in &attributes {
            if name == &config.control_attribute {
                continue;
            }
            if name == &config.context_attribute {
                match ContextSelector::relative(value, &config.interpolation, &config.context_key) {
                    Ok(selector) => context_selector = Some(selector),
                    Err(err) => tracing::warn!(error = %err, attribute = %name, "ignoring malformed context selector"),
                }
                continue;
            }
            if name == &config.context_source_attribute {
                match ContextSelector::alias(value, &config.interpolation) {
                    Ok(selector) => context_selector = Some(selector),
                    Err(err) => tracing::warn!(error = %err, attribute = %name, "ignoring malformed context source"),
                }
                continue;
            }

            if let Some(descriptor) = controls
                .descriptor(name)
                .filter(|d| d.kind == ControlKind::Attribute)
            {
                attribute_controls.push(descriptor);
            }

            match Interpolation::parse(value, &config.interpolation) {
                Ok(Some(interpolation)) => bindings.push(Binding {
                    target: BindingTarget::Attribute(name.clone()),
                    identifiers: interpolation.identifiers(),
                    interpolation,
                }),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, attribute = %name, "ignoring malformed binding"),
            }
        }

        // stable: equal priorities keep discovery order
        attribute_controls.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self {
            attributes,
            bindings,
            host,
            context_selector,
            attribute_controls,
        }
    }

    /// A copy of this map with a different context selector. Used to stamp
    /// clones that each look at their own slice of the context.
    pub fn with_context_selector(&self, selector: Option<ContextSelector>) -> Arc<Self> {
        Arc::new(Self {
            context_selector: selector,
            ..self.clone()
        })
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn host(&self) -> Option<&Arc<ControlDescriptor>> {
        self.host.as_ref()
    }

    pub fn context_selector(&self) -> Option<&ContextSelector> {
        self.context_selector.as_ref()
    }

    /// Attribute controls, highest priority first.
    pub fn attribute_controls(&self) -> &[Arc<ControlDescriptor>] {
        &self.attribute_controls
    }

    /// Nothing to bind on this node itself. Inert managers still take part
    /// in traversal.
    pub fn is_inert(&self) -> bool {
        self.host.is_none()
            && self.attribute_controls.is_empty()
            && self.context_selector.is_none()
            && self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::control::{Control, ControlBase, ControlRegistry};
    use crate::binding::template::MemoryTemplates;
    use crate::config::Config;
    use crate::context::{ContextOwner, Object, OwnerId};
    use crate::dom::{Document, NodeSpec};

    struct Inert(ControlBase);

    impl ContextOwner for Inert {
        fn uid(&self) -> OwnerId {
            self.0.uid()
        }

        fn scope(&self) -> &Object {
            self.0.scope()
        }
    }

    impl Control for Inert {}

    fn environment(document: &Document) -> Arc<Environment> {
        let controls = ControlRegistry::new();
        let inert = || Arc::new(Inert(ControlBase::new())) as Arc<dyn Control>;
        controls.register(ControlDescriptor::element("card"), inert);
        controls.register(ControlDescriptor::attribute("focus").priority(1), inert);
        controls.register(ControlDescriptor::attribute("select").priority(5), inert);
        controls.register(ControlDescriptor::attribute("track").priority(1), inert);
        Environment::new(
            Config::default(),
            document.clone(),
            Arc::new(controls),
            Arc::new(MemoryTemplates::new()),
        )
    }

    #[test]
    fn element_discovery() {
        let document = Document::new();
        let env = environment(&document);
        let node = document.build(
            &NodeSpec::element("div")
                .attr("control", "card")
                .attr("context", "{{context.user}}")
                .attr("title", "Hi {{context.name}}")
                .attr("track", "")
                .attr("focus", "{{ready}}")
                .attr("select", "all")
                .attr("class", "plain"),
        );

        let map = NodeMap::discover(&env, node);
        assert_eq!(map.host().map(|h| h.name.as_str()), Some("card"));
        assert_eq!(
            map.context_selector(),
            Some(&ContextSelector::Relative("user".into()))
        );

        let order: Vec<_> = map.attribute_controls().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["select", "track", "focus"]);

        let targets: Vec<_> = map.bindings().iter().map(|b| b.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                BindingTarget::Attribute("title".into()),
                BindingTarget::Attribute("focus".into())
            ]
        );
        assert_eq!(map.bindings()[0].identifiers, vec!["context.name".to_string()]);
        assert_eq!(map.attributes().len(), 7);
        assert!(!map.is_inert());
    }

    #[test]
    fn tag_registration_and_text() {
        let document = Document::new();
        let env = environment(&document);
        let card = document.build(&NodeSpec::element("card"));
        assert_eq!(
            NodeMap::discover(&env, card).host().map(|h| h.name.as_str()),
            Some("card")
        );

        // attribute controls never host
        let focus = document.build(&NodeSpec::element("focus"));
        assert!(NodeMap::discover(&env, focus).host().is_none());

        let text = document.create_text("{{context.count}} items");
        let map = NodeMap::discover(&env, text);
        assert_eq!(map.bindings().len(), 1);
        assert_eq!(map.bindings()[0].target, BindingTarget::Text);

        let plain = document.create_text("static");
        assert!(NodeMap::discover(&env, plain).is_inert());
    }

    #[test]
    fn malformed_attributes_are_dropped() {
        let document = Document::new();
        let env = environment(&document);
        let node = document.build(
            &NodeSpec::element("p")
                .attr("context", "{{a}} {{b}}")
                .attr("title", "{{ broken")
                .attr("control", "missing"),
        );

        let map = NodeMap::discover(&env, node);
        assert!(map.host().is_none());
        assert!(map.context_selector().is_none());
        assert!(map.bindings().is_empty());
        assert!(map.is_inert());
    }

    #[test]
    fn selector_override_shares_the_rest() {
        let document = Document::new();
        let env = environment(&document);
        let node = document.build(&NodeSpec::element("li").attr("title", "{{context.v}}"));
        let map = NodeMap::discover(&env, node);

        let item = map.with_context_selector(Some(ContextSelector::Relative("2".into())));
        assert_eq!(item.context_selector(), Some(&ContextSelector::Relative("2".into())));
        assert_eq!(item.bindings().len(), 1);
        assert!(map.context_selector().is_none());
    }
}
