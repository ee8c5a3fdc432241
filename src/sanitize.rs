use std::collections::BTreeMap;

use crate::node::{
    Comment, Doctype, Element, Node, PropertyValue, Root, Scalar, Text, Unknown,
};
use crate::rules::{CompiledRule, CompiledRules};
use crate::Result;
use crate::schema::Schema;

/// A schema compiled and ready to apply.
///
/// Construction is the only fallible step: the schema is resolved into
/// lookup form once, and [`Sanitizer::sanitize`] is total after that —
/// adversarial input is filtered, never an error.
#[derive(Debug)]
pub struct Sanitizer {
    schema: Schema,
    rules: CompiledRules,
}

/// Decision for one input node.
enum Outcome {
    /// Rebuilt node takes the input node's place.
    Keep(Node),
    /// Node is discarded, its surviving children are spliced in.
    Unwrap(Vec<Node>),
    /// Node and its whole subtree are discarded.
    Drop,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(Schema::default()).expect("default schema carries no patterns to compile")
    }
}

impl Sanitizer {
    pub fn new(schema: Schema) -> Result<Self> {
        let rules = CompiledRules::from_schema(&schema)?;
        Ok(Self { schema, rules })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Sanitize a tree. The input is never mutated or aliased: every
    /// kept node is rebuilt field by field. A kept node is returned
    /// as-is; an unwrapped node returns its single surviving child, or
    /// a `Root` holding the survivors; a rejected tree returns an
    /// empty `Root`.
    pub fn sanitize(&self, node: &Node) -> Node {
        let mut stack = Vec::new();
        match self.one(node, &mut stack) {
            Outcome::Keep(node) => node,
            Outcome::Unwrap(mut children) => {
                if children.len() == 1 {
                    children.swap_remove(0)
                } else {
                    Node::root(children)
                }
            }
            Outcome::Drop => Node::Root(Root::default()),
        }
    }

    fn one(&self, node: &Node, stack: &mut Vec<String>) -> Outcome {
        match node {
            Node::Root(root) => Outcome::Keep(Node::Root(Root {
                children: self.all(&root.children, None, stack),
                data: root.data.clone(),
                position: root.position.clone(),
            })),
            Node::Element(element) => self.element(element, stack),
            Node::Text(text) => Outcome::Keep(Node::Text(Text {
                value: text.value.clone(),
                data: text.data.clone(),
                position: text.position.clone(),
            })),
            Node::Comment(comment) => {
                if !self.schema.allow_comments {
                    return Outcome::Drop;
                }
                Outcome::Keep(Node::Comment(Comment {
                    value: truncate_comment(&comment.value),
                    data: comment.data.clone(),
                    position: comment.position.clone(),
                }))
            }
            Node::Doctype(doctype) => {
                if !self.schema.allow_doctypes {
                    return Outcome::Drop;
                }
                // Only a standards-mode doctype can ever be emitted.
                Outcome::Keep(Node::Doctype(Doctype {
                    name: Some("html".to_string()),
                    data: doctype.data.clone(),
                    position: doctype.position.clone(),
                }))
            }
            Node::Unknown(unknown) => self.unknown(unknown, stack),
        }
    }

    /// Sanitize a children sequence in input order, splicing unwrapped
    /// results into place. `tag` is the enclosing element's raw tag
    /// name; it is pushed onto the ancestor stack even when that tag is
    /// itself disallowed.
    fn all(&self, children: &[Node], tag: Option<&str>, stack: &mut Vec<String>) -> Vec<Node> {
        if let Some(tag) = tag {
            stack.push(tag.to_string());
        }
        let mut results = Vec::new();
        for child in children {
            match self.one(child, stack) {
                Outcome::Keep(node) => results.push(node),
                Outcome::Unwrap(nodes) => results.extend(nodes),
                Outcome::Drop => {}
            }
        }
        if tag.is_some() {
            stack.pop();
        }
        results
    }

    fn element(&self, element: &Element, stack: &mut Vec<String>) -> Outcome {
        let admissible = self.tag_allowed(&element.tag_name, stack);
        let children = self.all(&element.children, Some(&element.tag_name), stack);

        if !admissible {
            if self.rules.strip.contains(&element.tag_name) {
                tracing::trace!(tag = %element.tag_name, "stripping element subtree");
                return Outcome::Drop;
            }
            tracing::trace!(tag = %element.tag_name, "unwrapping disallowed element");
            return Outcome::Unwrap(children);
        }

        Outcome::Keep(Node::Element(Element {
            tag_name: element.tag_name.clone(),
            properties: self.filter_properties(&element.tag_name, &element.properties),
            children,
            data: element.data.clone(),
            position: element.position.clone(),
        }))
    }

    /// An unrecognized node kind is a transparent container: the node
    /// itself is dropped and its sanitized children are spliced into
    /// its place, unless its attempted tag (or kind) is in `strip`.
    fn unknown(&self, unknown: &Unknown, stack: &mut Vec<String>) -> Outcome {
        let Some(children) = &unknown.children else {
            return Outcome::Drop;
        };
        let name = unknown.tag_name.as_deref().unwrap_or(&unknown.kind);
        if self.rules.strip.contains(name) {
            tracing::trace!(kind = %unknown.kind, "stripping unknown node subtree");
            return Outcome::Drop;
        }
        Outcome::Unwrap(self.all(children, unknown.tag_name.as_deref(), stack))
    }

    /// Tag admissibility: never the wildcard or an empty name, must be
    /// allow-listed, and if the schema requires ancestors for this tag,
    /// one of them must be somewhere in the open-ancestor chain.
    fn tag_allowed(&self, name: &str, stack: &[String]) -> bool {
        if name.is_empty() || name == "*" || !self.rules.tag_names.contains(name) {
            return false;
        }
        if let Some(required) = self.rules.ancestors.get(name) {
            return required
                .iter()
                .any(|ancestor| stack.iter().any(|open| open == ancestor));
        }
        true
    }

    fn filter_properties(
        &self,
        tag: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> BTreeMap<String, PropertyValue> {
        let mut result = BTreeMap::new();

        for (name, value) in properties {
            let Some(rule) = self.rules.attribute_rule(tag, name) else {
                continue;
            };
            let kept = match value {
                // List values are filtered per scalar: the kept list
                // may be shorter, possibly empty.
                PropertyValue::List(items) => Some(PropertyValue::List(
                    items
                        .iter()
                        .filter_map(|item| self.filter_scalar(name, item, rule))
                        .collect(),
                )),
                PropertyValue::Scalar(scalar) => self
                    .filter_scalar(name, scalar, rule)
                    .map(PropertyValue::Scalar),
            };
            if let Some(value) = kept {
                result.insert(name.clone(), value);
            }
        }

        // Required defaults go in after filtering, so a filtered-out
        // attribute reappears with the forced value and a forced value
        // is never itself filtered.
        if let Some(required) = self.schema.required.get(tag) {
            for (name, value) in required {
                result
                    .entry(name.clone())
                    .or_insert_with(|| PropertyValue::Scalar(value.clone()));
            }
        }

        result
    }

    fn filter_scalar(&self, name: &str, value: &Scalar, rule: &CompiledRule) -> Option<Scalar> {
        if !self.protocol_allowed(name, value) {
            tracing::trace!(attribute = %name, "dropping value with disallowed protocol");
            return None;
        }
        if let Some(allowed) = &rule.allowed
            && !allowed.iter().any(|matcher| matcher.matches(value))
        {
            return None;
        }
        if self.rules.clobber.contains(name) {
            // Already-prefixed values stay as they are, which keeps
            // sanitization idempotent.
            let text = value.to_string();
            if text.starts_with(&self.schema.clobber_prefix) {
                return Some(Scalar::String(text));
            }
            return Some(Scalar::String(format!(
                "{}{}",
                self.schema.clobber_prefix, text
            )));
        }
        Some(value.clone())
    }

    /// URL scheme check. Values without a colon, or with a `/`, `?` or
    /// `#` before the first colon, are relative references and always
    /// allowed; an explicit scheme must exactly equal a listed one.
    /// This deliberately admits same-document URLs with a colon later
    /// in the path or query (`example.com?x:y`) while rejecting
    /// `javascript:` payloads. Kept as-is; changing it changes
    /// security behavior.
    fn protocol_allowed(&self, name: &str, value: &Scalar) -> bool {
        let Some(protocols) = self.rules.protocols.get(name) else {
            return true;
        };
        if protocols.is_empty() {
            return true;
        }
        let url = value.to_string();
        let Some(colon) = url.find(':') else {
            return true;
        };
        let prefix = &url[..colon];
        if prefix.contains(['/', '?', '#']) {
            return true;
        }
        protocols.iter().any(|scheme| scheme == prefix)
    }
}

fn truncate_comment(value: &str) -> String {
    match value.find("-->") {
        Some(index) => value[..index].to_string(),
        None => value.to_string(),
    }
}

/// Sanitize `node` with the default schema.
pub fn sanitize(node: &Node) -> Node {
    Sanitizer::default().sanitize(node)
}

/// Sanitize `node` with `schema`; fails only if the schema itself is
/// invalid.
pub fn sanitize_with(node: &Node, schema: Schema) -> Result<Node> {
    Ok(Sanitizer::new(schema)?.sanitize(node))
}
