use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::Scalar;

/// The allow-list controlling every admissibility decision.
///
/// Every field carries a serde default taken from the GitHub-style
/// default schema, so deserializing a partial document performs a
/// shallow merge: a field present in the document wholly replaces the
/// default, a field absent wholly falls back to it. `Schema::default()`
/// is the full default schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Schema {
    /// Permitted element tags. An empty list rejects every element.
    #[serde(default = "default_tag_names")]
    pub tag_names: Vec<String>,
    /// Attribute rules per tag. The key `*` applies to all tags; the
    /// rule name `data*` matches any attribute with a `data` prefix.
    #[serde(default = "default_attributes")]
    pub attributes: BTreeMap<String, Vec<AttributeRule>>,
    /// Attribute defaults forced onto a tag after filtering.
    #[serde(default = "default_required")]
    pub required: BTreeMap<String, BTreeMap<String, Scalar>>,
    /// Permitted URL schemes per attribute name (lower-case, no colon).
    #[serde(default = "default_protocols")]
    pub protocols: BTreeMap<String, Vec<String>>,
    /// Tags admissible only under at least one of the listed ancestors.
    #[serde(default = "default_ancestors")]
    pub ancestors: BTreeMap<String, Vec<String>>,
    /// Attribute names whose values can shadow global id/name lookups.
    #[serde(default = "default_clobber")]
    pub clobber: Vec<String>,
    /// Prefix prepended to kept clobber-prone attribute values.
    #[serde(default = "default_clobber_prefix")]
    pub clobber_prefix: String,
    /// Tags whose whole subtree is dropped instead of unwrapped when
    /// the tag itself is disallowed.
    #[serde(default = "default_strip")]
    pub strip: Vec<String>,
    #[serde(default)]
    pub allow_comments: bool,
    #[serde(default)]
    pub allow_doctypes: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            tag_names: default_tag_names(),
            attributes: default_attributes(),
            required: default_required(),
            protocols: default_protocols(),
            ancestors: default_ancestors(),
            clobber: default_clobber(),
            clobber_prefix: default_clobber_prefix(),
            strip: default_strip(),
            allow_comments: false,
            allow_doctypes: false,
        }
    }
}

/// One attribute rule: a name plus what values it admits. On the wire
/// this is either a bare name (`"alt"`) or a flat array of the name
/// followed by matchers (`["type", "checkbox"]`,
/// `["className", {"pattern": "^task-"}]`). An array holding only the
/// name behaves like the bare form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRepr", into = "RuleRepr")]
pub struct AttributeRule {
    pub name: String,
    pub allowed: AllowedValues,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AllowedValues {
    /// Any value, once type- and protocol-checked.
    Any,
    /// Each scalar must match at least one listed literal or pattern.
    OneOf(Vec<ValueMatcher>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueMatcher {
    Bool(bool),
    Number(f64),
    Literal(String),
    /// Regular expression tested against the string form of the value.
    Pattern(String),
}

impl AttributeRule {
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed: AllowedValues::Any,
        }
    }

    pub fn one_of(
        name: impl Into<String>,
        matchers: impl IntoIterator<Item = ValueMatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            allowed: AllowedValues::OneOf(matchers.into_iter().collect()),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    Name(String),
    WithValues(Vec<MatcherRepr>),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum MatcherRepr {
    Bool(bool),
    Number(f64),
    String(String),
    Pattern { pattern: String },
}

impl TryFrom<RuleRepr> for AttributeRule {
    type Error = String;

    fn try_from(repr: RuleRepr) -> Result<Self, Self::Error> {
        match repr {
            RuleRepr::Name(name) => Ok(AttributeRule::any(name)),
            RuleRepr::WithValues(entries) => {
                let mut entries = entries.into_iter();
                let Some(MatcherRepr::String(name)) = entries.next() else {
                    return Err(
                        "attribute rule array must begin with an attribute name".to_string()
                    );
                };
                let matchers: Vec<ValueMatcher> = entries
                    .map(|entry| match entry {
                        MatcherRepr::Bool(value) => ValueMatcher::Bool(value),
                        MatcherRepr::Number(value) => ValueMatcher::Number(value),
                        MatcherRepr::String(value) => ValueMatcher::Literal(value),
                        MatcherRepr::Pattern { pattern } => ValueMatcher::Pattern(pattern),
                    })
                    .collect();
                if matchers.is_empty() {
                    Ok(AttributeRule::any(name))
                } else {
                    Ok(AttributeRule::one_of(name, matchers))
                }
            }
        }
    }
}

impl From<AttributeRule> for RuleRepr {
    fn from(rule: AttributeRule) -> Self {
        match rule.allowed {
            AllowedValues::Any => RuleRepr::Name(rule.name),
            AllowedValues::OneOf(matchers) => {
                let mut entries = vec![MatcherRepr::String(rule.name)];
                entries.extend(matchers.into_iter().map(|matcher| match matcher {
                    ValueMatcher::Bool(value) => MatcherRepr::Bool(value),
                    ValueMatcher::Number(value) => MatcherRepr::Number(value),
                    ValueMatcher::Literal(value) => MatcherRepr::String(value),
                    ValueMatcher::Pattern(pattern) => MatcherRepr::Pattern { pattern },
                }));
                RuleRepr::WithValues(entries)
            }
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_tag_names() -> Vec<String> {
    strings(&[
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "h7",
        "h8",
        "br",
        "b",
        "i",
        "strong",
        "em",
        "a",
        "pre",
        "code",
        "img",
        "tt",
        "div",
        "ins",
        "del",
        "sup",
        "sub",
        "p",
        "ol",
        "ul",
        "table",
        "thead",
        "tbody",
        "tfoot",
        "blockquote",
        "dl",
        "dt",
        "dd",
        "kbd",
        "q",
        "samp",
        "var",
        "hr",
        "ruby",
        "rt",
        "rp",
        "li",
        "tr",
        "td",
        "th",
        "s",
        "strike",
        "summary",
        "details",
        "caption",
        "figure",
        "figcaption",
        "abbr",
        "bdo",
        "cite",
        "dfn",
        "mark",
        "small",
        "span",
        "time",
        "wbr",
        "input",
    ])
}

fn default_attributes() -> BTreeMap<String, Vec<AttributeRule>> {
    let any = |names: &[&str]| -> Vec<AttributeRule> {
        names.iter().map(|name| AttributeRule::any(*name)).collect()
    };
    BTreeMap::from([
        ("a".to_string(), any(&["href"])),
        ("img".to_string(), any(&["src", "longDesc"])),
        (
            "input".to_string(),
            vec![
                AttributeRule::one_of("type", [ValueMatcher::Literal("checkbox".to_string())]),
                AttributeRule::one_of("disabled", [ValueMatcher::Bool(true)]),
            ],
        ),
        (
            "li".to_string(),
            vec![AttributeRule::one_of(
                "className",
                [ValueMatcher::Literal("task-list-item".to_string())],
            )],
        ),
        ("div".to_string(), any(&["itemScope", "itemType"])),
        ("blockquote".to_string(), any(&["cite"])),
        ("del".to_string(), any(&["cite"])),
        ("ins".to_string(), any(&["cite"])),
        ("q".to_string(), any(&["cite"])),
        (
            "*".to_string(),
            any(&[
                "abbr",
                "accept",
                "acceptCharset",
                "accessKey",
                "action",
                "align",
                "alt",
                "ariaDescribedBy",
                "ariaHidden",
                "ariaLabel",
                "ariaLabelledBy",
                "axis",
                "border",
                "cellPadding",
                "cellSpacing",
                "char",
                "charOff",
                "charSet",
                "checked",
                "clear",
                "cols",
                "colSpan",
                "color",
                "compact",
                "coords",
                "dateTime",
                "dir",
                "disabled",
                "encType",
                "htmlFor",
                "headers",
                "height",
                "hrefLang",
                "hSpace",
                "isMap",
                "id",
                "label",
                "lang",
                "maxLength",
                "media",
                "method",
                "multiple",
                "name",
                "noHref",
                "noShade",
                "noWrap",
                "open",
                "prompt",
                "readOnly",
                "rel",
                "rev",
                "rows",
                "rowSpan",
                "rules",
                "scope",
                "selected",
                "shape",
                "size",
                "span",
                "start",
                "summary",
                "tabIndex",
                "target",
                "title",
                "type",
                "useMap",
                "vAlign",
                "value",
                "vSpace",
                "width",
                "itemProp",
            ]),
        ),
    ])
}

fn default_required() -> BTreeMap<String, BTreeMap<String, Scalar>> {
    BTreeMap::from([(
        "input".to_string(),
        BTreeMap::from([
            ("type".to_string(), Scalar::String("checkbox".to_string())),
            ("disabled".to_string(), Scalar::Bool(true)),
        ]),
    )])
}

fn default_protocols() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("href".to_string(), strings(&["http", "https", "mailto"])),
        ("cite".to_string(), strings(&["http", "https"])),
        ("src".to_string(), strings(&["http", "https"])),
        ("longDesc".to_string(), strings(&["http", "https"])),
    ])
}

fn default_ancestors() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("li".to_string(), strings(&["ol", "ul"])),
        ("tbody".to_string(), strings(&["table"])),
        ("tfoot".to_string(), strings(&["table"])),
        ("thead".to_string(), strings(&["table"])),
        ("td".to_string(), strings(&["table"])),
        ("th".to_string(), strings(&["table"])),
        ("tr".to_string(), strings(&["table"])),
    ])
}

fn default_clobber() -> Vec<String> {
    strings(&["name", "id"])
}

fn default_clobber_prefix() -> String {
    "user-content-".to_string()
}

fn default_strip() -> Vec<String> {
    strings(&["script"])
}
