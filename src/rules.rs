use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::node::Scalar;
use crate::schema::{AllowedValues, AttributeRule, Schema, ValueMatcher};
use crate::{Error, Result};

const MAX_PATTERNS: usize = 128;
const MAX_PATTERN_BYTES: usize = 4096;
const MAX_PATTERN_COMPILED_SIZE_BYTES: usize = 1_000_000;
const MAX_PATTERN_NEST_LIMIT: u32 = 128;

/// Rule name that matches any attribute with a `data` prefix.
const DATA_TOKEN: &str = "data*";

/// A schema compiled into lookup form: sets instead of lists, patterns
/// as compiled regexes. Built once per [`crate::Sanitizer`]; all schema
/// defects surface here, never during traversal.
#[derive(Debug)]
pub(crate) struct CompiledRules {
    pub tag_names: HashSet<String>,
    pub protocols: HashMap<String, Vec<String>>,
    pub ancestors: HashMap<String, Vec<String>>,
    pub clobber: HashSet<String>,
    pub strip: HashSet<String>,
    global_attributes: HashMap<String, CompiledRule>,
    tag_attributes: HashMap<String, HashMap<String, CompiledRule>>,
}

#[derive(Debug)]
pub(crate) struct CompiledRule {
    /// `None` means any value is allowed once type- and protocol-checked.
    pub allowed: Option<Vec<CompiledMatcher>>,
}

#[derive(Debug)]
pub(crate) enum CompiledMatcher {
    Bool(bool),
    Number(f64),
    Literal(String),
    Pattern(Regex),
}

impl CompiledMatcher {
    pub fn matches(&self, value: &Scalar) -> bool {
        match (self, value) {
            (CompiledMatcher::Bool(expected), Scalar::Bool(actual)) => expected == actual,
            (CompiledMatcher::Number(expected), Scalar::Number(actual)) => expected == actual,
            (CompiledMatcher::Literal(expected), Scalar::String(actual)) => expected == actual,
            (CompiledMatcher::Pattern(regex), value) => regex.is_match(&value.to_string()),
            _ => false,
        }
    }
}

fn summarize_pattern_for_error(pattern: &str) -> String {
    const MAX_BYTES: usize = 200;
    if pattern.len() <= MAX_BYTES {
        return pattern.to_string();
    }
    let mut end = MAX_BYTES;
    while end > 0 && !pattern.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    format!("{}…", &pattern[..end])
}

impl CompiledRules {
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let mut pattern_budget = MAX_PATTERNS;
        let mut global_attributes = HashMap::new();
        let mut tag_attributes = HashMap::new();

        for (tag, rules) in &schema.attributes {
            let compiled = compile_rules(rules, &mut pattern_budget)?;
            if tag == "*" {
                global_attributes = compiled;
            } else {
                tag_attributes.insert(tag.clone(), compiled);
            }
        }

        Ok(Self {
            tag_names: schema.tag_names.iter().cloned().collect(),
            protocols: schema
                .protocols
                .iter()
                .map(|(name, schemes)| (name.clone(), schemes.clone()))
                .collect(),
            ancestors: schema
                .ancestors
                .iter()
                .map(|(tag, required)| (tag.clone(), required.clone()))
                .collect(),
            clobber: schema.clobber.iter().cloned().collect(),
            strip: schema.strip.iter().cloned().collect(),
            global_attributes,
            tag_attributes,
        })
    }

    /// Look up the rule governing `name` on `tag`: the per-tag list
    /// first, then the wildcard list, then a `data*` rule (per-tag
    /// before wildcard) when the name has a `data` prefix.
    pub fn attribute_rule(&self, tag: &str, name: &str) -> Option<&CompiledRule> {
        let per_tag = self.tag_attributes.get(tag);
        if let Some(rule) = per_tag.and_then(|rules| rules.get(name)) {
            return Some(rule);
        }
        if let Some(rule) = self.global_attributes.get(name) {
            return Some(rule);
        }
        if is_data_name(name) {
            if let Some(rule) = per_tag.and_then(|rules| rules.get(DATA_TOKEN)) {
                return Some(rule);
            }
            return self.global_attributes.get(DATA_TOKEN);
        }
        None
    }
}

fn is_data_name(name: &str) -> bool {
    name.len() > 4 && name.as_bytes()[..4].eq_ignore_ascii_case(b"data")
}

fn compile_rules(
    rules: &[AttributeRule],
    pattern_budget: &mut usize,
) -> Result<HashMap<String, CompiledRule>> {
    let mut compiled = HashMap::new();
    for rule in rules {
        let allowed = match &rule.allowed {
            AllowedValues::Any => None,
            AllowedValues::OneOf(matchers) => Some(
                matchers
                    .iter()
                    .map(|matcher| compile_matcher(&rule.name, matcher, pattern_budget))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        // Later rules for the same name win, as with a merged map.
        compiled.insert(rule.name.clone(), CompiledRule { allowed });
    }
    Ok(compiled)
}

fn compile_matcher(
    attribute: &str,
    matcher: &ValueMatcher,
    pattern_budget: &mut usize,
) -> Result<CompiledMatcher> {
    let pattern = match matcher {
        ValueMatcher::Bool(value) => return Ok(CompiledMatcher::Bool(*value)),
        ValueMatcher::Number(value) => return Ok(CompiledMatcher::Number(*value)),
        ValueMatcher::Literal(value) => return Ok(CompiledMatcher::Literal(value.clone())),
        ValueMatcher::Pattern(pattern) => pattern,
    };

    if *pattern_budget == 0 {
        return Err(Error::InvalidSchema(format!(
            "attributes has too many patterns (max {MAX_PATTERNS})"
        )));
    }
    *pattern_budget -= 1;

    if pattern.is_empty() {
        return Err(Error::InvalidSchema(format!(
            "invalid pattern for attribute {attribute:?}: empty pattern is not allowed"
        )));
    }
    if pattern.len() > MAX_PATTERN_BYTES {
        return Err(Error::InvalidSchema(format!(
            "invalid pattern for attribute {attribute:?} ({} bytes; max {} bytes)",
            pattern.len(),
            MAX_PATTERN_BYTES
        )));
    }
    let preview = summarize_pattern_for_error(pattern);
    let regex = regex::RegexBuilder::new(pattern)
        .size_limit(MAX_PATTERN_COMPILED_SIZE_BYTES)
        .nest_limit(MAX_PATTERN_NEST_LIMIT)
        .build()
        .map_err(|err| {
            Error::InvalidSchema(format!(
                "invalid pattern for attribute {attribute:?} {preview:?}: {err}"
            ))
        })?;
    Ok(CompiledMatcher::Pattern(regex))
}
