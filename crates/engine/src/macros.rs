//! Macro expansion
//!
//! A `macro` step names a template in the merged [`MacroLibrary`] and supplies
//! arguments. Expansion is depth-first: the template is expanded first, then
//! every resulting step is substituted with the caller's arguments and
//! re-validated. Templates are never mutated; every output step is a fresh
//! value built by [`substitute`].
//!
//! Placeholders are written `${name}`. A string that is exactly one
//! placeholder takes the argument's raw JSON value, so `"${cols}"` can fill a
//! numeric field. Anywhere else placeholders are interpolated as text and
//! unknown names are left verbatim.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use tuimuppet_common::{Error, MacroFile, Result, Step, StepKind};

/// Macro name to step template
pub type MacroLibrary = BTreeMap<String, Vec<Step>>;

const PLACEHOLDER: &str = r"\$\{(\w+)\}";

/// Merge macro files, rejecting names defined more than once
pub fn merge_macros(files: &[MacroFile]) -> Result<MacroLibrary> {
    let mut library = MacroLibrary::new();
    let mut duplicates = BTreeSet::new();

    for file in files {
        for (name, steps) in &file.macros {
            if library.contains_key(name) {
                duplicates.insert(name.clone());
                continue;
            }
            library.insert(name.clone(), steps.clone());
        }
    }

    if !duplicates.is_empty() {
        return Err(Error::DuplicateName {
            kind: "macros".to_string(),
            names: duplicates.into_iter().collect(),
        });
    }
    Ok(library)
}

/// Replace every `macro` step with its expanded template
pub fn expand(steps: &[Step], library: &MacroLibrary) -> Result<Vec<Step>> {
    let placeholder = Regex::new(PLACEHOLDER)?;
    expand_with_stack(steps, library, &[], &placeholder)
}

fn expand_with_stack(
    steps: &[Step],
    library: &MacroLibrary,
    stack: &[String],
    placeholder: &Regex,
) -> Result<Vec<Step>> {
    let mut output = Vec::with_capacity(steps.len());

    for step in steps {
        let (name, args) = match &step.kind {
            StepKind::Macro { name, args } => (name, args),
            _ => {
                output.push(step.clone());
                continue;
            }
        };

        let template = library
            .get(name)
            .ok_or_else(|| Error::MacroNotFound(name.clone()))?;

        let mut chain = stack.to_vec();
        chain.push(name.clone());
        if stack.contains(name) {
            return Err(Error::MacroCycle { chain });
        }

        debug!("Expanding macro {} (depth {})", name, chain.len());
        let expanded = expand_with_stack(template, library, &chain, placeholder)?;

        let empty = Map::new();
        let args = args.as_ref().unwrap_or(&empty);
        for template_step in &expanded {
            let value = substitute(&template_step.to_value()?, args, placeholder);
            let step = Step::from_value(value).map_err(|e| {
                Error::schema(format!("macro {:?} produced an invalid step: {}", name, e.detail()))
            })?;
            output.push(step);
        }
    }

    Ok(output)
}

/// Build a new value with placeholders replaced by arguments
pub fn substitute(value: &Value, args: &Map<String, Value>, placeholder: &Regex) -> Value {
    match value {
        Value::String(text) => substitute_str(text, args, placeholder),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, args, placeholder))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), substitute(item, args, placeholder)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(text: &str, args: &Map<String, Value>, placeholder: &Regex) -> Value {
    if let Some(caps) = placeholder.captures(text) {
        let whole = caps.get(0).map(|m| m.as_str().len()) == Some(text.len());
        if whole {
            if let Some(arg) = args.get(&caps[1]) {
                return arg.clone();
            }
        }
    }

    let replaced = placeholder.replace_all(text, |caps: &Captures| match args.get(&caps[1]) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tuimuppet_common::Matcher;

    fn library(value: Value) -> MacroLibrary {
        merge_macros(&[MacroFile::from_value(json!({
            "schemaVersion": "v1",
            "macros": value
        }))
        .unwrap()])
        .unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("args must be an object"),
        }
    }

    #[test]
    fn test_expands_with_interpolation() {
        let library = library(json!({
            "login": [
                {"type": "waitFor", "contains": "Username:"},
                {"type": "line", "text": "${user}"},
                {"type": "expect", "contains": "Welcome, ${user} (${role})"}
            ]
        }));

        let steps = vec![Step::invoke("login", args(json!({"user": "alice"})))];
        let expanded = expand(&steps, &library).unwrap();

        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[1], Step::line("alice"));
        assert_eq!(
            expanded[2],
            Step::expect(Matcher::contains("Welcome, alice (${role})"))
        );
    }

    #[test]
    fn test_exact_placeholder_keeps_argument_type() {
        let placeholder = Regex::new(PLACEHOLDER).unwrap();
        let value = substitute(
            &json!({"type": "resize", "cols": "${cols}", "rows": "${rows}"}),
            &args(json!({"cols": 100, "rows": 30})),
            &placeholder,
        );
        assert_eq!(value, json!({"type": "resize", "cols": 100, "rows": 30}));
        assert!(Step::from_value(value).is_ok());
    }

    #[test]
    fn test_non_string_arguments_interpolate_as_json() {
        let library = library(json!({
            "count": [{"type": "expect", "contains": "items: ${n}"}]
        }));
        let steps = vec![Step::invoke("count", args(json!({"n": 3})))];
        let expanded = expand(&steps, &library).unwrap();
        assert_eq!(expanded, vec![Step::expect(Matcher::contains("items: 3"))]);
    }

    #[test]
    fn test_substitution_that_breaks_typing_is_rejected() {
        let library = library(json!({
            "say": [{"type": "line", "text": "${text}"}]
        }));
        let steps = vec![Step::invoke("say", args(json!({"text": 42})))];
        let err = expand(&steps, &library).unwrap_err();
        assert!(matches!(err, Error::Schema(_)), "{}", err);
    }

    #[test]
    fn test_nested_macros_expand_depth_first() {
        let library = library(json!({
            "outer": [
                {"type": "line", "text": "before"},
                {"type": "macro", "name": "inner", "args": {"word": "${word}"}},
                {"type": "line", "text": "after"}
            ],
            "inner": [{"type": "line", "text": "inner ${word}"}]
        }));
        let steps = vec![Step::invoke("outer", args(json!({"word": "hi"})))];
        let expanded = expand(&steps, &library).unwrap();

        assert_eq!(
            expanded,
            vec![Step::line("before"), Step::line("inner hi"), Step::line("after")]
        );
    }

    #[test]
    fn test_expansion_is_deterministic_and_leaves_template_untouched() {
        let library = library(json!({
            "greet": [{"type": "line", "text": "hello ${name}"}]
        }));
        let before = library.clone();
        let steps = vec![Step::invoke("greet", args(json!({"name": "bob"})))];

        let first = expand(&steps, &library).unwrap();
        let second = expand(&steps, &library).unwrap();

        assert_eq!(first, second);
        assert_eq!(library, before);
    }

    #[test]
    fn test_unknown_macro() {
        let steps = vec![Step::invoke("missing", Map::new())];
        let err = expand(&steps, &MacroLibrary::new()).unwrap_err();
        assert_eq!(err.to_string(), "Macro \"missing\" not found");
    }

    #[test]
    fn test_cycle_names_full_chain() {
        let library = library(json!({
            "a": [{"type": "macro", "name": "b"}],
            "b": [{"type": "macro", "name": "a"}]
        }));
        let steps = vec![Step::invoke("a", Map::new())];
        let err = expand(&steps, &library).unwrap_err();
        assert_eq!(err.to_string(), "Macro cycle detected: a -> b -> a");
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let library = library(json!({"loop": [{"type": "macro", "name": "loop"}]}));
        let err = expand(&[Step::invoke("loop", Map::new())], &library).unwrap_err();
        assert!(matches!(err, Error::MacroCycle { ref chain } if chain == &["loop", "loop"]));
    }

    #[test]
    fn test_merge_rejects_duplicate_names() {
        let file = |steps: Value| {
            MacroFile::from_value(json!({"schemaVersion": "v1", "macros": {"login": steps}}))
                .unwrap()
        };
        let err = merge_macros(&[
            file(json!([{"type": "line", "text": "a"}])),
            file(json!([{"type": "line", "text": "b"}])),
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "macros contains duplicate names: login");
    }
}
