//! Template rendering
//!
//! Walks a JSON value and replaces `{{ expression }}` placeholders inside
//! string scalars with the evaluated, stringified expression. Maps and
//! lists keep their shape; numbers, booleans and nulls pass through.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::expr::{Bindings, Evaluator};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders templates through an [`Evaluator`]
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    evaluator: Evaluator,
}

impl TemplateRenderer {
    /// Create a renderer that evaluates placeholders with `evaluator`
    pub fn new(evaluator: Evaluator) -> Self {
        TemplateRenderer { evaluator }
    }

    /// Render every string in `value`, rebuilding maps and lists
    pub fn render(&self, value: &Value, bindings: &Bindings) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.render_str(s, bindings)?.into_owned())),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render(item, bindings))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let mut out = Map::with_capacity(fields.len());
                for (key, field) in fields {
                    out.insert(key.clone(), self.render(field, bindings)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Render the placeholders in one string.
    ///
    /// Placeholders run from `{{` to the nearest following `}}` and do not
    /// nest. A span with nothing inside (`{{}}`) or with a `}` inside is not
    /// a placeholder, and an opening `{{` without a closing `}}` is kept as
    /// text.
    pub fn render_str<'a>(&self, text: &'a str, bindings: &Bindings) -> Result<Cow<'a, str>> {
        let mut rendered: Option<String> = None;
        let mut copied = 0;
        let mut search = 0;

        while let Some(found) = text[search..].find(OPEN) {
            let open = search + found;
            let body_start = open + OPEN.len();
            let Some(len) = text[body_start..].find(CLOSE) else {
                break;
            };
            let body = &text[body_start..body_start + len];
            if body.is_empty() || body.contains('}') {
                search = body_start;
                continue;
            }

            let expr = body.trim();
            let value = self
                .evaluator
                .evaluate(expr, bindings)
                .map_err(|e| Error::Template {
                    expr: expr.to_string(),
                    source: Box::new(e),
                })?;

            let out = rendered.get_or_insert_with(|| String::with_capacity(text.len()));
            out.push_str(&text[copied..open]);
            out.push_str(&value.to_string());
            copied = body_start + len + CLOSE.len();
            search = copied;
        }

        Ok(match rendered {
            Some(mut out) => {
                out.push_str(&text[copied..]);
                Cow::Owned(out)
            }
            None => Cow::Borrowed(text),
        })
    }
}

/// Render with a default evaluator
pub fn render(value: &Value, bindings: &Bindings) -> Result<Value> {
    TemplateRenderer::default().render(value, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::time::Duration;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new(Evaluator::new(EvaluatorConfig {
            timeout: Duration::from_secs(5),
            ..EvaluatorConfig::default()
        }))
    }

    fn bindings(value: Value) -> Bindings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_render_nested_value() {
        let template = json!({"a": "{{x+1}}", "b": [1, "{{y}}"]});
        let vars = bindings(json!({"x": 1, "y": "z"}));
        let rendered = renderer().render(&template, &vars).unwrap();
        assert_eq!(rendered, json!({"a": "2", "b": [1, "z"]}));
    }

    #[test]
    fn test_request_params() {
        let template = json!({
            "s": "{{ keyword }}",
            "offset": "{{ (page - 1) * limit }}",
            "limit": "{{limit}}",
            "label": "page {{page}} of {{ pages }}",
            "raw": 5,
            "enabled": true,
            "missing": null
        });
        let vars = bindings(json!({"keyword": "blue train", "page": 2, "limit": 30, "pages": 7}));
        let rendered = renderer().render(&template, &vars).unwrap();
        assert_eq!(
            rendered,
            json!({
                "s": "blue train",
                "offset": "30",
                "limit": "30",
                "label": "page 2 of 7",
                "raw": 5,
                "enabled": true,
                "missing": null
            })
        );
    }

    #[test]
    fn test_without_placeholders_is_unchanged() {
        let template = json!({
            "q": "plain text",
            "list": [1, 2.5, false, null, {"inner": "braces { } alone"}],
            "half": "{{ unterminated"
        });
        let rendered = renderer().render(&template, &Bindings::new()).unwrap();
        assert_eq!(rendered, template);
    }

    #[test]
    fn test_render_str_borrows_when_untouched() {
        let r = renderer();
        let out = r.render_str("nothing to do", &Bindings::new()).unwrap();
        assert!(matches!(out, Cow::Borrowed("nothing to do")));

        let out = r.render_str("n={{ 1 + 1 }}!", &Bindings::new()).unwrap();
        assert_eq!(out, "n=2!");
    }

    #[test]
    fn test_empty_braces_are_text() {
        let r = renderer();
        let vars = bindings(json!({"x": 1}));
        let out = r.render_str("{{}}", &vars).unwrap();
        assert!(matches!(out, Cow::Borrowed("{{}}")));
        assert_eq!(r.render_str("{{}} and {{x}}", &vars).unwrap(), "{{}} and 1");
        assert_eq!(r.render_str("{{a}b}} {{ x }}", &vars).unwrap(), "{{a}b}} 1");

        // Whitespace alone is still a placeholder, and an empty expression
        let err = r.render_str("{{ }}", &vars).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_stringification() {
        let r = renderer();
        let vars = bindings(json!({"n": null, "t": true, "f": 1.5}));
        assert_eq!(r.render_str("[{{n}}]", &vars).unwrap(), "[]");
        assert_eq!(r.render_str("{{t}}", &vars).unwrap(), "true");
        assert_eq!(r.render_str("{{f * 2}}", &vars).unwrap(), "3");
        assert_eq!(r.render_str("{{f / 2}}", &vars).unwrap(), "0.75");
    }

    #[test]
    fn test_failure_names_expression() {
        let vars = bindings(json!({"x": 1}));
        let err = renderer()
            .render(&json!({"ok": "{{x}}", "bad": ["{{ x + nope }}"]}), &vars)
            .unwrap_err();
        match &err {
            Error::Template { expr, source } => {
                assert_eq!(expr, "x + nope");
                assert_eq!(source.kind(), ErrorKind::RuntimeFault);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("x + nope"));
    }

    #[test]
    fn test_rejected_placeholder_aborts_render() {
        let err = renderer()
            .render(&json!(["{{ 'quoted' }}"]), &Bindings::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
