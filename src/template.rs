//! # Template Rendering
//!
//! Template targets render their content against the merged variable map
//! before being written. The syntax is `{{.name}}` for a variable reference;
//! dotted paths like `{{.owner.name}}` descend nested mappings. A reference
//! to a variable that does not exist is an error, not a silent blank: the
//! missing-key-is-an-error policy makes a half-configured inheritance chain
//! fail loudly instead of producing broken output.
//!
//! Only scalar values (strings, booleans, numbers) can be interpolated.
//! They render in their YAML display form, so `templated: true` in a
//! variable map renders as `true`.

use serde_yaml::Value;

use crate::config::TemplateVars;
use crate::error::{Error, Result};

/// Render template `source` (the content of the file called `name`) against
/// the merged variable map.
pub fn render(name: &str, source: &str, vars: &TemplateVars) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| Error::Template {
            name: name.to_string(),
            message: "unterminated {{ action".to_string(),
        })?;
        let action = after[..end].trim();
        out.push_str(&lookup(name, action, vars)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve a single `.a.b.c` reference against the variable map.
fn lookup(name: &str, action: &str, vars: &TemplateVars) -> Result<String> {
    let path = action.strip_prefix('.').ok_or_else(|| Error::Template {
        name: name.to_string(),
        message: format!("unsupported action {{{{{}}}}}", action),
    })?;
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(Error::Template {
            name: name.to_string(),
            message: format!("invalid variable reference {{{{{}}}}}", action),
        });
    }

    let mut segments = path.split('.');
    let first = segments.next().expect("path is non-empty");
    let mut current = vars.get(first).ok_or_else(|| missing(name, first))?;
    for segment in segments {
        current = match current {
            Value::Mapping(_) => current
                .get(segment)
                .ok_or_else(|| missing(name, segment))?,
            _ => return Err(missing(name, segment)),
        };
    }

    match current {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::Template {
            name: name.to_string(),
            message: format!("variable \"{}\" is not a scalar", path),
        }),
    }
}

fn missing(name: &str, key: &str) -> Error {
    Error::Template {
        name: name.to_string(),
        message: format!("map has no entry for key \"{}\"", key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(yaml: &str) -> TemplateVars {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_render_plain_text_untouched() {
        let rendered = render("t", "no actions here\n", &TemplateVars::new()).unwrap();
        assert_eq!(rendered, "no actions here\n");
    }

    #[test]
    fn test_render_merged_scalars() {
        let vars = vars("project: commonrepo\nversion: 1.0.0\ntemplated: true\n");
        let source = "project: {{.project}}\nversion: {{.version}}\ntemplated: {{.templated}}\n";
        let rendered = render("templated.yml", source, &vars).unwrap();
        assert_eq!(rendered, "project: commonrepo\nversion: 1.0.0\ntemplated: true\n");
    }

    #[test]
    fn test_render_allows_spaces_in_action() {
        let vars = vars("name: x\n");
        assert_eq!(render("t", "hi {{ .name }}!", &vars).unwrap(), "hi x!");
    }

    #[test]
    fn test_render_numbers() {
        let vars = vars("count: 3\nratio: 0.5\n");
        assert_eq!(
            render("t", "{{.count}}/{{.ratio}}", &vars).unwrap(),
            "3/0.5"
        );
    }

    #[test]
    fn test_render_nested_lookup() {
        let vars = vars("owner:\n  name: team\n");
        assert_eq!(render("t", "{{.owner.name}}", &vars).unwrap(), "team");
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let vars = vars("present: yes\n");
        let err = render("templated.yml", "{{.absent}}", &vars).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("templated.yml"));
        assert!(text.contains("absent"));
    }

    #[test]
    fn test_missing_nested_key_is_an_error() {
        let vars = vars("owner:\n  name: team\n");
        assert!(render("t", "{{.owner.email}}", &vars).is_err());
        assert!(render("t", "{{.owner.name.deeper}}", &vars).is_err());
    }

    #[test]
    fn test_non_scalar_interpolation_is_an_error() {
        let vars = vars("owner:\n  name: team\n");
        let err = render("t", "{{.owner}}", &vars).unwrap_err();
        assert!(err.to_string().contains("not a scalar"));
    }

    #[test]
    fn test_unterminated_action_is_an_error() {
        let err = render("t", "broken {{.name", &TemplateVars::new()).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_action_without_dot_is_an_error() {
        let err = render("t", "{{name}}", &vars("name: x\n")).unwrap_err();
        assert!(err.to_string().contains("unsupported action"));
    }
}
