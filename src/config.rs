//! # Manifest Schema and Parsing
//!
//! This module defines the data structures that represent a repository's
//! `.commonrepo.yaml` manifest, as well as the logic for parsing it.
//!
//! ## Key Components
//!
//! - **`Manifest`**: The parsed form of a manifest document. Every missing
//!   top-level key defaults to an empty collection, so an upstream without a
//!   manifest behaves like one with an empty manifest.
//!
//! - **`RenameRule`**: A compiled regular expression plus a printf-style
//!   replacement template. Compilation happens exactly once, at parse time;
//!   an uncompilable pattern fails the whole parse.
//!
//! - **`UpstreamEdge`**: A declared inheritance edge. The edge may carry its
//!   own include/exclude/rename rules, which the flattener appends onto the
//!   upstream's manifest after loading.
//!
//! ## Parsing
//!
//! Parsing is two-staged: serde deserializes the raw YAML document, then the
//! raw form is converted into the compiled model. Unknown top-level keys are
//! ignored for forward compatibility. `rename` and `install` entries are
//! single-key mappings; anything else fails with an error annotated with the
//! source path of the offending entry (e.g. `$.rename[2]`).

use std::collections::BTreeMap;

use regex::Regex;
use semver::VersionReq;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// Template variables merged across the composed tree, name to value.
pub type TemplateVars = BTreeMap<String, Value>;

/// A parsed rename structure which transforms paths within a repository.
#[derive(Debug, Clone)]
pub struct RenameRule {
    matcher: Regex,
    replace: String,
}

impl RenameRule {
    /// Compile a rename rule from a pattern and replacement template.
    pub fn new(pattern: &str, replace: &str) -> Result<Self> {
        Ok(Self {
            matcher: Regex::new(pattern)?,
            replace: replace.to_string(),
        })
    }

    /// Tests whether this rule applies to the given path.
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Transform the given path using this rule.
    ///
    /// Capture groups (excluding the whole match) substitute positionally
    /// into the replacement template via 1-based `%[n]s` indices. Returns
    /// the empty string when the pattern does not match; callers treat that
    /// as "no rename".
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_compose::config::RenameRule;
    ///
    /// let rule = RenameRule::new(r"^(.*)/(.*\.md)$", "%[1]s/docs/%[2]s").unwrap();
    /// assert_eq!(rule.apply("foo/bar.md"), "foo/docs/bar.md");
    /// assert_eq!(rule.apply("bar.md"), "");
    /// ```
    pub fn apply(&self, path: &str) -> String {
        let captures = match self.matcher.captures(path) {
            Some(captures) => captures,
            None => return String::new(),
        };

        let mut out = String::with_capacity(self.replace.len());
        let mut chars = self.replace.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '%' && chars.peek() == Some(&'[') {
                chars.next();
                let mut index = String::new();
                while let Some(&digit) = chars.peek() {
                    if digit.is_ascii_digit() {
                        index.push(digit);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&']') {
                    chars.next();
                    if chars.peek() == Some(&'s') {
                        chars.next();
                        // Indices are 1-based capture groups; %[0]s is not a
                        // way to address the whole match and stays literal.
                        match index.parse::<usize>() {
                            Ok(n) if n >= 1 => {
                                if let Some(group) = captures.get(n) {
                                    out.push_str(group.as_str());
                                }
                            }
                            _ => {
                                out.push_str("%[");
                                out.push_str(&index);
                                out.push_str("]s");
                            }
                        }
                        continue;
                    }
                    // Not a %[n]s verb after all, emit what we consumed.
                    out.push('%');
                    out.push('[');
                    out.push_str(&index);
                    out.push(']');
                    continue;
                }
                out.push('%');
                out.push('[');
                out.push_str(&index);
                continue;
            }
            out.push(ch);
        }
        out
    }

    /// The source pattern this rule was compiled from.
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    /// The replacement template.
    pub fn replacement(&self) -> &str {
        &self.replace
    }
}

impl PartialEq for RenameRule {
    fn eq(&self, other: &Self) -> bool {
        self.matcher.as_str() == other.matcher.as_str() && self.replace == other.replace
    }
}

/// A declared upstream repository edge.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEdge {
    /// Repository locator, handed opaquely to the git transport.
    pub url: String,
    /// Branch or tag name; empty means the remote's default branch.
    pub r#ref: String,
    /// Include globs the downstream attaches to this edge.
    pub include: Vec<String>,
    /// Exclude globs the downstream attaches to this edge.
    pub exclude: Vec<String>,
    /// Rename rules the downstream attaches to this edge.
    pub rename: Vec<RenameRule>,
}

/// A required tool and its version constraint.
///
/// Parsed and validated here; consumed by the installer tooling, not by the
/// composition core.
#[derive(Debug, Clone, PartialEq)]
pub struct Install {
    pub name: String,
    pub version: VersionReq,
}

/// Parsed form of a `.commonrepo.yaml` manifest document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// File globs to include.
    pub include: Vec<String>,
    /// File globs to exclude.
    pub exclude: Vec<String>,
    /// File globs to treat as templates.
    pub template: Vec<String>,
    /// Template variables contributed by this repository.
    pub template_vars: TemplateVars,
    /// Rename rules to apply to output paths.
    pub rename: Vec<RenameRule>,
    /// Upstream repositories to inherit from.
    pub upstream: Vec<UpstreamEdge>,
    /// Required tools with version constraints.
    pub install: Vec<Install>,
    /// Path to install from.
    pub install_from: String,
    /// Priority list of install managers to use.
    pub install_with: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
    #[serde(default)]
    template: Option<Vec<String>>,
    #[serde(default, rename = "template-vars")]
    template_vars: Option<TemplateVars>,
    #[serde(default)]
    rename: Option<Vec<Value>>,
    #[serde(default)]
    upstream: Option<Vec<RawUpstream>>,
    #[serde(default)]
    install: Option<Vec<Value>>,
    #[serde(default, rename = "install-from")]
    install_from: Option<String>,
    #[serde(default, rename = "install-with")]
    install_with: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawUpstream {
    url: String,
    #[serde(default)]
    r#ref: String,
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
    #[serde(default)]
    rename: Option<Vec<Value>>,
}

impl Manifest {
    /// Parse a manifest from YAML text.
    ///
    /// An empty or null document yields the all-defaults manifest, which is
    /// what an upstream without a manifest file behaves like.
    pub fn parse(text: &str) -> Result<Manifest> {
        if text.trim().is_empty() {
            return Ok(Manifest::default());
        }
        let raw: Option<RawManifest> = serde_yaml::from_str(text)?;
        let raw = raw.unwrap_or_default();

        let mut upstream = Vec::new();
        for (i, item) in raw.upstream.unwrap_or_default().into_iter().enumerate() {
            let rename = parse_renames(
                item.rename.unwrap_or_default(),
                &format!("$.upstream[{}].rename", i),
            )?;
            upstream.push(UpstreamEdge {
                url: item.url,
                r#ref: item.r#ref,
                include: item.include.unwrap_or_default(),
                exclude: item.exclude.unwrap_or_default(),
                rename,
            });
        }

        Ok(Manifest {
            include: raw.include.unwrap_or_default(),
            exclude: raw.exclude.unwrap_or_default(),
            template: raw.template.unwrap_or_default(),
            template_vars: raw.template_vars.unwrap_or_default(),
            rename: parse_renames(raw.rename.unwrap_or_default(), "$.rename")?,
            upstream,
            install: parse_installs(raw.install.unwrap_or_default())?,
            install_from: raw.install_from.unwrap_or_default(),
            install_with: raw.install_with.unwrap_or_default(),
        })
    }

    /// Parse a manifest from raw bytes read out of a repository snapshot.
    pub fn parse_bytes(data: &[u8]) -> Result<Manifest> {
        let text = std::str::from_utf8(data).map_err(|_| Error::ConfigParse {
            message: "manifest is not valid UTF-8".to_string(),
        })?;
        Self::parse(text)
    }

    /// Append the rules a downstream attached to the edge pointing at this
    /// repository. The flattener calls this exactly once per edge.
    pub fn append_edge_rules(&mut self, edge: &UpstreamEdge) {
        self.include.extend(edge.include.iter().cloned());
        self.exclude.extend(edge.exclude.iter().cloned());
        self.rename.extend(edge.rename.iter().cloned());
    }
}

/// Parse a list of rename entries, each a single-key mapping from pattern to
/// replacement.
fn parse_renames(entries: Vec<Value>, source_path: &str) -> Result<Vec<RenameRule>> {
    let mut parsed = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let invalid = || Error::RenameInvalid {
            path: format!("{}[{}]", source_path, i),
        };
        let mapping = match entry {
            Value::Mapping(mapping) if mapping.len() == 1 => mapping,
            _ => return Err(invalid()),
        };
        let (key, value) = mapping.into_iter().next().expect("len checked above");
        match (key, value) {
            (Value::String(pattern), Value::String(replace)) => {
                parsed.push(RenameRule::new(&pattern, &replace)?);
            }
            _ => return Err(invalid()),
        }
    }
    Ok(parsed)
}

/// Parse the ordered list of tool installs, each a single-key mapping from
/// tool name to a semver range expression.
fn parse_installs(entries: Vec<Value>) -> Result<Vec<Install>> {
    let mut parsed = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let invalid = || Error::ConfigParse {
            message: format!("install entry is not valid at $.install[{}]", i),
        };
        let mapping = match entry {
            Value::Mapping(mapping) if mapping.len() == 1 => mapping,
            _ => return Err(invalid()),
        };
        let (key, value) = mapping.into_iter().next().expect("len checked above");
        match (key, value) {
            (Value::String(name), Value::String(version)) => {
                parsed.push(Install {
                    name,
                    version: VersionReq::parse(&version)?,
                });
            }
            _ => return Err(invalid()),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
include:
  - "**/*"
  - .gitignore
exclude:
  - .github/workflows/template_*
template:
  - templates/**
template-vars:
  project: myproject
  templated: true
rename:
  - "badname/(.*)": "goodname/%[1]s"
  - "^files/(.*)": "%[1]s"
upstream:
  - url: https://example.com/base.git
    ref: v1.1.0
    include: ["*.md"]
    exclude: [.gitignore]
    rename:
      - "(.*\\.md)": "docs/%[1]s"
install:
  - pre-commit: "*"
  - rustc: ">=1.70"
install-from: tools/
install-with:
  - mise
  - asdf
"#;
        let manifest = Manifest::parse(yaml).unwrap();
        assert_eq!(manifest.include, vec!["**/*", ".gitignore"]);
        assert_eq!(manifest.exclude, vec![".github/workflows/template_*"]);
        assert_eq!(manifest.template, vec!["templates/**"]);
        assert_eq!(
            manifest.template_vars.get("project"),
            Some(&Value::String("myproject".to_string()))
        );
        assert_eq!(manifest.template_vars.get("templated"), Some(&Value::Bool(true)));
        assert_eq!(manifest.rename.len(), 2);
        assert_eq!(manifest.rename[0].pattern(), "badname/(.*)");
        assert_eq!(manifest.rename[0].replacement(), "goodname/%[1]s");
        assert_eq!(manifest.upstream.len(), 1);
        assert_eq!(manifest.upstream[0].url, "https://example.com/base.git");
        assert_eq!(manifest.upstream[0].r#ref, "v1.1.0");
        assert_eq!(manifest.upstream[0].include, vec!["*.md"]);
        assert_eq!(manifest.upstream[0].rename.len(), 1);
        assert_eq!(manifest.install.len(), 2);
        assert_eq!(manifest.install[0].name, "pre-commit");
        assert_eq!(manifest.install_from, "tools/");
        assert_eq!(manifest.install_with, vec!["mise", "asdf"]);
    }

    #[test]
    fn test_parse_empty_document() {
        let manifest = Manifest::parse("").unwrap();
        assert_eq!(manifest, Manifest::default());
        let manifest = Manifest::parse("# just a comment\n").unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let manifest = Manifest::parse("include:\n  - '*.md'\n").unwrap();
        assert_eq!(manifest.include, vec!["*.md"]);
        assert!(manifest.exclude.is_empty());
        assert!(manifest.template.is_empty());
        assert!(manifest.template_vars.is_empty());
        assert!(manifest.rename.is_empty());
        assert!(manifest.upstream.is_empty());
        assert!(manifest.install.is_empty());
        assert!(manifest.install_from.is_empty());
        assert!(manifest.install_with.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let manifest = Manifest::parse("some-future-key: true\ninclude: ['*']\n").unwrap();
        assert_eq!(manifest.include, vec!["*"]);
    }

    #[test]
    fn test_upstream_ref_defaults_to_empty() {
        let manifest = Manifest::parse("upstream:\n  - url: https://example.com/up.git\n").unwrap();
        assert_eq!(manifest.upstream[0].r#ref, "");
        assert!(manifest.upstream[0].include.is_empty());
    }

    #[test]
    fn test_rename_entry_must_be_single_key_mapping() {
        let err = Manifest::parse("rename:\n  - not-a-mapping\n").unwrap_err();
        assert!(err.to_string().contains("$.rename[0]"));

        let err = Manifest::parse("rename:\n  - {a: b, c: d}\n").unwrap_err();
        assert!(err.to_string().contains("$.rename[0]"));

        let err =
            Manifest::parse("rename:\n  - {ok: fine}\n  - {bad: [1, 2]}\n").unwrap_err();
        assert!(err.to_string().contains("$.rename[1]"));
    }

    #[test]
    fn test_edge_rename_error_names_its_path() {
        let yaml = "upstream:\n  - url: u\n    rename:\n      - bogus\n";
        let err = Manifest::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("$.upstream[0].rename[0]"));
    }

    #[test]
    fn test_bad_regex_fails_parse() {
        let err = Manifest::parse("rename:\n  - \"[unclosed\": out\n").unwrap_err();
        assert!(matches!(err, Error::Regex(_)));
    }

    #[test]
    fn test_bad_semver_fails_parse() {
        let err = Manifest::parse("install:\n  - tool: \"not a version\"\n").unwrap_err();
        assert!(matches!(err, Error::Semver(_)));
    }

    #[test]
    fn test_install_constraint_expressions() {
        let manifest =
            Manifest::parse("install:\n  - a: \"*\"\n  - b: \">=1.70\"\n  - c: \"^3.9\"\n")
                .unwrap();
        assert!(manifest.install[1]
            .version
            .matches(&semver::Version::new(1, 70, 0)));
        assert!(!manifest.install[2]
            .version
            .matches(&semver::Version::new(4, 0, 0)));
    }

    #[test]
    fn test_rename_apply_substitutes_groups() {
        let rule = RenameRule::new(r"parent/([^/]+)/dir/(.*)", "%[1]s/%[2]s").unwrap();
        assert_eq!(rule.apply("parent/a/dir/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_rename_apply_no_match_returns_empty() {
        let rule = RenameRule::new(r"(\w+)\.js", "%[1]s.ts").unwrap();
        assert_eq!(rule.apply("main.rs"), "");
        assert!(!rule.matches("main.rs"));
    }

    #[test]
    fn test_rename_apply_literal_replacement() {
        let rule = RenameRule::new(r"^old\.txt$", "new.txt").unwrap();
        assert_eq!(rule.apply("old.txt"), "new.txt");
    }

    #[test]
    fn test_rename_apply_keeps_stray_percent() {
        let rule = RenameRule::new(r"(.*)", "100%-%[1]s").unwrap();
        assert_eq!(rule.apply("x"), "100%-x");
    }

    #[test]
    fn test_rename_apply_index_zero_stays_literal() {
        let rule = RenameRule::new(r"(\w+)\.rs", "%[0]s-%[1]s").unwrap();
        assert_eq!(rule.apply("main.rs"), "%[0]s-main");
    }

    #[test]
    fn test_append_edge_rules() {
        let mut manifest = Manifest::parse("include: ['*.rs']\nexclude: ['target/**']\n").unwrap();
        let edge = UpstreamEdge {
            url: "u".to_string(),
            r#ref: String::new(),
            include: vec!["*.md".to_string()],
            exclude: vec!["action.*".to_string()],
            rename: vec![RenameRule::new("a", "b").unwrap()],
        };
        manifest.append_edge_rules(&edge);
        assert_eq!(manifest.include, vec!["*.rs", "*.md"]);
        assert_eq!(manifest.exclude, vec!["target/**", "action.*"]);
        assert_eq!(manifest.rename.len(), 1);
    }

    #[test]
    fn test_template_vars_preserve_structured_values() {
        let manifest =
            Manifest::parse("template-vars:\n  owner:\n    name: team\n  count: 3\n").unwrap();
        assert!(matches!(
            manifest.template_vars.get("owner"),
            Some(Value::Mapping(_))
        ));
        assert_eq!(
            manifest.template_vars.get("count"),
            Some(&Value::Number(3.into()))
        );
    }
}
