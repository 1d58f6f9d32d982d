//! Build-arg parsing and substitution.
//!
//! Any string value in a spec may reference a build arg as `${NAME}`. The
//! value comes from the caller-supplied build args, then from the default
//! declared in the spec's `args` block, then from the platform builtins
//! (`TARGETOS`, `TARGETARCH`, ...).
//!
//! # Escaping
//!
//! `$${` produces a literal `${`. A single `$` not followed by `{` passes
//! through unchanged, so shell snippets like `$HOME` need no escaping.
//!
//! # Example
//!
//! ```
//! use pkgraph_lib::spec::args::{parse, Segment};
//!
//! let segments = parse("v${VERSION}-$HOME").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("v".to_string()),
//!     Segment::Arg("VERSION".to_string()),
//!     Segment::Literal("-$HOME".to_string()),
//! ]);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text
  Literal(String),

  /// A `${NAME}` reference
  Arg(String),
}

/// Errors raised while parsing or substituting build args.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
  #[error("unclosed build arg reference at position {0}")]
  Unclosed(usize),

  #[error("invalid build arg name {0:?}")]
  InvalidName(String),

  #[error("build arg {name:?} is referenced but has no default and no value was supplied")]
  Missing { name: String },
}

/// Lookup of build arg values.
pub trait ArgResolver {
  fn resolve_arg(&self, name: &str) -> Option<&str>;
}

/// The build args visible while loading one spec.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
  supplied: BTreeMap<String, String>,
  declared: BTreeMap<String, Option<String>>,
  builtins: BTreeMap<String, String>,
}

impl BuildArgs {
  pub fn new(supplied: BTreeMap<String, String>) -> Self {
    Self {
      supplied,
      ..Default::default()
    }
  }

  pub fn with_declared(mut self, declared: BTreeMap<String, Option<String>>) -> Self {
    self.declared = declared;
    self
  }

  pub fn with_builtins(mut self, builtins: BTreeMap<String, String>) -> Self {
    self.builtins = builtins;
    self
  }
}

impl ArgResolver for BuildArgs {
  fn resolve_arg(&self, name: &str) -> Option<&str> {
    self
      .supplied
      .get(name)
      .map(String::as_str)
      .or_else(|| self.declared.get(name).and_then(|d| d.as_deref()))
      .or_else(|| self.builtins.get(name).map(String::as_str))
  }
}

impl ArgResolver for BTreeMap<String, String> {
  fn resolve_arg(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

/// Parse a string containing build arg references into segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, ArgError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if let Some((_, '{')) = chars.peek() {
          // Escaped: $${ -> ${
          chars.next();
          literal.push_str("${");
        } else {
          literal.push_str("$$");
        }
      }
      Some((_, '{')) => {
        chars.next();

        let mut name = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          name.push(c);
        }

        if !found_close {
          return Err(ArgError::Unclosed(pos));
        }
        if !is_valid_name(&name) {
          return Err(ArgError::InvalidName(name));
        }

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Arg(name));
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

fn is_valid_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(first) if first.is_ascii_alphabetic() || first == '_' => {
      chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
    _ => false,
  }
}

/// Substitute all build arg references in a string.
pub fn substitute(input: &str, resolver: &impl ArgResolver) -> Result<String, ArgError> {
  let segments = parse(input)?;
  let mut result = String::with_capacity(input.len());

  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Arg(name) => {
        let value = resolver
          .resolve_arg(name)
          .ok_or_else(|| ArgError::Missing { name: name.clone() })?;
        result.push_str(value);
      }
    }
  }

  Ok(result)
}

/// Names of all build args a string references.
pub fn references(input: &str) -> Result<Vec<String>, ArgError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|s| match s {
        Segment::Arg(name) => Some(name),
        Segment::Literal(_) => None,
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn git_commit_from_build_arg() {
    let resolver = args(&[("COMMIT", "0123abcd")]);
    let result = substitute("https://github.com/org/repo.git#${COMMIT}", &resolver).unwrap();
    assert_eq!(result, "https://github.com/org/repo.git#0123abcd");
  }

  #[test]
  fn multiple_references_in_one_value() {
    let resolver = args(&[("NAME", "demo"), ("VERSION", "1.2.3")]);
    let result = substitute("${NAME}-${VERSION}.tar.gz", &resolver).unwrap();
    assert_eq!(result, "demo-1.2.3.tar.gz");
  }

  #[test]
  fn shell_variables_pass_through() {
    let resolver = args(&[]);
    let result = substitute("make PREFIX=$HOME/.local -j$(nproc) && echo $?", &resolver).unwrap();
    assert_eq!(result, "make PREFIX=$HOME/.local -j$(nproc) && echo $?");
  }

  #[test]
  fn escape_produces_literal_reference() {
    let resolver = args(&[]);
    let result = substitute("echo $${NOT_AN_ARG}", &resolver).unwrap();
    assert_eq!(result, "echo ${NOT_AN_ARG}");
  }

  #[test]
  fn double_dollar_without_brace_preserved() {
    let resolver = args(&[]);
    assert_eq!(substitute("echo $$pid", &resolver).unwrap(), "echo $$pid");
  }

  #[test]
  fn supplied_value_wins_over_default() {
    let resolver = BuildArgs::new(args(&[("VERSION", "2.0.0")]))
      .with_declared(BTreeMap::from([("VERSION".to_string(), Some("1.0.0".to_string()))]));
    assert_eq!(substitute("${VERSION}", &resolver).unwrap(), "2.0.0");
  }

  #[test]
  fn default_used_when_not_supplied() {
    let resolver =
      BuildArgs::default().with_declared(BTreeMap::from([("VERSION".to_string(), Some("1.0.0".to_string()))]));
    assert_eq!(substitute("${VERSION}", &resolver).unwrap(), "1.0.0");
  }

  #[test]
  fn builtins_resolve_last() {
    let resolver = BuildArgs::default().with_builtins(args(&[("TARGETARCH", "arm64")]));
    assert_eq!(substitute("out-${TARGETARCH}", &resolver).unwrap(), "out-arm64");
  }

  #[test]
  fn error_missing_without_default() {
    let resolver =
      BuildArgs::default().with_declared(BTreeMap::from([("COMMIT".to_string(), None)]));
    let result = substitute("${COMMIT}", &resolver);
    assert!(matches!(result, Err(ArgError::Missing { ref name }) if name == "COMMIT"));
  }

  #[test]
  fn error_unclosed_reference() {
    assert_eq!(parse("v${VERSION"), Err(ArgError::Unclosed(1)));
  }

  #[test]
  fn error_invalid_name() {
    assert!(matches!(parse("${1ABC}"), Err(ArgError::InvalidName(ref s)) if s == "1ABC"));
    assert!(matches!(parse("${}"), Err(ArgError::InvalidName(_))));
  }

  #[test]
  fn references_lists_names_in_order() {
    assert_eq!(references("${B}/${A}/$C").unwrap(), vec!["B".to_string(), "A".to_string()]);
  }

  #[test]
  fn empty_input() {
    assert!(parse("").unwrap().is_empty());
  }
}
