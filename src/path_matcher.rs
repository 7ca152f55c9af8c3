// Compiles path-spec patterns into predicates. A pattern is one of: absent
// (matches nothing), a literal string, a `re:`-prefixed regex-in-string, a
// compiled regex, a glob containing `*`/`?`, or an array of any of the above.

use regex::Regex;

use crate::error::{ContextError, Result};
use crate::util::normalize_path;

#[derive(Clone)]
pub struct PathMatcher {
    kind: MatcherKind,
}

#[derive(Clone)]
enum MatcherKind {
    Never,
    Regex(Regex),
    DirPrefix(String),
    Exact(String),
    Glob(Vec<GlobSegment>),
    Any(Vec<PathMatcher>),
}

#[derive(Clone)]
enum GlobSegment {
    Literal(String),
    Pattern(Regex),
    // Trailing-empty-segment sentinel: matches any sequence of remaining
    // segments. Not a general `**` operator.
    RestOfPath,
}

#[derive(Clone)]
pub enum PatternSpec {
    Literal(String),
    Regex(Regex),
    Array(Vec<PatternSpec>),
}

impl From<&str> for PatternSpec {
    fn from(s: &str) -> Self {
        PatternSpec::Literal(s.to_string())
    }
}

impl From<String> for PatternSpec {
    fn from(s: String) -> Self {
        PatternSpec::Literal(s)
    }
}

impl From<Regex> for PatternSpec {
    fn from(r: Regex) -> Self {
        PatternSpec::Regex(r)
    }
}

impl<T: Into<PatternSpec>> From<Vec<T>> for PatternSpec {
    fn from(items: Vec<T>) -> Self {
        PatternSpec::Array(items.into_iter().map(Into::into).collect())
    }
}

impl PathMatcher {
    pub fn never() -> Self {
        PathMatcher {
            kind: MatcherKind::Never,
        }
    }

    pub fn compile(pattern: Option<PatternSpec>) -> Result<Self> {
        match pattern {
            None => Ok(Self::never()),
            Some(spec) => Self::compile_spec(spec),
        }
    }

    fn compile_spec(spec: PatternSpec) -> Result<Self> {
        match spec {
            PatternSpec::Regex(re) => Ok(PathMatcher {
                kind: MatcherKind::Regex(re),
            }),
            PatternSpec::Literal(s) => Self::compile_string(&s),
            PatternSpec::Array(items) => {
                let subs = items
                    .into_iter()
                    .map(Self::compile_spec)
                    .collect::<Result<Vec<_>>>()?;
                Ok(PathMatcher {
                    kind: MatcherKind::Any(subs),
                })
            }
        }
    }

    fn compile_string(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("re:") {
            let re = Regex::new(rest).map_err(|_| ContextError::InvalidOptionValue {
                option: "pattern",
                value: s.to_string(),
            })?;
            return Ok(PathMatcher {
                kind: MatcherKind::Regex(re),
            });
        }

        let has_glob_chars = s.contains('*') || s.contains('?');

        if !has_glob_chars && (s.ends_with('/') || s.ends_with('\\')) {
            let normalized = normalize_path(s);
            let stripped = normalized
                .strip_suffix('/')
                .unwrap_or(&normalized)
                .to_string();
            return Ok(PathMatcher {
                kind: MatcherKind::DirPrefix(stripped),
            });
        }

        if !has_glob_chars {
            return Ok(PathMatcher {
                kind: MatcherKind::Exact(normalize_path(s)),
            });
        }

        // Split on the pattern's own separators before any trailing-slash
        // stripping, so a trailing `*` segment is never confused with the
        // `**`-sentinel empty segment.
        let unified: String = s.chars().map(|c| if c == '\\' { '/' } else { c }).collect();
        let trailing_sep = unified.ends_with('/');
        let raw_segments: Vec<&str> = unified.split('/').collect();

        let mut segments = Vec::with_capacity(raw_segments.len() + 1);
        for seg in raw_segments {
            if seg.is_empty() {
                continue;
            }
            segments.push(compile_glob_segment(seg)?);
        }
        if trailing_sep {
            segments.push(GlobSegment::RestOfPath);
        }

        Ok(PathMatcher {
            kind: MatcherKind::Glob(segments),
        })
    }

    /// Evaluates the matcher against an already-normalised input string.
    pub fn matches(&self, input: &str) -> bool {
        match &self.kind {
            MatcherKind::Never => false,
            MatcherKind::Regex(re) => re.is_match(input),
            MatcherKind::DirPrefix(prefix) => {
                let normalized = normalize_path(input);
                match normalized.strip_prefix(prefix.as_str()) {
                    Some(rest) => rest.starts_with('/') || rest.starts_with('\\'),
                    None => false,
                }
            }
            MatcherKind::Exact(pattern) => normalize_path(input) == *pattern,
            MatcherKind::Glob(segments) => glob_matches(segments, input),
            MatcherKind::Any(subs) => subs.iter().any(|m| m.matches(input)),
        }
    }
}

fn compile_glob_segment(seg: &str) -> Result<GlobSegment> {
    if !seg.contains('*') && !seg.contains('?') {
        return Ok(GlobSegment::Literal(seg.to_string()));
    }

    let mut pattern = String::with_capacity(seg.len() * 2);
    pattern.push('^');
    for c in seg.chars() {
        match c {
            '*' => pattern.push_str(".*?"),
            '?' => pattern.push('.'),
            _ => {
                if is_regex_metachar(c) {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
        }
    }
    pattern.push('$');

    let re = Regex::new(&pattern).map_err(|_| ContextError::InvalidOptionValue {
        option: "pattern",
        value: seg.to_string(),
    })?;
    Ok(GlobSegment::Pattern(re))
}

fn is_regex_metachar(c: char) -> bool {
    matches!(
        c,
        '.' | '^' | '$' | '|' | '(' | ')' | '[' | ']' | '{' | '}' | '+' | '\\'
    )
}

fn glob_matches(segments: &[GlobSegment], input: &str) -> bool {
    let normalized = normalize_path(input);
    let input_segments: Vec<&str> = normalized
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();

    let mut pi = 0;
    let mut ii = 0;
    while pi < segments.len() {
        match &segments[pi] {
            GlobSegment::RestOfPath => return true,
            GlobSegment::Literal(lit) => {
                if ii >= input_segments.len() || input_segments[ii] != lit {
                    return false;
                }
            }
            GlobSegment::Pattern(re) => {
                if ii >= input_segments.len() || !re.is_match(input_segments[ii]) {
                    return false;
                }
            }
        }
        pi += 1;
        ii += 1;
    }
    ii == input_segments.len()
}
