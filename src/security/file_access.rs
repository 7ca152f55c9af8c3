use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::controller::{Controller, ControllerData, DynValue, Invocation};
use crate::error::{ContextError, Result};
use crate::logger::{trace, warn};
use crate::path_matcher::{PathMatcher, PatternSpec};
use crate::util::normalize_path;

pub const FILEACCESS_SEGMENT: &str = "fileaccess";

#[derive(Default)]
pub struct FileAccessOptions {
    pub readable: Option<PatternSpec>,
    pub writable: Option<PatternSpec>,
    pub listable: Option<PatternSpec>,
}

// Each field may itself be a `{N}`/`{N.key}` placeholder, resolved against
// the call's positional arguments at `on_context` time.
#[derive(Default, Clone)]
struct RequestDescriptor {
    read: Vec<String>,
    write: Vec<String>,
    list: Vec<String>,
    flags: Option<String>,
    path: Option<String>,
    mode: Option<String>,
}

// Compiled matchers are immutable and shared between a parent and every
// `create_child`-produced child.
pub struct FileAccessController {
    readable: Arc<PathMatcher>,
    writable: Arc<PathMatcher>,
    listable: Arc<PathMatcher>,
    descriptor: RequestDescriptor,
}

impl FileAccessController {
    pub fn new(options: FileAccessOptions) -> Result<Self> {
        Ok(Self {
            readable: Arc::new(PathMatcher::compile(options.readable)?),
            writable: Arc::new(PathMatcher::compile(options.writable)?),
            listable: Arc::new(PathMatcher::compile(options.listable)?),
            descriptor: RequestDescriptor::default(),
        })
    }

    fn require(&self, kind: &str, path: &str) -> Result<()> {
        let matcher = match kind {
            "read" => &self.readable,
            "write" => &self.writable,
            "list" => &self.listable,
            _ => unreachable!("internal: unknown access kind {kind}"),
        };
        if matcher.matches(path) {
            trace!("fileaccess: {kind} access to {path} allowed");
            Ok(())
        } else {
            warn!("fileaccess: {kind} access to {path} denied");
            Err(ContextError::FileAccessForbidden(path.to_string()))
        }
    }
}

impl Controller for FileAccessController {
    fn create_child(&self, data: ControllerData) -> Result<Box<dyn Controller>> {
        let descriptor = RequestDescriptor {
            read: coerce_string_list(&data, "read")?,
            write: coerce_string_list(&data, "write")?,
            list: coerce_string_list(&data, "list")?,
            flags: coerce_optional_string(&data, "flags")?,
            path: coerce_optional_string(&data, "path")?,
            mode: coerce_optional_string(&data, "mode")?,
        };

        Ok(Box::new(FileAccessController {
            readable: Arc::clone(&self.readable),
            writable: Arc::clone(&self.writable),
            listable: Arc::clone(&self.listable),
            descriptor,
        }))
    }

    fn on_context(&self, invocation: Box<dyn Invocation>) -> Result<Box<dyn Any>> {
        let args = invocation.args().to_vec();

        let path = resolve_placeholder(self.descriptor.path.as_deref(), &args)
            .map(|p| normalize_path(&p));

        if let (Some(flags), Some(path)) = (
            resolve_placeholder(self.descriptor.flags.as_deref(), &args),
            path.as_deref(),
        ) {
            if flags_need_read(&flags) {
                self.require("read", path)?;
            }
            if flags_need_write(&flags) {
                self.require("write", path)?;
            }
        }

        if let (Some(mode), Some(path)) = (
            resolve_placeholder(self.descriptor.mode.as_deref(), &args),
            path.as_deref(),
        ) {
            let bits = parse_octal_mode(&mode);
            if bits & 0o444 != 0 {
                self.require("read", path)?;
            }
            if bits & 0o222 != 0 {
                self.require("write", path)?;
            }
        }

        for spec in &self.descriptor.list {
            if let Some(resolved) = resolve_placeholder(Some(spec), &args) {
                self.require("list", &normalize_path(&resolved))?;
            }
        }
        for spec in &self.descriptor.read {
            if let Some(resolved) = resolve_placeholder(Some(spec), &args) {
                self.require("read", &normalize_path(&resolved))?;
            }
        }
        for spec in &self.descriptor.write {
            if let Some(resolved) = resolve_placeholder(Some(spec), &args) {
                self.require("write", &normalize_path(&resolved))?;
            }
        }

        invocation.invoke()
    }
}

// `{N}` resolves to the Nth positional argument if it is a string; `{N.key}`
// resolves to that field of a record-like Nth argument; anything else is
// returned as a literal.
fn resolve_placeholder(spec: Option<&str>, args: &[DynValue]) -> Option<String> {
    let spec = spec?;

    if let Some(index) = parse_index_placeholder(spec) {
        return args.get(index)?.as_str().map(str::to_string);
    }

    if let Some((index, key)) = parse_keyed_placeholder(spec) {
        return args.get(index)?.get(&key)?.as_str().map(str::to_string);
    }

    Some(spec.to_string())
}

fn parse_index_placeholder(spec: &str) -> Option<usize> {
    let inner = spec.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse().ok()
}

fn parse_keyed_placeholder(spec: &str) -> Option<(usize, String)> {
    let inner = spec.strip_prefix('{')?.strip_suffix('}')?;
    let (index_part, key_part) = inner.split_once('.')?;
    if index_part.is_empty() || !index_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if key_part.is_empty() {
        return None;
    }
    Some((index_part.parse().ok()?, key_part.to_string()))
}

// Exact-token check: a leading `+` counts the same as any other position.
fn flags_need_read(flags: &str) -> bool {
    flags.contains('r') || flags.contains('+')
}

fn flags_need_write(flags: &str) -> bool {
    flags.contains('w') || flags.contains('a') || flags.contains('+')
}

fn parse_octal_mode(mode: &str) -> u32 {
    u32::from_str_radix(mode.trim_start_matches("0o"), 8).unwrap_or(0)
}

fn coerce_string_list(data: &ControllerData, key: &str) -> Result<Vec<String>> {
    match data.get(key) {
        None | Some(DynValue::None) => Ok(Vec::new()),
        Some(DynValue::Str(s)) => Ok(vec![s.clone()]),
        Some(DynValue::List(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or(ContextError::InvalidArgType {
                    arg: "descriptor list entry",
                    expected: "string",
                })
            })
            .collect(),
        Some(DynValue::Record(_)) => Err(ContextError::InvalidArgType {
            arg: key_to_static(key),
            expected: "string or array of strings",
        }),
    }
}

fn coerce_optional_string(data: &ControllerData, key: &str) -> Result<Option<String>> {
    match data.get(key) {
        None | Some(DynValue::None) => Ok(None),
        Some(DynValue::Str(s)) => Ok(Some(s.clone())),
        _ => Err(ContextError::InvalidArgType {
            arg: key_to_static(key),
            expected: "string",
        }),
    }
}

fn key_to_static(key: &str) -> &'static str {
    match key {
        "read" => "read",
        "write" => "write",
        "list" => "list",
        "flags" => "flags",
        "path" => "path",
        "mode" => "mode",
        _ => "field",
    }
}

// Exposed so construction call sites can build a `FileAccessOptions`
// without reaching into `path_matcher` directly. `re:` is handled by the
// matcher compiler recognising the prefix on an ordinary literal.
pub fn literal(pattern: impl Into<String>) -> PatternSpec {
    PatternSpec::Literal(pattern.into())
}

pub fn regex(pattern: &str) -> Result<PatternSpec> {
    Ok(PatternSpec::Regex(Regex::new(pattern).map_err(|_| {
        ContextError::InvalidOptionValue {
            option: "pattern",
            value: pattern.to_string(),
        }
    })?))
}

pub type SegmentMap = IndexMap<String, Arc<dyn Controller>>;

// Attaches a controller under the well-known `fileaccess` segment name to
// the given container map, creating one if `container` is `None`.
pub fn add_file_access_controller(
    container: Option<SegmentMap>,
    options: FileAccessOptions,
) -> Result<SegmentMap> {
    let mut container = container.unwrap_or_default();
    let controller: Arc<dyn Controller> = Arc::new(FileAccessController::new(options)?);
    container.insert(FILEACCESS_SEGMENT.to_string(), controller);
    Ok(container)
}

// Test hook exposing the matcher compiler directly.
pub fn to_matcher(pattern: Option<PatternSpec>) -> Result<PathMatcher> {
    PathMatcher::compile(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InnerInvocation;
    use indexmap::indexmap;

    fn run_on_context(
        controller: &dyn Controller,
        args: Vec<DynValue>,
    ) -> Result<()> {
        let invocation: Box<dyn Invocation> = Box::new(InnerInvocation {
            args,
            call: Box::new(|| Ok(())),
        });
        controller.on_context(invocation).map(|_| ())
    }

    fn allow_read(path_spec: &str) -> FileAccessController {
        FileAccessController::new(FileAccessOptions {
            readable: Some(literal(path_spec)),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn allowed_read_passes_through() {
        let parent = allow_read("/tmp/");
        let child = parent
            .create_child(indexmap! { "read".to_string() => DynValue::Str("{0}".to_string()) })
            .unwrap();
        let result = run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/a.tmp".to_string())]);
        assert!(result.is_ok());
    }

    #[test]
    fn denied_read_is_forbidden_and_does_not_invoke() {
        let parent = FileAccessController::new(FileAccessOptions::default()).unwrap();
        let child = parent
            .create_child(indexmap! { "read".to_string() => DynValue::Str("{0}".to_string()) })
            .unwrap();
        let err = run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/a.tmp".to_string())])
            .unwrap_err();
        assert_eq!(err, ContextError::FileAccessForbidden("/tmp/a.tmp".to_string()));
    }

    #[test]
    fn glob_read_distinguishes_extension() {
        let parent = allow_read("/tmp/*.tmp");
        let child = parent
            .create_child(indexmap! { "read".to_string() => DynValue::Str("{0}".to_string()) })
            .unwrap();
        assert!(run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/a.tmp".to_string())]).is_ok());
        let err = run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/a.abc".to_string())])
            .unwrap_err();
        assert_eq!(err, ContextError::FileAccessForbidden("/tmp/a.abc".to_string()));
    }

    #[test]
    fn subdir_glob_read() {
        let parent = allow_read("/tmp/*/a.tmp");
        let child = parent
            .create_child(indexmap! { "read".to_string() => DynValue::Str("{0}".to_string()) })
            .unwrap();
        assert!(run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/x/a.tmp".to_string())]).is_ok());
        assert!(run_on_context(child.as_ref(), vec![DynValue::Str("/tmp/a.tmp".to_string())]).is_err());
    }

    #[test]
    fn flags_r_requires_read_and_plus_requires_both() {
        assert!(flags_need_read("r"));
        assert!(!flags_need_write("r"));
        assert!(flags_need_read("+"));
        assert!(flags_need_write("+"));
        assert!(flags_need_write("w"));
        assert!(flags_need_write("a"));
    }

    #[test]
    fn mode_bits_select_read_and_write() {
        assert_eq!(parse_octal_mode("644") & 0o444, 0o444);
        assert_eq!(parse_octal_mode("644") & 0o222, 0o200);
        assert_eq!(parse_octal_mode("400") & 0o222, 0);
    }

    #[test]
    fn placeholder_resolves_index_and_key() {
        let mut record = indexmap::IndexMap::new();
        record.insert("path".to_string(), DynValue::Str("/tmp/a".to_string()));
        let args = vec![DynValue::Record(record)];
        assert_eq!(
            resolve_placeholder(Some("{0.path}"), &args),
            Some("/tmp/a".to_string())
        );
        assert_eq!(resolve_placeholder(Some("{5}"), &args), None);
        assert_eq!(
            resolve_placeholder(Some("literal"), &args),
            Some("literal".to_string())
        );
    }

    #[test]
    fn non_string_array_element_is_a_type_error() {
        let parent = FileAccessController::new(FileAccessOptions::default()).unwrap();
        let err = parent
            .create_child(indexmap! {
                "read".to_string() => DynValue::List(vec![DynValue::Record(Default::default())])
            })
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidArgType { .. }));
    }
}
