//! Per-directory configuration scopes.
//!
//! Every build-description file the interpreter visits gets one [`Scope`].
//! A child scope starts as a deep copy of its parent, except for the
//! current-directory variables (rebound to the child's own directory),
//! `target` and `subdirectories` (never inherited), and the option cache
//! (shared by reference across the whole tree).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Well-known path variables seeded into every scope.
pub const VAR_SOURCE_DIR: &str = "CMAKE_SOURCE_DIR";
pub const VAR_BINARY_DIR: &str = "CMAKE_BINARY_DIR";
pub const VAR_CURRENT_SOURCE_DIR: &str = "CMAKE_CURRENT_SOURCE_DIR";
pub const VAR_CURRENT_BINARY_DIR: &str = "CMAKE_CURRENT_BINARY_DIR";

/// Resolved boolean values for user-togglable options, shared by reference
/// with every descendant scope.
pub type OptionCache = Rc<RefCell<BTreeMap<String, bool>>>;

/// A variable's possible values across unconditional and option-gated
/// assignment branches.
///
/// `defined` holds the values assigned on the currently unconditional path.
/// `option` holds values guarded by a condition, keyed by the condition text
/// (a negated condition is keyed `!COND`) so they can be resolved once the
/// option's truth value is known. An unconditional `set` fully replaces
/// `defined` and flips `is_replace`; conditional assignments append to their
/// branch so alternatives survive side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub defined: Vec<String>,
    pub undefined: Vec<String>,
    pub option: BTreeMap<String, ValueRecord>,
    pub is_replace: bool,
}

impl ValueRecord {
    /// A record holding exactly one unconditional value.
    pub fn single(value: impl Into<String>) -> Self {
        ValueRecord {
            defined: vec![value.into()],
            ..Default::default()
        }
    }

    /// The first unconditional value, if any.
    pub fn first(&self) -> Option<&str> {
        self.defined.first().map(String::as_str)
    }

    /// Descend to the branch selected by the active conditional frames,
    /// creating intermediate levels as needed.
    ///
    /// `options` and `reverses` run in parallel; a reversed frame selects the
    /// negated (`!COND`) key.
    pub fn branch(&mut self, options: &[String], reverses: &[bool]) -> &mut ValueRecord {
        let mut node = self;
        for (cond, reversed) in options.iter().zip(reverses.iter()) {
            let key = if *reversed {
                format!("!{cond}")
            } else {
                cond.clone()
            };
            node = node.option.entry(key).or_default();
        }
        node
    }

    /// Collect every value visible under the given option truth assignment:
    /// the unconditional values plus all satisfied option branches,
    /// recursively. A condition absent from the cache counts as false.
    pub fn resolve(&self, options: &BTreeMap<String, bool>) -> Vec<String> {
        let mut values = self.defined.clone();
        for (key, nested) in &self.option {
            let (name, negated) = match key.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (key.as_str(), false),
            };
            let truth = options.get(name).copied().unwrap_or(false);
            if truth != negated {
                values.extend(nested.resolve(options));
            }
        }
        values
    }
}

/// Kind of a build target declared in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Library,
    Executable,
}

/// Properties accumulated for one `add_library`/`add_executable` target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub kind: TargetKind,
    /// Source files as written (after variable expansion), relative to the
    /// declaring scope's directory unless absolute.
    pub sources: Vec<String>,
    /// Include paths added via `target_include_directories`.
    pub includes: Vec<String>,
    /// Key/value pairs from `set_target_properties` / `set_property(TARGET ..)`.
    pub properties: BTreeMap<String, String>,
}

impl TargetRecord {
    pub fn new(kind: TargetKind, sources: Vec<String>) -> Self {
        TargetRecord {
            kind,
            sources,
            includes: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

/// The resolved configuration visible while interpreting one
/// build-description file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    /// Scalar variables.
    pub variables: BTreeMap<String, ValueRecord>,

    /// Variables that are inherently ordered collections (source lists).
    pub list_variables: BTreeMap<String, ValueRecord>,

    /// Targets declared in this scope. Never inherited.
    pub target: BTreeMap<String, TargetRecord>,

    /// Property assignments issued outside target scope
    /// (`set_property(GLOBAL ..)` / `set_property(DIRECTORY ..)`).
    pub scope_target: BTreeMap<String, Vec<String>>,

    /// Global macro-definition accumulator, passed down to subdirectories.
    pub definitions: ValueRecord,

    /// Global include-path accumulator.
    pub includes: ValueRecord,

    /// Global compiler-flag accumulator.
    pub flags: ValueRecord,

    /// Resolved option booleans. The one reference-shared structure: cloning
    /// a scope clones the handle, so a mutation in a child is visible to
    /// siblings created afterwards.
    pub config_option: OptionCache,

    /// Paths queued for descent. Reset for every new scope.
    pub subdirectories: Vec<PathBuf>,
}

impl Scope {
    fn empty() -> Self {
        Scope {
            variables: BTreeMap::new(),
            list_variables: BTreeMap::new(),
            target: BTreeMap::new(),
            scope_target: BTreeMap::new(),
            definitions: ValueRecord::default(),
            includes: ValueRecord::default(),
            flags: ValueRecord::default(),
            config_option: Rc::new(RefCell::new(BTreeMap::new())),
            subdirectories: Vec::new(),
        }
    }

    /// Scope for the top-level build-description file. Seeds the well-known
    /// project and current-directory path variables.
    pub fn root(project_root: &Path, build_root: &Path) -> Self {
        let mut scope = Scope::empty();
        scope.set_var(VAR_SOURCE_DIR, project_root.display().to_string());
        scope.set_var(VAR_BINARY_DIR, build_root.display().to_string());
        scope.set_var(VAR_CURRENT_SOURCE_DIR, project_root.display().to_string());
        scope.set_var(VAR_CURRENT_BINARY_DIR, build_root.display().to_string());
        scope
    }

    /// Scope for a subdirectory's file: a deep copy of the parent with
    /// `target` and `subdirectories` cleared, the option cache shared by
    /// handle, and the current-directory variables rebound.
    pub fn child(&self, source_dir: &Path, binary_dir: &Path) -> Self {
        let mut scope = self.clone();
        scope.target.clear();
        scope.subdirectories.clear();
        scope.config_option = Rc::clone(&self.config_option);
        scope.set_var(VAR_CURRENT_SOURCE_DIR, source_dir.display().to_string());
        scope.set_var(VAR_CURRENT_BINARY_DIR, binary_dir.display().to_string());
        scope
    }

    /// Replace a variable with a single unconditional value.
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        self.variables
            .insert(name.to_string(), ValueRecord::single(value));
    }

    /// First unconditional value of a variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).and_then(ValueRecord::first)
    }

    /// The directory this scope's file lives in.
    pub fn current_source_dir(&self) -> Option<PathBuf> {
        self.var(VAR_CURRENT_SOURCE_DIR).map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_record_branch_nesting() {
        let mut record = ValueRecord::default();
        let options = vec!["USE_SSL".to_string(), "USE_ZLIB".to_string()];
        let reverses = vec![false, true];

        record
            .branch(&options, &reverses)
            .defined
            .push("-DHAVE_SSL_NO_Z".to_string());

        let level1 = record.option.get("USE_SSL").unwrap();
        let level2 = level1.option.get("!USE_ZLIB").unwrap();
        assert_eq!(level2.defined, vec!["-DHAVE_SSL_NO_Z"]);
    }

    #[test]
    fn test_value_record_resolve_honors_truth() {
        let mut record = ValueRecord::single("always");
        record
            .branch(&["FEATURE".to_string()], &[false])
            .defined
            .push("on-value".to_string());
        record
            .branch(&["FEATURE".to_string()], &[true])
            .defined
            .push("off-value".to_string());

        let mut options = BTreeMap::new();
        options.insert("FEATURE".to_string(), true);
        assert_eq!(record.resolve(&options), vec!["always", "on-value"]);

        options.insert("FEATURE".to_string(), false);
        assert_eq!(record.resolve(&options), vec!["always", "off-value"]);
    }

    #[test]
    fn test_value_record_resolve_unknown_option_is_false() {
        let mut record = ValueRecord::default();
        record
            .branch(&["MISSING".to_string()], &[false])
            .defined
            .push("gated".to_string());

        let empty = BTreeMap::new();
        assert!(record.resolve(&empty).is_empty());
    }

    #[test]
    fn test_child_rebinds_current_dirs() {
        let root = Scope::root(Path::new("/proj"), Path::new("/proj/build"));
        let child = root.child(Path::new("/proj/sub"), Path::new("/proj/build/sub"));

        assert_eq!(child.var(VAR_CURRENT_SOURCE_DIR), Some("/proj/sub"));
        assert_eq!(child.var(VAR_CURRENT_BINARY_DIR), Some("/proj/build/sub"));
        // Project-level variables are inherited untouched.
        assert_eq!(child.var(VAR_SOURCE_DIR), Some("/proj"));
        assert_eq!(root.var(VAR_CURRENT_SOURCE_DIR), Some("/proj"));
    }

    #[test]
    fn test_child_does_not_inherit_targets() {
        let mut root = Scope::root(Path::new("/proj"), Path::new("/b"));
        root.target.insert(
            "mylib".to_string(),
            TargetRecord::new(TargetKind::Library, vec!["a.c".to_string()]),
        );
        root.subdirectories.push(PathBuf::from("/proj/sub"));

        let mut child = root.child(Path::new("/proj/sub"), Path::new("/b/sub"));
        assert!(child.target.is_empty());
        assert!(child.subdirectories.is_empty());

        // Mutating the child's targets never affects the parent.
        child.target.insert(
            "other".to_string(),
            TargetRecord::new(TargetKind::Executable, vec![]),
        );
        assert_eq!(root.target.len(), 1);
        assert!(!root.target.contains_key("other"));
    }

    #[test]
    fn test_config_option_shared_across_siblings() {
        let parent = Scope::root(Path::new("/p"), Path::new("/b"));

        let first = parent.child(Path::new("/p/a"), Path::new("/b/a"));
        first
            .config_option
            .borrow_mut()
            .insert("USE_THREADS".to_string(), true);

        // A sibling created afterwards from the same parent sees the option.
        let second = parent.child(Path::new("/p/b"), Path::new("/b/b"));
        assert_eq!(
            second.config_option.borrow().get("USE_THREADS"),
            Some(&true)
        );
        assert_eq!(
            parent.config_option.borrow().get("USE_THREADS"),
            Some(&true)
        );
    }

    #[test]
    fn test_definitions_deep_copied_into_child() {
        let mut parent = Scope::root(Path::new("/p"), Path::new("/b"));
        parent.definitions.defined.push("FROM_PARENT".to_string());

        let mut child = parent.child(Path::new("/p/a"), Path::new("/b/a"));
        assert_eq!(child.definitions.defined, vec!["FROM_PARENT"]);

        child.definitions.defined.push("FROM_CHILD".to_string());
        assert_eq!(parent.definitions.defined, vec!["FROM_PARENT"]);
    }
}
