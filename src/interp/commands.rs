//! The closed set of recognized build-script commands and their handlers.
//!
//! Each recognized command maps to one [`CommandKind`] variant with one
//! handler; dispatch goes through a name lookup so the matcher and the
//! handler set evolve together. Anything outside this set is skipped by the
//! interpreter before dispatch is ever reached.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::scope::{Scope, TargetKind, TargetRecord};
use crate::core::{CompilerKind, ValueRecord};

/// A malformed command invocation. Caught per file by the tree walker.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unbalanced parentheses in `{0}` invocation")]
    Unbalanced(String),

    #[error("`{command}` expects at least {expected} argument(s), got {got}")]
    MissingArgs {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("`{0}` without a matching `if`")]
    UnmatchedConditional(&'static str),
}

/// Recognized command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Set,
    List,
    If,
    ElseIf,
    Else,
    EndIf,
    SetProperty,
    SetTargetProperties,
    Option,
    AddLibrary,
    AddExecutable,
    TargetIncludeDirectories,
    AddDefinitions,
    IncludeDirectories,
    AddCompileOptions,
    Project,
    AddSubdirectory,
}

impl CommandKind {
    /// Name/kind pairs for every recognized command.
    pub const ALL: [(&'static str, CommandKind); 17] = [
        ("set", CommandKind::Set),
        ("list", CommandKind::List),
        ("if", CommandKind::If),
        ("elseif", CommandKind::ElseIf),
        ("else", CommandKind::Else),
        ("endif", CommandKind::EndIf),
        ("set_property", CommandKind::SetProperty),
        ("set_target_properties", CommandKind::SetTargetProperties),
        ("option", CommandKind::Option),
        ("add_library", CommandKind::AddLibrary),
        ("add_executable", CommandKind::AddExecutable),
        (
            "target_include_directories",
            CommandKind::TargetIncludeDirectories,
        ),
        ("add_definitions", CommandKind::AddDefinitions),
        ("include_directories", CommandKind::IncludeDirectories),
        ("add_compile_options", CommandKind::AddCompileOptions),
        ("project", CommandKind::Project),
        ("add_subdirectory", CommandKind::AddSubdirectory),
    ];

    /// Look up a kind by its literal command name.
    pub fn from_name(name: &str) -> Option<CommandKind> {
        Self::ALL
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
    }

    /// Command names sorted longest first, so a name that is a textual
    /// prefix of another never wins the match.
    pub fn names_longest_first() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Self::ALL.iter().map(|(n, _)| *n).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        names
    }
}

/// Active conditional branches while interpreting one file.
///
/// `options` and `reverses` run in parallel: one condition per frame, with
/// `reverses[i]` marking that the frame's negation is active. `frames`
/// counts how many frames each open `if` block has contributed, so an
/// `elseif` chain stays balanced with its single `endif`.
#[derive(Debug, Default)]
pub struct BranchState {
    options: Vec<String>,
    reverses: Vec<bool>,
    frames: Vec<usize>,
}

impl BranchState {
    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn reverses(&self) -> &[bool] {
        &self.reverses
    }

    fn enter_if(&mut self, condition: String) {
        self.options.push(condition);
        self.reverses.push(false);
        self.frames.push(1);
    }

    fn enter_elseif(&mut self, condition: String) -> Result<(), ParseError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(ParseError::UnmatchedConditional("elseif"))?;
        // Negate the branch that just closed, then open the new one.
        if let Some(last) = self.reverses.last_mut() {
            *last = true;
        }
        self.options.push(condition);
        self.reverses.push(false);
        *frame += 1;
        Ok(())
    }

    fn enter_else(&mut self) -> Result<(), ParseError> {
        if self.frames.is_empty() {
            return Err(ParseError::UnmatchedConditional("else"));
        }
        if let Some(last) = self.reverses.last_mut() {
            *last = true;
        }
        Ok(())
    }

    fn leave_if(&mut self) -> Result<(), ParseError> {
        let count = self
            .frames
            .pop()
            .ok_or(ParseError::UnmatchedConditional("endif"))?;
        for _ in 0..count {
            self.options.pop();
            self.reverses.pop();
        }
        Ok(())
    }
}

/// Dispatch one filtered argument text to its command handler, mutating the
/// scope in place.
pub fn dispatch(
    kind: CommandKind,
    args: &str,
    scope: &mut Scope,
    branches: &mut BranchState,
) -> Result<(), ParseError> {
    match kind {
        CommandKind::Set => handle_set(args, scope, branches),
        CommandKind::List => handle_list(args, scope, branches),
        CommandKind::If => {
            branches.enter_if(expand(scope, args.trim()));
            Ok(())
        }
        CommandKind::ElseIf => branches.enter_elseif(expand(scope, args.trim())),
        CommandKind::Else => branches.enter_else(),
        CommandKind::EndIf => branches.leave_if(),
        CommandKind::SetProperty => handle_set_property(args, scope),
        CommandKind::SetTargetProperties => handle_set_target_properties(args, scope),
        CommandKind::Option => handle_option(args, scope),
        CommandKind::AddLibrary => handle_add_target(args, scope, TargetKind::Library),
        CommandKind::AddExecutable => handle_add_target(args, scope, TargetKind::Executable),
        CommandKind::TargetIncludeDirectories => handle_target_include_directories(args, scope),
        CommandKind::AddDefinitions => handle_add_definitions(args, scope, branches),
        CommandKind::IncludeDirectories => handle_include_directories(args, scope, branches),
        CommandKind::AddCompileOptions => handle_add_compile_options(args, scope, branches),
        CommandKind::Project => handle_project(args, scope),
        CommandKind::AddSubdirectory => handle_add_subdirectory(args, scope),
    }
}

/// Split argument text into tokens, honoring double-quoted strings.
///
/// Quotes are stripped from the token; an escaped quote (`\"`) stays part of
/// the token with its backslash, matching how definitions carry embedded
/// quoting through to the synthesizer.
pub fn split_args(args: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in args.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            c if c.is_whitespace() && !in_string => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Expand `${NAME}` references against the scope's variables, then its list
/// variables. Unknown names expand to the empty string. Expansion iterates a
/// bounded number of times so self-referential values cannot loop.
pub fn expand(scope: &Scope, input: &str) -> String {
    let mut value = input.to_string();
    for _ in 0..8 {
        if !value.contains("${") {
            break;
        }
        let mut next = String::with_capacity(value.len());
        let mut rest = value.as_str();
        while let Some(start) = rest.find("${") {
            next.push_str(&rest[..start]);
            match rest[start + 2..].find('}') {
                Some(end) => {
                    let name = &rest[start + 2..start + 2 + end];
                    if let Some(var) = scope.variables.get(name).and_then(|r| r.first()) {
                        next.push_str(var);
                    } else if let Some(list) = scope.list_variables.get(name) {
                        next.push_str(&list.defined.join(";"));
                    }
                    rest = &rest[start + 2 + end + 1..];
                }
                None => {
                    next.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        next.push_str(rest);
        if next == value {
            break;
        }
        value = next;
    }
    value
}

/// Absolutize a path against the scope's current source directory.
fn absolutize(scope: &Scope, path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        match scope.current_source_dir() {
            Some(dir) => dir.join(p).display().to_string(),
            None => path.to_string(),
        }
    }
}

fn require_args(
    args: &[String],
    command: &'static str,
    expected: usize,
) -> Result<(), ParseError> {
    if args.len() < expected {
        return Err(ParseError::MissingArgs {
            command,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn handle_set(args: &str, scope: &mut Scope, branches: &mut BranchState) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "set", 1)?;

    let name = tokens[0].clone();
    // Trailing cache keywords carry no value information.
    let values: Vec<String> = tokens[1..]
        .iter()
        .take_while(|t| *t != "CACHE" && *t != "PARENT_SCOPE")
        .map(|t| expand(scope, t))
        .collect();

    let record = scope.variables.entry(name).or_default();
    let conditional = !branches.options().is_empty();
    let branch = record.branch(branches.options(), branches.reverses());

    if values.is_empty() {
        // `set(VAR)` un-defines: the old values become alternatives that no
        // longer hold on this branch.
        let old = std::mem::take(&mut branch.defined);
        branch.undefined.extend(old);
    } else if conditional {
        branch.defined.push(values.join(";"));
    } else {
        branch.defined = vec![values.join(";")];
        branch.is_replace = true;
    }
    Ok(())
}

fn handle_list(args: &str, scope: &mut Scope, branches: &mut BranchState) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "list", 2)?;

    // Only accumulation matters for flag recovery; other list subcommands
    // are skipped like unrecognized commands.
    if tokens[0] != "APPEND" {
        tracing::debug!("skipping list({} ..)", tokens[0]);
        return Ok(());
    }

    let name = tokens[1].clone();
    let values: Vec<String> = tokens[2..].iter().map(|t| expand(scope, t)).collect();
    let record = scope.list_variables.entry(name).or_default();
    let branch = record.branch(branches.options(), branches.reverses());
    branch.defined.extend(values);
    Ok(())
}

fn handle_option(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "option", 1)?;

    let name = tokens[0].clone();
    let default = tokens
        .last()
        .map(|t| matches!(t.to_ascii_uppercase().as_str(), "ON" | "TRUE" | "1"))
        .unwrap_or(false);

    // The cache is user-togglable state: a later option() never overrides a
    // value already resolved higher in the tree.
    let resolved = {
        let mut cache = scope.config_option.borrow_mut();
        *cache.entry(name.clone()).or_insert(default)
    };

    scope
        .variables
        .entry(name)
        .or_insert_with(|| ValueRecord::single(if resolved { "ON" } else { "OFF" }));
    Ok(())
}

fn handle_add_definitions(
    args: &str,
    scope: &mut Scope,
    branches: &mut BranchState,
) -> Result<(), ParseError> {
    let tokens = split_args(args);
    let values: Vec<String> = tokens
        .iter()
        .map(|t| expand(scope, t))
        .map(|t| t.strip_prefix("-D").map(str::to_string).unwrap_or(t))
        .collect();
    let branch = scope
        .definitions
        .branch(branches.options(), branches.reverses());
    branch.defined.extend(values);
    Ok(())
}

fn handle_include_directories(
    args: &str,
    scope: &mut Scope,
    branches: &mut BranchState,
) -> Result<(), ParseError> {
    let tokens = split_args(args);
    let values: Vec<String> = tokens
        .iter()
        .filter(|t| !matches!(t.as_str(), "AFTER" | "BEFORE" | "SYSTEM"))
        .map(|t| expand(scope, t))
        .map(|t| absolutize(scope, &t))
        .collect();
    let branch = scope
        .includes
        .branch(branches.options(), branches.reverses());
    branch.defined.extend(values);
    Ok(())
}

fn handle_add_compile_options(
    args: &str,
    scope: &mut Scope,
    branches: &mut BranchState,
) -> Result<(), ParseError> {
    let tokens = split_args(args);
    let values: Vec<String> = tokens.iter().map(|t| expand(scope, t)).collect();
    let branch = scope.flags.branch(branches.options(), branches.reverses());
    branch.defined.extend(values);
    Ok(())
}

fn handle_project(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "project", 1)?;

    scope.set_var("PROJECT_NAME", tokens[0].clone());
    if let Some(dir) = scope.current_source_dir() {
        scope.set_var("PROJECT_SOURCE_DIR", dir.display().to_string());
    }
    Ok(())
}

fn handle_add_subdirectory(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "add_subdirectory", 1)?;

    let dir = absolutize(scope, &expand(scope, &tokens[0]));
    scope.subdirectories.push(PathBuf::from(dir));
    Ok(())
}

fn handle_add_target(args: &str, scope: &mut Scope, kind: TargetKind) -> Result<(), ParseError> {
    let tokens = split_args(args);
    let command = match kind {
        TargetKind::Library => "add_library",
        TargetKind::Executable => "add_executable",
    };
    require_args(&tokens, command, 1)?;

    let name = expand(scope, &tokens[0]);
    let mut sources = Vec::new();
    for token in &tokens[1..] {
        if matches!(
            token.as_str(),
            "STATIC" | "SHARED" | "MODULE" | "OBJECT" | "INTERFACE" | "ALIAS" | "WIN32"
                | "MACOSX_BUNDLE" | "EXCLUDE_FROM_ALL"
        ) {
            continue;
        }
        // An expanded list variable arrives as one `;`-joined token.
        for part in expand(scope, token).split(';') {
            if !part.is_empty() && CompilerKind::from_source(Path::new(part)).is_some() {
                sources.push(part.to_string());
            }
        }
    }
    scope.target.insert(name, TargetRecord::new(kind, sources));
    Ok(())
}

fn handle_target_include_directories(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "target_include_directories", 2)?;

    let name = expand(scope, &tokens[0]);
    let dirs: Vec<String> = tokens[1..]
        .iter()
        .filter(|t| !matches!(t.as_str(), "PUBLIC" | "PRIVATE" | "INTERFACE" | "SYSTEM" | "BEFORE"))
        .map(|t| expand(scope, t))
        .map(|t| absolutize(scope, &t))
        .collect();

    // Include paths may land before the target declaration; accumulate on a
    // placeholder entry either way.
    scope
        .target
        .entry(name)
        .or_insert_with(|| TargetRecord::new(TargetKind::Library, Vec::new()))
        .includes
        .extend(dirs);
    Ok(())
}

fn handle_set_target_properties(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    let split = tokens
        .iter()
        .position(|t| t == "PROPERTIES")
        .ok_or(ParseError::MissingArgs {
            command: "set_target_properties",
            expected: 3,
            got: tokens.len(),
        })?;

    let (names, props) = tokens.split_at(split);
    let pairs = property_pairs(scope, &props[1..]);

    for name in names {
        let name = expand(scope, name);
        let target = scope
            .target
            .entry(name)
            .or_insert_with(|| TargetRecord::new(TargetKind::Library, Vec::new()));
        for (key, value) in &pairs {
            target.properties.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

fn handle_set_property(args: &str, scope: &mut Scope) -> Result<(), ParseError> {
    let tokens = split_args(args);
    require_args(&tokens, "set_property", 2)?;

    if tokens[0] == "TARGET" {
        let split = tokens
            .iter()
            .position(|t| t == "PROPERTY" || t == "APPEND_PROPERTY")
            .unwrap_or(tokens.len());
        let names = &tokens[1..split.min(tokens.len())];
        let pairs = if split + 1 < tokens.len() {
            property_pairs(scope, &tokens[split + 1..])
        } else {
            Vec::new()
        };
        for name in names {
            let name = expand(scope, name);
            let target = scope
                .target
                .entry(name)
                .or_insert_with(|| TargetRecord::new(TargetKind::Library, Vec::new()));
            for (key, value) in &pairs {
                target.properties.insert(key.clone(), value.clone());
            }
        }
    } else {
        // GLOBAL / DIRECTORY / SOURCE scope: keep the assignment on the
        // scope itself.
        let split = tokens
            .iter()
            .position(|t| t == "PROPERTY" || t == "APPEND" || t == "APPEND_PROPERTY")
            .map(|i| if tokens.get(i).map(String::as_str) == Some("APPEND") { i + 1 } else { i })
            .unwrap_or(tokens.len());
        if split + 1 < tokens.len() {
            let key = tokens[split + 1].clone();
            let values: Vec<String> = tokens[split + 2..]
                .iter()
                .map(|t| expand(scope, t))
                .collect();
            scope.scope_target.entry(key).or_default().extend(values);
        }
    }
    Ok(())
}

fn property_pairs(scope: &Scope, tokens: &[String]) -> Vec<(String, String)> {
    tokens
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| (c[0].clone(), expand(scope, &c[1])))
        .collect()
}
