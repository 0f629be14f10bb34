//! Breadth-first traversal of a project's build-script tree.
//!
//! Each directory that registered itself as a subdirectory of an already
//! interpreted scope gets its own script interpreted against that parent
//! scope. A directory that fails to interpret is logged and skipped; its
//! own subdirectories are simply never discovered.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::Scope;
use crate::interp::script::{Interpreter, ProjectPaths, SCRIPT_FILE_NAME};

/// One interpreted directory: its source path and the resulting scope.
#[derive(Debug, Serialize)]
pub struct ScopeNode {
    pub path: PathBuf,
    pub scope: Scope,
}

/// All interpreted scopes of a project, in breadth-first discovery order.
/// The root scope, when present, is always index 0.
#[derive(Debug, Default, Serialize)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    pub fn get(&self, index: usize) -> Option<&ScopeNode> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScopeNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Write the tree as pretty JSON for inspection.
    pub fn dump(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.nodes)?;
        crate::util::fs::write_string(path, &json)?;
        Ok(())
    }
}

/// Interpret the whole script tree rooted at `paths.root`.
pub fn walk_project(paths: &ProjectPaths) -> ScopeTree {
    let interpreter = Interpreter::new(paths.clone());
    let mut tree = ScopeTree::default();

    // Queue of (source directory, index of parent node in the tree).
    let mut queue: Vec<(PathBuf, Option<usize>)> = vec![(paths.root.clone(), None)];
    let mut head = 0;

    while head < queue.len() {
        let (dir, parent_index) = queue[head].clone();
        head += 1;

        let script = dir.join(SCRIPT_FILE_NAME);
        let parent = parent_index.and_then(|i| tree.get(i)).map(|n| &n.scope);
        let scope = match interpreter.interpret(&script, parent) {
            Ok(scope) => scope,
            Err(err) => {
                tracing::warn!("skipping {}: {err}", dir.display());
                continue;
            }
        };

        let index = tree.nodes.len();
        for sub in &scope.subdirectories {
            queue.push((sub.clone(), Some(index)));
        }
        tree.nodes.push(ScopeNode { path: dir, scope });
    }

    tracing::info!("interpreted {} build script(s)", tree.len());
    tree
}
