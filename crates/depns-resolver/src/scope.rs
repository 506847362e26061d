//! The "which project is being defined right now" seam.
//!
//! The project-definition pipeline owns this knowledge; the registry only
//! asks for it when resolving [`NamespaceKey::Current`](crate::key::NamespaceKey::Current)
//! or a parent link set to the current scope.

use std::cell::RefCell;
use std::rc::Rc;

/// Supplies the name path of the active project, outermost first.
///
/// An empty path means no project is active and resolves to the root
/// namespace.
pub trait CurrentScope {
    fn current_path(&self) -> Vec<String>;
}

/// A scope that never has an active project.
#[derive(Debug, Default, Clone, Copy)]
pub struct RootScope;

impl CurrentScope for RootScope {
    fn current_path(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A stack of nested project names maintained by the definition pipeline.
///
/// Clones share the same stack, so the registry and the pipeline can each
/// hold one.
#[derive(Debug, Default, Clone)]
pub struct ProjectScope {
    stack: Rc<RefCell<Vec<String>>>,
}

impl ProjectScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, project: &str) {
        self.stack.borrow_mut().push(project.to_string());
    }

    pub fn exit(&self) -> Option<String> {
        self.stack.borrow_mut().pop()
    }

    /// Run `f` with `project` pushed as the innermost active project.
    pub fn within<R>(&self, project: &str, f: impl FnOnce() -> R) -> R {
        self.enter(project);
        let result = f();
        self.exit();
        result
    }
}

impl CurrentScope for ProjectScope {
    fn current_path(&self) -> Vec<String> {
        self.stack.borrow().clone()
    }
}
