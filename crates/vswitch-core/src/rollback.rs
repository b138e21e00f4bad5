//! Compensation stack for multi-step graph mutations.

/// Ordered list of compensating actions for an in-progress multi-step
/// operation.
///
/// Each step that succeeds registers the action undoing it with
/// [`defer`](UndoStack::defer). Dropping the stack runs the registered
/// actions in reverse order; once every step has succeeded,
/// [`commit`](UndoStack::commit) disarms the stack and the completed
/// steps are kept.
pub(crate) struct UndoStack {
    actions: Vec<Box<dyn FnOnce() + Send>>,
}

impl UndoStack {
    pub(crate) fn new() -> Self {
        UndoStack {
            actions: Vec::new(),
        }
    }

    /// Registers the action undoing the step that just succeeded.
    pub(crate) fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Disarms the stack; no registered action will run.
    pub(crate) fn commit(mut self) {
        self.actions.clear();
    }
}

impl Drop for UndoStack {
    fn drop(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }
}
