use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Marks an element can carry, queried with [`Element::closest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// The element provides its own undo/redo bindings.
    CustomUndoer,
    /// The element is a notebook cell editor.
    CellEditor,
}

/// A node in the focus-target hierarchy. Elements are immutable once
/// built; ancestry is shared through `Arc` parents.
#[derive(Debug)]
pub struct Element {
    marks: Vec<Mark>,
    parent: Option<Arc<Element>>,
}

impl Element {
    pub fn root(marks: Vec<Mark>) -> Arc<Self> {
        Arc::new(Self {
            marks,
            parent: None,
        })
    }

    pub fn child(parent: &Arc<Element>, marks: Vec<Mark>) -> Arc<Self> {
        Arc::new(Self {
            marks,
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Whether this element or any ancestor carries the mark.
    pub fn closest(&self, mark: Mark) -> bool {
        if self.marks.contains(&mark) {
            return true;
        }
        let mut current = self.parent.as_deref();
        while let Some(element) = current {
            if element.marks.contains(&mark) {
                return true;
            }
            current = element.parent.as_deref();
        }
        false
    }
}

/// The kind of edit a pending-input notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    InsertText,
    InsertLineBreak,
    DeleteContentBackward,
    HistoryUndo,
    HistoryRedo,
}

/// A pre-insertion notification fired by the editor input layer before
/// an edit is committed. Listeners may cancel the default effect.
pub struct PendingInput {
    pub input_type: InputType,
    pub target: Arc<Element>,
    prevented: AtomicBool,
}

impl PendingInput {
    pub fn new(input_type: InputType, target: Arc<Element>) -> Self {
        Self {
            input_type,
            target,
            prevented: AtomicBool::new(false),
        }
    }

    pub fn prevent_default(&self) {
        self.prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.prevented.load(Ordering::SeqCst)
    }
}

type Listener = Box<dyn FnOnce(&PendingInput) + Send>;

/// A focusable input target supporting one-shot pending-input listeners.
///
/// Clones share the listener slot, so the input guard can install a
/// listener on the same target the editor layer emits through. The slot
/// holds at most one listener; it self-disposes on first firing, and an
/// abandoned listener stays inert until replaced.
#[derive(Clone)]
pub struct InputTarget {
    element: Arc<Element>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl InputTarget {
    pub fn new(element: Arc<Element>) -> Self {
        Self {
            element,
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn element(&self) -> &Arc<Element> {
        &self.element
    }

    /// Install a one-shot pending-input listener, replacing any pending one.
    pub fn listen_once(&self, listener: impl FnOnce(&PendingInput) + Send + 'static) {
        *self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(listener));
    }

    /// Emit a pending-input notification, running the pending listener
    /// (if any) synchronously. Returns whether the default effect may
    /// still be applied.
    pub fn emit_pending_input(&self, notice: &PendingInput) -> bool {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener(notice);
        }
        !notice.default_prevented()
    }
}
