//! Strong and weak handler sets.

use std::fmt;

use crate::handler::{HandlerKind, SharedHandler, same_handler};

/// Insertion-ordered, identity-based handler sets.
///
/// The same handler may be registered once as strong and once as weak; it
/// is then dispatched twice per message.
#[derive(Default)]
pub struct HandlerRegistry {
    strong: Vec<SharedHandler>,
    weak: Vec<SharedHandler>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("strong", &self.strong.len())
            .field("weak", &self.weak.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. Returns `false` if it was already in that set.
    pub fn insert(&mut self, handler: SharedHandler, kind: HandlerKind) -> bool {
        let set = match kind {
            HandlerKind::Strong => &mut self.strong,
            HandlerKind::Weak => &mut self.weak,
        };
        if set.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        set.push(handler);
        true
    }

    /// Unregister `handler` from both sets. Returns whether it was found.
    pub fn remove(&mut self, handler: &SharedHandler) -> bool {
        let before = self.len();
        self.strong.retain(|h| !same_handler(h, handler));
        self.weak.retain(|h| !same_handler(h, handler));
        self.len() != before
    }

    /// Whether any strong handler is registered.
    pub fn has_strong(&self) -> bool {
        !self.strong.is_empty()
    }

    /// Registrations across both sets.
    pub fn len(&self) -> usize {
        self.strong.len() + self.weak.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.strong.clear();
        self.weak.clear();
    }

    /// Dispatch order: strong handlers, then weak ones.
    pub fn snapshot(&self) -> Vec<SharedHandler> {
        self.strong.iter().chain(&self.weak).cloned().collect()
    }
}
