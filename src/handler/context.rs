use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::handler::{HandlerFuture, SharedHandler, default_error};
use crate::http::exchange::Exchange;

struct Slot(SharedHandler);

fn slot_ptr(slot: &Option<Arc<Slot>>) -> *const Slot {
    slot.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
}

/// A swappable reference to a handler.
///
/// Reads are lock-free; a dispatch sees either the old handler or the new one,
/// never a mix.
pub struct HttpContext {
    slot: ArcSwapOption<Slot>,
}

impl HttpContext {
    pub fn new(handler: Option<SharedHandler>) -> Self {
        Self {
            slot: ArcSwapOption::new(handler.map(|h| Arc::new(Slot(h)))),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn handler(&self) -> Option<SharedHandler> {
        let current = self.slot.load();
        current.as_deref().map(|slot| slot.0.clone())
    }

    /// Installs `handler`, returning the one it replaced.
    pub fn set_handler(&self, handler: Option<SharedHandler>) -> Option<SharedHandler> {
        self.slot
            .swap(handler.map(|h| Arc::new(Slot(h))))
            .map(|slot| slot.0.clone())
    }

    /// Installs `handler` only if the current handler is `expected`
    /// (compared by identity). Returns whether the swap happened.
    pub fn compare_and_set_handler(
        &self,
        expected: Option<&SharedHandler>,
        handler: Option<SharedHandler>,
    ) -> bool {
        let replacement = handler.map(|h| Arc::new(Slot(h)));
        loop {
            let current = self.slot.load_full();
            let matches = match (current.as_deref(), expected) {
                (None, None) => true,
                (Some(slot), Some(expected)) => Arc::ptr_eq(&slot.0, expected),
                _ => false,
            };
            if !matches {
                return false;
            }
            let previous = self.slot.compare_and_swap(&current, replacement.clone());
            if slot_ptr(&previous) == slot_ptr(&current) {
                return true;
            }
        }
    }

    /// Hands `exchange` to the current handler, or answers `500` when none is set.
    pub fn dispatch(&self, exchange: Exchange) -> HandlerFuture {
        match self.handler() {
            Some(handler) => handler.handle_request(exchange),
            None => default_error(exchange),
        }
    }
}

impl Default for HttpContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("has_handler", &self.slot.load().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, handler_fn};

    async fn noop(_exchange: Exchange) -> Result<(), HandlerError> {
        Ok(())
    }

    #[test]
    fn set_returns_previous() {
        let ctx = HttpContext::empty();
        let first = handler_fn(noop);
        assert!(ctx.set_handler(Some(first.clone())).is_none());

        let previous = ctx.set_handler(None).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(ctx.handler().is_none());
    }

    #[test]
    fn compare_and_set_checks_identity() {
        let ctx = HttpContext::empty();
        let a = handler_fn(noop);
        let b = handler_fn(noop);

        assert!(!ctx.compare_and_set_handler(Some(&a), Some(b.clone())));
        assert!(ctx.compare_and_set_handler(None, Some(a.clone())));
        assert!(!ctx.compare_and_set_handler(Some(&b), None));
        assert!(ctx.compare_and_set_handler(Some(&a), Some(b.clone())));
        assert!(Arc::ptr_eq(&ctx.handler().unwrap(), &b));
    }
}
