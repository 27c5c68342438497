use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::handler::{
    HandlerFuture, HttpContext, HttpHandler, RegistrationError, SharedHandler, default_error,
};
use crate::http::exchange::Exchange;

type PathTable = DashMap<String, Arc<PathContext>>;

/// Accepts `/segment(/segment)*` where segments are non-empty and free of
/// control characters.
fn validate_prefix(path: &str) -> Result<(), RegistrationError> {
    let invalid = || RegistrationError::InvalidPath(path.to_string());
    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    for segment in rest.split('/') {
        if segment.is_empty() || segment.chars().any(|c| c.is_control() || c == ' ') {
            return Err(invalid());
        }
    }
    Ok(())
}

/// A registered path prefix and the handler serving it.
pub struct PathContext {
    prefix: String,
    context: HttpContext,
    table: Weak<PathTable>,
}

impl PathContext {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn context(&self) -> &HttpContext {
        &self.context
    }

    /// Removes this prefix from its table. Returns false if it was already gone.
    pub fn close(&self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        table
            .remove_if(&self.prefix, |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), self)
            })
            .is_some()
    }
}

impl std::fmt::Debug for PathContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathContext")
            .field("prefix", &self.prefix)
            .field("context", &self.context)
            .finish()
    }
}

/// Routes on the exchange's relative path.
///
/// The longest registered prefix ending on a segment boundary wins. Before
/// dispatching, the matched prefix is stripped from the relative path so the
/// next handler sees only the remainder (`/` when nothing is left).
pub struct PathHandler {
    paths: Arc<PathTable>,
    fallback: HttpContext,
}

impl PathHandler {
    pub fn new(fallback: Option<SharedHandler>) -> Self {
        Self {
            paths: Arc::new(DashMap::new()),
            fallback: HttpContext::new(fallback),
        }
    }

    pub fn fallback(&self) -> &HttpContext {
        &self.fallback
    }

    pub fn set_fallback_handler(&self, handler: Option<SharedHandler>) -> Option<SharedHandler> {
        self.fallback.set_handler(handler)
    }

    pub fn register_path(
        &self,
        prefix: &str,
        handler: Option<SharedHandler>,
    ) -> Result<Arc<PathContext>, RegistrationError> {
        validate_prefix(prefix)?;
        match self.paths.entry(prefix.to_string()) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicatePath(prefix.to_string())),
            Entry::Vacant(slot) => {
                let context = Arc::new(PathContext {
                    prefix: prefix.to_string(),
                    context: HttpContext::new(handler),
                    table: Arc::downgrade(&self.paths),
                });
                slot.insert(context.clone());
                tracing::debug!(prefix, "path registered");
                Ok(context)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Finds the longest registered prefix of `path` that has a handler.
    /// Returns the matched prefix length and the handler.
    pub fn lookup(&self, path: &str) -> Option<(usize, SharedHandler)> {
        let mut candidate = path.split(['?', '#']).next().unwrap_or(path);
        candidate = candidate.trim_end_matches('/');
        while !candidate.is_empty() {
            if let Some(context) = self.paths.get(candidate).map(|c| c.value().clone()) {
                if let Some(handler) = context.context.handler() {
                    return Some((candidate.len(), handler));
                }
            }
            match candidate.rfind('/') {
                Some(slash) => candidate = &candidate[..slash],
                None => break,
            }
        }
        None
    }
}

impl HttpHandler for PathHandler {
    fn handle_request(&self, mut exchange: Exchange) -> HandlerFuture {
        match self.lookup(exchange.relative_path()) {
            Some((matched, handler)) => {
                let rest = match &exchange.relative_path()[matched..] {
                    "" => "/".to_string(),
                    rest => rest.to_string(),
                };
                exchange.set_relative_path(rest);
                handler.handle_request(exchange)
            }
            None => match self.fallback.handler() {
                Some(handler) => handler.handle_request(exchange),
                None => default_error(exchange),
            },
        }
    }
}
