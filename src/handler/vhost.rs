use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::handler::{
    HandlerFuture, HttpContext, HttpHandler, RegistrationError, SharedHandler, default_error,
};
use crate::http::exchange::Exchange;

type HostTable = DashMap<String, Arc<NameVirtualHostContext>>;

/// Checks `name` against `(*.)?label(.label)*` and returns the table key:
/// the lowercased name, with a wildcard stored as `.suffix`.
fn host_key(name: &str) -> Result<String, RegistrationError> {
    let invalid = || RegistrationError::InvalidHostName(name.to_string());
    let lower = name.to_ascii_lowercase();
    let (wildcard, rest) = match lower.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, lower.as_str()),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    for label in rest.split('.') {
        let mut bytes = label.bytes();
        match bytes.next() {
            Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit() => {}
            _ => return Err(invalid()),
        }
        if !bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
            return Err(invalid());
        }
    }
    Ok(if wildcard {
        format!(".{rest}")
    } else {
        rest.to_string()
    })
}

/// A registered host and the handler serving it.
pub struct NameVirtualHostContext {
    name: String,
    key: String,
    context: HttpContext,
    table: Weak<HostTable>,
}

impl NameVirtualHostContext {
    /// The host name as registered, lowercased.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_wildcard(&self) -> bool {
        self.key.starts_with('.')
    }

    pub fn context(&self) -> &HttpContext {
        &self.context
    }

    /// Removes this host from its table. Returns false if it was already gone.
    pub fn close(&self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        table
            .remove_if(&self.key, |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), self)
            })
            .is_some()
    }
}

impl std::fmt::Debug for NameVirtualHostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameVirtualHostContext")
            .field("name", &self.name)
            .field("context", &self.context)
            .finish()
    }
}

/// Routes on the request host.
///
/// Exact names win over wildcards; among wildcards the longest suffix wins.
/// Requests matching nothing go to the fallback context, and without a
/// fallback handler get a `500`.
pub struct NameVirtualHostHandler {
    hosts: Arc<HostTable>,
    fallback: HttpContext,
}

impl NameVirtualHostHandler {
    pub fn new(fallback: Option<SharedHandler>) -> Self {
        Self {
            hosts: Arc::new(DashMap::new()),
            fallback: HttpContext::new(fallback),
        }
    }

    pub fn fallback(&self) -> &HttpContext {
        &self.fallback
    }

    pub fn set_fallback_handler(&self, handler: Option<SharedHandler>) -> Option<SharedHandler> {
        self.fallback.set_handler(handler)
    }

    /// Registers `name` (`www.example.com` or `*.example.com`).
    pub fn register_host(
        &self,
        name: &str,
        handler: Option<SharedHandler>,
    ) -> Result<Arc<NameVirtualHostContext>, RegistrationError> {
        let key = host_key(name)?;
        match self.hosts.entry(key.clone()) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicateHost(name.to_string())),
            Entry::Vacant(slot) => {
                let context = Arc::new(NameVirtualHostContext {
                    name: name.to_ascii_lowercase(),
                    key,
                    context: HttpContext::new(handler),
                    table: Arc::downgrade(&self.hosts),
                });
                slot.insert(context.clone());
                tracing::debug!(host = %context.name, "virtual host registered");
                Ok(context)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn handler_for(&self, key: &str) -> Option<SharedHandler> {
        let context = self.hosts.get(key)?.value().clone();
        context.context.handler()
    }

    /// Finds the handler for `host`, ignoring the fallback.
    ///
    /// Tries the exact name, then `*.` patterns from the longest suffix to
    /// the shortest. Hosts registered without a handler are skipped.
    pub fn lookup(&self, host: &str) -> Option<SharedHandler> {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        if let Some(handler) = self.handler_for(&host) {
            return Some(handler);
        }
        let mut rest = host.as_str();
        loop {
            if let Some(handler) = self.handler_for(&format!(".{rest}")) {
                return Some(handler);
            }
            match rest.find('.') {
                Some(dot) => rest = &rest[dot + 1..],
                None => return None,
            }
        }
    }
}

impl HttpHandler for NameVirtualHostHandler {
    fn handle_request(&self, exchange: Exchange) -> HandlerFuture {
        let handler = exchange
            .host()
            .and_then(|host| self.lookup(host))
            .or_else(|| self.fallback.handler());
        match handler {
            Some(handler) => handler.handle_request(exchange),
            None => default_error(exchange),
        }
    }
}
