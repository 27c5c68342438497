use std::fmt;

/// HTTP request methods.
///
/// The eight standard methods get their own variant so the parser can hand
/// them out without allocating. Anything else arrives as [`Method::Extension`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// CONNECT - Establish a tunnel
    Connect,
    /// DELETE - Delete a resource
    Delete,
    /// GET - Retrieve a resource
    Get,
    /// HEAD - Like GET but without the response body
    Head,
    /// OPTIONS - Describe communication options
    Options,
    /// POST - Create or submit data
    Post,
    /// PUT - Replace a resource
    Put,
    /// TRACE - Message loop-back test
    Trace,
    /// Any other method token, stored exactly as received.
    Extension(String),
}

/// The standard methods in the order the parser's prefix automaton walks them.
pub(crate) static STANDARD_METHODS: [Method; 8] = [
    Method::Connect,
    Method::Delete,
    Method::Get,
    Method::Head,
    Method::Options,
    Method::Post,
    Method::Put,
    Method::Trace,
];

impl Method {
    /// Maps a method token to a method. Tokens are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use inlet::http::method::Method;
    /// assert_eq!(Method::from_token("GET"), Method::Get);
    /// assert_eq!(Method::from_token("get"), Method::Extension("get".to_string()));
    /// ```
    pub fn from_token(token: &str) -> Self {
        STANDARD_METHODS
            .iter()
            .find(|m| m.as_str() == token)
            .cloned()
            .unwrap_or_else(|| Method::Extension(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
            Method::Extension(token) => token,
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Method::Extension(_))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
