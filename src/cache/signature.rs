//! Request identity used as the cache key.

use std::collections::BTreeMap;

/// Deterministic key identifying a distinct request: endpoint, query
/// parameters, and pagination cursor.
///
/// Parameters are held sorted, so two signatures describing the same logical
/// request compare equal regardless of the order they were built in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature {
    endpoint: String,
    params: BTreeMap<String, String>,
    cursor: Option<String>,
}

impl RequestSignature {
    /// Create a signature from an endpoint, query parameters, and an
    /// optional pagination cursor.
    pub fn new<I, K, V>(endpoint: impl Into<String>, params: I, cursor: Option<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            params: params.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            cursor,
        }
    }

    /// The endpoint this signature addresses.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The query parameters, in sorted order.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// The pagination cursor, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

impl core::fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.endpoint)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        if let Some(cursor) = &self.cursor {
            write!(f, "@{cursor}")?;
        }
        Ok(())
    }
}
