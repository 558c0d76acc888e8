use std::fmt;
use url::Url;

use super::error::FetchError;

/// Identity of one logical remote resource.
///
/// This is the fully resolved request URL, so two calls that would hit the
/// same path with the same query share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey(String);

impl FetchKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Url> for FetchKey {
    fn from(url: Url) -> Self {
        FetchKey(url.into())
    }
}

/// Resource path plus query parameters, relative to the API base URL
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(resource: &str) -> Self {
        Self {
            segments: vec![resource.to_string()],
            query: Vec::new(),
        }
    }

    /// Append a path segment; it is percent-encoded when resolved
    pub fn segment(mut self, value: &str) -> Self {
        self.segments.push(value.to_string());
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Join onto `base`, keeping any path the base already carries (e.g. `/api`)
    pub fn resolve(&self, base: &Url) -> Result<FetchKey, FetchError> {
        let mut url = base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidUrl(format!("{} cannot be a base URL", base)))?;
            path.pop_if_empty();
            path.extend(self.segments.iter().map(String::as_str));
        }

        url.set_query(None);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        Ok(FetchKey::from(url))
    }
}
