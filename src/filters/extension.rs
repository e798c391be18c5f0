use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::foundation::error::RenderResult;
use crate::render::bitmap::Bitmap;

/// Image filter supplied by a document extension.
///
/// Inputs may be shared with other stages and must not be modified; implementations return a
/// new bitmap.
pub trait ExtensionFilter: Send + Sync {
    /// Produce the filtered image.
    fn process_image(
        &self,
        source: Option<&Bitmap>,
        destination: Option<&Bitmap>,
        params: &serde_json::Value,
    ) -> RenderResult<Bitmap>;
}

impl<F> ExtensionFilter for F
where
    F: Fn(Option<&Bitmap>, Option<&Bitmap>, &serde_json::Value) -> RenderResult<Bitmap>
        + Send
        + Sync,
{
    fn process_image(
        &self,
        source: Option<&Bitmap>,
        destination: Option<&Bitmap>,
        params: &serde_json::Value,
    ) -> RenderResult<Bitmap> {
        self(source, destination, params)
    }
}

/// Extension filters keyed by `(uri, name)`.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    filters: HashMap<(String, String), Arc<dyn ExtensionFilter>>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

impl ExtensionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filter` under `(uri, name)`, replacing any previous entry.
    pub fn register(
        &mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        filter: impl ExtensionFilter + 'static,
    ) {
        self.filters
            .insert((uri.into(), name.into()), Arc::new(filter));
    }

    /// Builder form of [`ExtensionRegistry::register`].
    pub fn with(
        mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        filter: impl ExtensionFilter + 'static,
    ) -> Self {
        self.register(uri, name, filter);
        self
    }

    /// Look up a filter.
    pub fn get(&self, uri: &str, name: &str) -> Option<Arc<dyn ExtensionFilter>> {
        self.filters
            .get(&(uri.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
