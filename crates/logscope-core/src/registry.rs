//! Named registries for stream filters and entry parsers.
//!
//! A [`Registry`] is an ordinary value built at startup and handed to
//! whatever needs lookups. Registering a name twice is a programming error
//! and panics; looking up an unknown name is a [`ConfigError`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;

use crate::error::ConfigError;
use crate::source::EntrySource;

/// A byte stream handed between filters and parsers.
pub type ByteStream = Box<dyn BufRead + Send>;

/// Constructor of a stream filter.
pub type FilterFn = fn(ByteStream) -> ByteStream;

/// Constructor of an entry source over a byte stream.
pub type ParserFn = fn(ByteStream) -> Box<dyn EntrySource>;

/// Registry of stream filters.
pub type FilterRegistry = Registry<FilterFn>;

/// Registry of entry parsers.
pub type ParserRegistry = Registry<ParserFn>;

/// Name-keyed table of constructors.
pub struct Registry<C> {
    items: BTreeMap<String, C>,
    unknown: fn(String) -> ConfigError,
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.items.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C: Copy> Registry<C> {
    /// Creates an empty registry; `unknown` builds the error for failed lookups.
    #[must_use]
    pub fn new(unknown: fn(String) -> ConfigError) -> Self {
        Self {
            items: BTreeMap::new(),
            unknown,
        }
    }

    /// Registers `constructor` under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn register(&mut self, name: impl Into<String>, constructor: C) -> &mut Self {
        let name = name.into();
        assert!(
            !self.items.contains_key(&name),
            "already registered: {name}"
        );
        self.items.insert(name, constructor);
        self
    }

    /// Looks up `name`.
    pub fn get(&self, name: &str) -> Result<C, ConfigError> {
        self.items
            .get(name)
            .copied()
            .ok_or_else(|| (self.unknown)(name.to_string()))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

impl FilterRegistry {
    /// Creates an empty filter registry.
    #[must_use]
    pub fn filters() -> Self {
        Self::new(ConfigError::UnknownFilter)
    }

    /// Wraps `source` in the named filters, first name innermost.
    ///
    /// Every name is resolved before any filter is applied.
    pub fn chain<S: AsRef<str>>(&self, names: &[S], source: ByteStream) -> Result<ByteStream, ConfigError> {
        let filters = names
            .iter()
            .map(|name| self.get(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(filters.into_iter().fold(source, |stream, filter| filter(stream)))
    }
}

impl ParserRegistry {
    /// Creates an empty parser registry.
    #[must_use]
    pub fn parsers() -> Self {
        Self::new(ConfigError::UnknownParser)
    }

    /// Opens the named parser over `source`.
    pub fn open(&self, name: &str, source: ByteStream) -> Result<Box<dyn EntrySource>, ConfigError> {
        Ok(self.get(name)?(source))
    }
}
