use crate::log::Error;
use serde::Serialize;
use serde_json::{to_value, Map, Value};

/// Collects the arguments a template is rendered with.
///
/// Values are serialized into [`Value`] as they are inserted.
#[derive(Debug, Default, Clone)]
pub struct Store {
    data: Map<String, Value>,
}

impl Store {
    /// Create a new [`Store`].
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::Store;
    ///
    /// let store = Store::new();
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::Store;
    ///
    /// let mut store = Store::new();
    /// let result = store.insert("name", "taylor");
    ///
    /// assert!(result.is_ok());
    /// ```
    pub fn insert<S, T>(&mut self, key: S, value: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        let key = key.into();
        let value = to_value(value)
            .map_err(|e| Error::build(format!("value of `{key}` is unserializable")).with_help(e.to_string()))?;
        self.data.insert(key, value);

        Ok(())
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    pub fn with<S, T>(mut self, key: S, value: T) -> Result<Self, Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Panics
    ///
    /// Panics if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::Store;
    ///
    /// let store = Store::new()
    ///     .with_must("name", "taylor")
    ///     .with_must("items", vec![1, 2, 3]);
    ///
    /// assert_eq!(store.get("items").unwrap().as_array().unwrap().len(), 3);
    /// ```
    #[inline]
    pub fn with_must<S, T>(mut self, key: S, value: T) -> Self
    where
        S: Into<String>,
        T: Serialize,
    {
        self.data.insert(key.into(), to_value(value).unwrap());
        self
    }

    /// Get the value of the given key, if any.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Return the collected arguments.
    #[inline]
    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

impl From<Store> for Map<String, Value> {
    fn from(store: Store) -> Self {
        store.into_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct User {
        name: &'static str,
        admin: bool,
    }

    #[test]
    fn test_insert() {
        let mut store = Store::new();
        assert!(store.insert("one", "two").is_ok());

        assert!(store.get("one").is_some_and(|t| t.as_str() == Some("two")));
    }

    #[test]
    fn test_insert_struct() -> Result<(), Error> {
        let store = Store::new().with("user", User { name: "taylor", admin: true })?;
        let map: Map<String, Value> = store.into();

        assert_eq!(map["user"]["name"], "taylor");
        assert_eq!(map["user"]["admin"], true);

        Ok(())
    }
}
