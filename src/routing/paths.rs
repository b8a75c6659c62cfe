//! Path/method lookup for shared path listeners.
//!
//! Exact `(method, path)` keys are checked first, then glob patterns in
//! registration order. In globs `*` also crosses `/`, so `/glob/v*/*`
//! matches `/glob/v2/things`.

use std::collections::HashMap;

use axum::http::Method;
use glob::Pattern;

/// Maps a method and path to a value, typically a path source queue.
#[derive(Debug)]
pub struct PathRouter<T> {
    exact: HashMap<(Method, String), T>,
    globs: Vec<(Method, Pattern, T)>,
}

impl<T> Default for PathRouter<T> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            globs: Vec::new(),
        }
    }
}

impl<T> PathRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. Paths containing glob metacharacters also become
    /// patterns. Returns false if the exact key was already taken.
    pub fn insert(&mut self, method: Method, path: &str, value: T) -> Result<bool, glob::PatternError>
    where
        T: Clone,
    {
        let key = (method.clone(), path.to_string());
        if self.exact.contains_key(&key) {
            return Ok(false);
        }
        if is_glob(path) {
            let pattern = Pattern::new(path)?;
            self.globs.push((method, pattern, value.clone()));
        }
        self.exact.insert(key, value);
        Ok(true)
    }

    pub fn get(&self, method: &Method, path: &str) -> Option<&T> {
        if let Some(value) = self.exact.get(&(method.clone(), path.to_string())) {
            return Some(value);
        }
        self.globs
            .iter()
            .find(|(m, pattern, _)| m == method && pattern.matches(path))
            .map(|(_, _, value)| value)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}
