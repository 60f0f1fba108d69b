//! Composite bucket keys.

use std::fmt;

const SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Key addressing the budget of one user of one client for one service.
///
/// Components are escaped before they are joined, so two different
/// `(service, client, user)` triples never map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Derives the key for a service, client and user.
    pub fn derive(service_id: &str, client_id: &str, user_id: &str) -> Self {
        let mut key = String::with_capacity(service_id.len() + client_id.len() + user_id.len() + 2);

        push_escaped(&mut key, service_id);
        key.push(SEPARATOR);
        push_escaped(&mut key, client_id);
        key.push(SEPARATOR);
        push_escaped(&mut key, user_id);

        Self(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

fn push_escaped(key: &mut String, component: &str) {
    for c in component.chars() {
        if c == SEPARATOR || c == ESCAPE {
            key.push(ESCAPE);
        }

        key.push(c);
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
