//! Case-insensitive header collection.

use std::fmt;

/// HTTP header fields.
///
/// Names compare case-insensitively and `add` overwrites an existing field of
/// the same name in place. Insertion order is kept for serialization only.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any existing value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Content-Length`, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content-Length")?.trim().parse().ok()
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.get("Transfer-Encoding")
    }

    pub fn connection(&self) -> Option<&str> {
        self.get("Connection")
    }

    pub fn proxy_connection(&self) -> Option<&str> {
        self.get("Proxy-Connection")
    }

    pub fn host(&self) -> Option<&str> {
        self.get("Host")
    }

    pub fn upgrade(&self) -> Option<&str> {
        self.get("Upgrade")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }

    /// Whether the comma-separated field `name` lists `token`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name).is_some_and(|value| list_contains(value, token))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// Case-insensitive membership test on a comma-separated field value.
pub(crate) fn list_contains(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

impl PartialEq for HttpHeaders {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl Eq for HttpHeaders {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HttpHeaders::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        let mut headers = HttpHeaders::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.content_type(), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_last_write_wins() {
        let mut headers = HttpHeaders::new();
        headers.add("Accept", "text/html");
        headers.add("X-Other", "1");
        headers.add("accept", "application/json");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Accept"), Some("application/json"));
        // position of the original field is kept
        assert_eq!(headers.iter().next().map(|(n, _)| n), Some("Accept"));
    }

    #[test]
    fn test_equality_ignores_order() {
        let a: HttpHeaders = [("Host", "a.com"), ("Accept", "*/*")].into_iter().collect();
        let b: HttpHeaders = [("accept", "*/*"), ("HOST", "a.com")].into_iter().collect();
        let c: HttpHeaders = [("Host", "b.com"), ("Accept", "*/*")].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_projections() {
        let headers: HttpHeaders = [
            ("Content-Length", " 42 "),
            ("Transfer-Encoding", "gzip, chunked"),
            ("Connection", "keep-alive, Upgrade"),
        ]
        .into_iter()
        .collect();
        assert_eq!(headers.content_length(), Some(42));
        assert!(headers.has_token("transfer-encoding", "CHUNKED"));
        assert!(headers.has_token("Connection", "upgrade"));
        assert!(!headers.has_token("Connection", "close"));
        assert!(headers.upgrade().is_none());
    }

    #[test]
    fn test_remove() {
        let mut headers: HttpHeaders = [("Transfer-Encoding", "chunked")].into_iter().collect();
        assert_eq!(headers.remove("transfer-encoding").as_deref(), Some("chunked"));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("transfer-encoding"), None);
    }
}
