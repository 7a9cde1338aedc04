//! Protocol version, request line and status line.

use std::fmt;

use crate::codec::ProtocolError;

/// `HTTP/1.1`-style protocol token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    protocol: String,
    major: u8,
    minor: u8,
}

impl ProtocolVersion {
    pub fn new(protocol: impl Into<String>, major: u8, minor: u8) -> Self {
        Self {
            protocol: protocol.into(),
            major,
            minor,
        }
    }

    pub fn http_10() -> Self {
        Self::new("HTTP", 1, 0)
    }

    pub fn http_11() -> Self {
        Self::new("HTTP", 1, 1)
    }

    pub fn parse(token: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidVersion(token.to_string());

        let (protocol, numbers) = token.split_once('/').ok_or_else(invalid)?;
        let (major, minor) = numbers.split_once('.').ok_or_else(invalid)?;
        if protocol.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            protocol: protocol.to_string(),
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Whether connections default to persistent for this version.
    pub fn is_persistent_by_default(&self) -> bool {
        (self.major, self.minor) >= (1, 1)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.protocol, self.major, self.minor)
    }
}

/// `VERB target VERSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    verb: String,
    uri: String,
    version: ProtocolVersion,
}

impl RequestLine {
    pub fn new(verb: impl Into<String>, uri: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            verb: verb.into(),
            uri: uri.into(),
            version,
        }
    }

    /// Split on the first and last space.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidRequestLine(line.to_string());

        let first = line.find(' ').ok_or_else(invalid)?;
        let last = line.rfind(' ').ok_or_else(invalid)?;
        if first == last {
            return Err(invalid());
        }

        let verb = &line[..first];
        let uri = &line[first + 1..last];
        if verb.is_empty() || uri.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            verb: verb.to_string(),
            uri: uri.to_string(),
            version: ProtocolVersion::parse(&line[last + 1..])?,
        })
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &ProtocolVersion {
        &self.version
    }

    pub fn is_verb(&self, verb: &str) -> bool {
        self.verb.eq_ignore_ascii_case(verb)
    }

    /// Whether the target is in absolute form (`scheme://authority/...`).
    pub fn is_absolute(&self) -> bool {
        self.uri.contains("://")
    }

    /// The line to send upstream: absolute targets become `path?query`.
    pub fn origin_form(&self) -> RequestLine {
        if !self.is_absolute() {
            return self.clone();
        }

        let target = match url::Url::parse(&self.uri) {
            Ok(url) => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            Err(_) => return self.clone(),
        };

        Self::new(self.verb.clone(), target, self.version.clone())
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.verb, self.uri, self.version)
    }
}

/// `VERSION code description`.
///
/// The code stays textual since upstreams are not guaranteed to send digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    version: ProtocolVersion,
    code: String,
    description: String,
}

impl StatusLine {
    pub fn new(
        version: ProtocolVersion,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            version,
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidStatusLine(line.to_string());

        let (version, rest) = line.split_once(' ').ok_or_else(invalid)?;
        let (code, description) = rest.split_once(' ').unwrap_or((rest, ""));
        if code.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            version: ProtocolVersion::parse(version)?,
            code: code.to_string(),
            description: description.to_string(),
        })
    }

    pub fn version(&self) -> &ProtocolVersion {
        &self.version
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status_code(&self) -> Option<u16> {
        self.code.parse().ok()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.code, self.description)
    }
}
