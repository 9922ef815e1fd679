use std::fmt;

use log::warn;

/// Option key the RTSP demuxer reads to pick its transport.
pub const RTSP_TRANSPORT: &str = "rtsp_transport";

/// Delivery mode negotiated with a streamed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMethod {
    /// Unicast RTP, or whatever the demuxer picks by itself.
    Default,
    Multicast,
    Tcp,
    Http,
    /// A name we do not know. Treated as [`TransportMethod::Default`].
    Unrecognized(String),
}

impl TransportMethod {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "" | "rtpuni" | "unicast" | "default" => TransportMethod::Default,
            "rtpmulti" | "multicast" => TransportMethod::Multicast,
            "rtprtsp" | "tcp" => TransportMethod::Tcp,
            "rtprtsphttp" | "http" => TransportMethod::Http,
            _ => TransportMethod::Unrecognized(name.to_string()),
        }
    }

    /// Value for the `rtsp_transport` option, if this method sets one.
    pub fn rtsp_transport(&self) -> Option<&'static str> {
        match self {
            TransportMethod::Multicast => Some("udp_multicast"),
            TransportMethod::Tcp => Some("tcp"),
            TransportMethod::Http => Some("http"),
            TransportMethod::Default | TransportMethod::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMethod::Default => write!(f, "default"),
            TransportMethod::Multicast => write!(f, "multicast"),
            TransportMethod::Tcp => write!(f, "tcp"),
            TransportMethod::Http => write!(f, "http"),
            TransportMethod::Unrecognized(name) => write!(f, "{}", name),
        }
    }
}

/// Ordered `key=value` options handed to the demuxer and then the decoder.
///
/// Each consumer removes the keys it understands, so whatever is left at the
/// end of an open was not recognized by anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDictionary {
    entries: Vec<(String, String)>,
}

impl OptionDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma separated `key=value` list. Malformed entries are
    /// skipped with a warning.
    pub fn parse(options: &str) -> Self {
        let mut dictionary = Self::new();
        for entry in options.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    dictionary.set(key.trim(), value.trim());
                }
                _ => warn!("Could not parse input option '{}' in '{}'", entry, options),
            }
        }
        dictionary
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for OptionDictionary {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut dictionary = Self::new();
        for (key, value) in iter {
            dictionary.set(key, value);
        }
        dictionary
    }
}

/// Where to read from and how. Fixed for the lifetime of an engine.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    address: String,
    method: TransportMethod,
    options: String,
}

impl SourceDescriptor {
    pub fn new(address: impl Into<String>, method: &str, options: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            method: TransportMethod::from_name(method),
            options: options.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn method(&self) -> &TransportMethod {
        &self.method
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    /// Builds the option dictionary for one open attempt: the caller's
    /// options plus the transport selection.
    pub fn open_options(&self) -> OptionDictionary {
        let mut dictionary = OptionDictionary::parse(&self.options);
        match self.method.rtsp_transport() {
            Some(transport) => dictionary.set(RTSP_TRANSPORT, transport),
            None => {
                if let TransportMethod::Unrecognized(name) = &self.method {
                    warn!("Unknown method ({}), using the transport default", name);
                }
            }
        }
        dictionary
    }
}
