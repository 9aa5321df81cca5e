//! Connection descriptors for the document store and the broker.
//!
//! Both are validated on construction. Neither `Display` nor `Debug` prints
//! a password.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{ConfigError, Result};

/// The only auth mode the store gateway speaks.
pub const DEFAULT_AUTH: &str = "basic";

/// Store user when none is configured.
pub const DEFAULT_USER: &str = "docbridge";

/// Broker port used when the address does not name one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

const REDACTED: &str = "****";

/// Escaped in connection strings: the separators and `%` itself.
const DESCRIPTOR_FIELD: &AsciiSet = &CONTROLS.add(b'%').add(b'?').add(b';');

fn escape(field: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(field, DESCRIPTOR_FIELD)
}

fn unescape<'a>(field: &'a str, what: &str) -> Result<Cow<'a, str>> {
    percent_decode_str(field)
        .decode_utf8()
        .map_err(|_| ConfigError::InvalidDescriptor(format!("{what} is not UTF-8 once unescaped")))
}

/// A fully formed store connection descriptor.
///
/// String form: `endpoint?auth=<mode>;user=<name>;password=<secret>;ssl=<bool>`.
/// Fields are percent-escaped where they contain `%`, `?`, `;` or control
/// characters.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    endpoint: String,
    auth: String,
    user: String,
    password: String,
    ssl: bool,
}

impl ConnectionDescriptor {
    /// Build a descriptor from discrete fields.
    ///
    /// Fails with [`ConfigError::MissingPassword`] when the password is empty.
    pub fn new(
        endpoint: impl Into<String>,
        auth: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        ssl: bool,
    ) -> Result<Self> {
        let descriptor = Self {
            endpoint: endpoint.into(),
            auth: auth.into(),
            user: user.into(),
            password: password.into(),
            ssl,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Parse the string form produced by [`to_connection_string`](Self::to_connection_string).
    ///
    /// Missing `auth`, `user` and `ssl` keys take defaults; the password
    /// must be present.
    pub fn parse(s: &str) -> Result<Self> {
        let (endpoint, params) = s.split_once('?').unwrap_or((s, ""));
        let endpoint = unescape(endpoint, "endpoint")?;

        let mut auth = DEFAULT_AUTH.to_string();
        let mut user = DEFAULT_USER.to_string();
        let mut password = String::new();
        let mut ssl = false;

        for param in params.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').ok_or_else(|| {
                ConfigError::InvalidDescriptor(format!("parameter without value: {param}"))
            })?;
            match key {
                "auth" => auth = unescape(value, key)?.into_owned(),
                "user" => user = unescape(value, key)?.into_owned(),
                "password" => password = unescape(value, key)?.into_owned(),
                "ssl" => {
                    ssl = value.parse().map_err(|_| {
                        ConfigError::InvalidDescriptor(format!("ssl must be true or false, got {value}"))
                    })?
                }
                other => {
                    return Err(ConfigError::InvalidDescriptor(format!(
                        "unknown parameter: {other}"
                    )))
                }
            }
        }

        Self::new(endpoint, auth, user, password, ssl)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        if self.auth != DEFAULT_AUTH {
            return Err(ConfigError::UnsupportedAuth(self.auth.clone()));
        }
        Ok(())
    }

    /// Render the full connection string, password included.
    pub fn to_connection_string(&self) -> String {
        self.render(&self.password)
    }

    fn render(&self, password: &str) -> String {
        format!(
            "{}?auth={};user={};password={};ssl={}",
            escape(&self.endpoint),
            escape(&self.auth),
            escape(&self.user),
            escape(password),
            self.ssl
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth(&self) -> &str {
        &self.auth
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn ssl(&self) -> bool {
        self.ssl
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(REDACTED))
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionDescriptor({})", self)
    }
}

/// Broker host, port and optional credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Parse `[scheme://][user[:password]@]host[:port]`.
    ///
    /// User name and password are percent-decoded, so `p%40ss` reads as `p@ss`.
    /// `tcp://` and `mqtt://` prefixes are accepted. IPv6 hosts must be
    /// bracketed (`[::1]:1883`).
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidBrokerAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("mqtt://"))
            .unwrap_or(s)
            .trim_end_matches('/');

        let (userinfo, hostport) = match rest.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, rest),
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 host"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => return Err(invalid("unexpected text after IPv6 host")),
            };
            (host, port)
        } else {
            match hostport.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (hostport, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            None => DEFAULT_MQTT_PORT,
        };

        let mut address = Self::new(host, port);
        if let Some(userinfo) = userinfo {
            let (username, password) = match userinfo.split_once(':') {
                Some((username, password)) => (username, Some(password)),
                None => (userinfo, None),
            };
            if username.is_empty() {
                return Err(invalid("empty user name"));
            }
            let decode = |part: &str| {
                percent_decode_str(part)
                    .decode_utf8()
                    .map(Cow::into_owned)
                    .map_err(|_| invalid("credentials are not UTF-8 once decoded"))
            };
            address.username = Some(decode(username)?);
            address.password = password.map(decode).transpose()?;
        }

        Ok(address)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(username) = &self.username {
            write!(f, "{username}")?;
            if self.password.is_some() {
                write!(f, ":{REDACTED}")?;
            }
            write!(f, "@")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BrokerAddress({})", self)
    }
}
