use std::fmt;
use std::str::FromStr;

use url::Url;

/// Represents a project ID.
pub type ProjectId = u64;

/// Represents a dsn url parsing error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DsnParseError {
    /// The DSN is not a valid URL.
    #[error("no valid url provided")]
    InvalidUrl,
    /// The DSN does not carry a public key.
    #[error("username is empty")]
    NoUsername,
    /// The DSN path is empty.
    #[error("empty path")]
    NoProjectId,
    /// The last path segment is not a numeric project ID.
    #[error("invalid project id")]
    InvalidProjectId,
    /// The scheme is not one of `http`, `https` or `udp`.
    #[error("no valid scheme")]
    InvalidScheme,
}

/// Represents the scheme of a DSN.
///
/// The scheme selects the default transport: `http` and `https` post to the store endpoint, `udp`
/// sends single datagrams.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Fire-and-forget datagrams.
    Udp,
}

impl Scheme {
    /// Returns the default port for this scheme.
    ///
    /// UDP has no default port, it must be given explicitly.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            Scheme::Udp => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Scheme::Https => "https",
            Scheme::Http => "http",
            Scheme::Udp => "udp",
        })
    }
}

/// Represents a Sentry DSN.
///
/// A DSN has the shape `<scheme>://<public_key>[:<secret_key>]@<host>[:<port>][/<path>]/<project_id>`.
/// Everything between the host and the project ID is kept as path prefix and prepended to the
/// store endpoint.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Dsn {
    scheme: Scheme,
    public_key: String,
    secret_key: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    project_id: ProjectId,
}

impl Dsn {
    /// Returns the scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Returns the secret key, if any.
    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the explicit port.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the path prefix without trailing slash, for example `/prefix/sentry`.
    ///
    /// This is empty if the project ID directly follows the host.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the project ID.
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the base URL of the server, without path.
    pub fn server(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Returns the full URL of the store endpoint.
    ///
    /// ```
    /// use raven_common::Dsn;
    ///
    /// let dsn: Dsn = "http://key@sentry.localdomain/prefix/sentry/42".parse().unwrap();
    /// assert_eq!(
    ///     dsn.store_url(),
    ///     "http://sentry.localdomain/prefix/sentry/api/42/store/"
    /// );
    /// ```
    pub fn store_url(&self) -> String {
        format!("{}{}/api/{}/store/", self.server(), self.path, self.project_id)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.public_key)?;
        if let Some(ref secret_key) = self.secret_key {
            write!(f, ":{secret_key}")?;
        }
        write!(f, "@{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}/{}", self.path, self.project_id)?;
        Ok(())
    }
}

impl FromStr for Dsn {
    type Err = DsnParseError;

    fn from_str(s: &str) -> Result<Dsn, DsnParseError> {
        let url = Url::parse(s).map_err(|_| DsnParseError::InvalidUrl)?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "udp" => Scheme::Udp,
            _ => return Err(DsnParseError::InvalidScheme),
        };

        let public_key = match url.username() {
            "" => return Err(DsnParseError::NoUsername),
            username => username.to_owned(),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_owned(),
            _ => return Err(DsnParseError::InvalidUrl),
        };

        let trimmed = url.path().trim_matches('/');
        if trimmed.is_empty() {
            return Err(DsnParseError::NoProjectId);
        }

        let (path, project_id) = match trimmed.rsplit_once('/') {
            Some((prefix, id)) => (format!("/{prefix}"), id),
            None => (String::new(), trimmed),
        };

        let project_id = project_id
            .parse()
            .map_err(|_| DsnParseError::InvalidProjectId)?;

        Ok(Dsn {
            scheme,
            public_key,
            secret_key: url.password().map(str::to_owned),
            host,
            port: url.port(),
            path,
            project_id,
        })
    }
}

crate::impl_str_serde!(Dsn, "a sentry dsn");
