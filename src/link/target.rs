//! Session target addressing

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Transport used to reach the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TCP client (e.g. SITL on 5760)
    Tcp,
    /// UDP client sending to a fixed address
    Udp,
    /// UDP listener (e.g. 0.0.0.0:14550)
    UdpIn,
}

impl Transport {
    fn scheme(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::UdpIn => "udpin",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    #[error("address '{0}' is missing a port")]
    MissingPort(String),

    #[error("invalid port in address '{0}'")]
    InvalidPort(String),

    #[error("address '{0}' has an empty host")]
    EmptyHost(String),
}

/// Current link address of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl SessionTarget {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: Transport::Tcp,
            host: host.into(),
            port,
        }
    }

    /// Address string understood by `mavlink::connect_async`
    pub fn connection_string(&self) -> String {
        let scheme = match self.transport {
            Transport::Tcp => "tcpout",
            Transport::Udp => "udpout",
            Transport::UdpIn => "udpin",
        };
        format!("{}:{}:{}", scheme, self.host, self.port)
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.transport.scheme(), self.host, self.port)
    }
}

impl FromStr for SessionTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (transport, rest) = if let Some(rest) = raw.strip_prefix("tcpout:") {
            (Transport::Tcp, rest)
        } else if let Some(rest) = raw.strip_prefix("tcp:") {
            (Transport::Tcp, rest)
        } else if let Some(rest) = raw.strip_prefix("udpin:") {
            (Transport::UdpIn, rest)
        } else if let Some(rest) = raw.strip_prefix("udpout:") {
            (Transport::Udp, rest)
        } else if let Some(rest) = raw.strip_prefix("udp:") {
            (Transport::Udp, rest)
        } else {
            (Transport::Tcp, raw)
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| TargetError::MissingPort(raw.to_string()))?;
        if host.is_empty() {
            return Err(TargetError::EmptyHost(raw.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| TargetError::InvalidPort(raw.to_string()))?;
        if port == 0 {
            return Err(TargetError::InvalidPort(raw.to_string()));
        }

        Ok(Self {
            transport,
            host: host.to_string(),
            port,
        })
    }
}
