use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use smoltcp::wire::{IpAddress, IpEndpoint};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AddressFamily {
    #[serde(rename = "ipv4")]
    Ipv4,
    #[serde(rename = "ipv6")]
    Ipv6,
}

impl AddressFamily {
    /// Guesses the family of `addr:port` text. Only the bracketed `[addr]:port`
    /// form is treated as IPv6.
    pub fn of_endpoint(text: &str) -> AddressFamily {
        if text.trim_start().starts_with('[') {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SocketType {
    #[serde(rename = "tcp", alias = "stream")]
    Stream,
    #[serde(rename = "udp", alias = "datagram")]
    Datagram,
}

impl Display for SocketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketType::Stream => write!(f, "tcp"),
            SocketType::Datagram => write!(f, "udp"),
        }
    }
}

impl std::str::FromStr for SocketType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "stream" => Ok(SocketType::Stream),
            "udp" | "datagram" => Ok(SocketType::Datagram),
            other => Err(Error::InvalidForward(format!("unknown protocol {}", other))),
        }
    }
}

/// A NAT port-forward: traffic reaching `source` on the host is forwarded to
/// `destination` in the guest network. Both endpoints always belong to
/// `family`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ForwardingRule {
    family: AddressFamily,
    socket_type: SocketType,
    source: IpEndpoint,
    destination: IpEndpoint,
}

impl ForwardingRule {
    pub fn new(
        family: AddressFamily,
        socket_type: SocketType,
        source_addr: &str,
        source_port: u16,
        destination_addr: &str,
        destination_port: u16,
    ) -> Result<Self> {
        let source = parse_address(family, source_addr)?;
        let destination = parse_address(family, destination_addr)?;
        Ok(ForwardingRule {
            family,
            socket_type,
            source: IpEndpoint::new(source, source_port),
            destination: IpEndpoint::new(destination, destination_port),
        })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn source(&self) -> IpEndpoint {
        self.source
    }

    pub fn destination(&self) -> IpEndpoint {
        self.destination
    }

    pub fn source_socket_addr(&self) -> SocketAddr {
        endpoint_socket_addr(self.source)
    }

    pub fn destination_socket_addr(&self) -> SocketAddr {
        endpoint_socket_addr(self.destination)
    }
}

impl Display for ForwardingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.socket_type, self.source, self.destination
        )
    }
}

#[derive(Debug, Clone)]
enum EndpointText {
    Split(String, u16),
    Joined(String),
}

/// Collects textual endpoints and parses them all at once in [`RuleBuilder::build`],
/// so a rule either comes out complete or not at all.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    family: AddressFamily,
    socket_type: SocketType,
    source: Option<EndpointText>,
    destination: Option<EndpointText>,
}

impl RuleBuilder {
    pub fn new(family: AddressFamily, socket_type: SocketType) -> Self {
        RuleBuilder {
            family,
            socket_type,
            source: None,
            destination: None,
        }
    }

    pub fn source(mut self, address: impl Into<String>, port: u16) -> Self {
        self.source = Some(EndpointText::Split(address.into(), port));
        self
    }

    pub fn destination(mut self, address: impl Into<String>, port: u16) -> Self {
        self.destination = Some(EndpointText::Split(address.into(), port));
        self
    }

    /// Sets the source from `addr:port` or `[addr]:port` text.
    pub fn source_endpoint(mut self, text: impl Into<String>) -> Self {
        self.source = Some(EndpointText::Joined(text.into()));
        self
    }

    /// Sets the destination from `addr:port` or `[addr]:port` text.
    pub fn destination_endpoint(mut self, text: impl Into<String>) -> Self {
        self.destination = Some(EndpointText::Joined(text.into()));
        self
    }

    pub fn build(self) -> Result<ForwardingRule> {
        let source = self.source.ok_or(Error::MissingEndpoint("source"))?;
        let destination = self
            .destination
            .ok_or(Error::MissingEndpoint("destination"))?;
        let source = parse_endpoint(self.family, &source)?;
        let destination = parse_endpoint(self.family, &destination)?;
        Ok(ForwardingRule {
            family: self.family,
            socket_type: self.socket_type,
            source,
            destination,
        })
    }
}

fn parse_address(family: AddressFamily, text: &str) -> Result<IpAddress> {
    let text = text.trim();
    let address = match family {
        AddressFamily::Ipv4 => text
            .parse::<Ipv4Addr>()
            .map(|addr| IpAddress::Ipv4(addr.into())),
        AddressFamily::Ipv6 => text
            .parse::<Ipv6Addr>()
            .map(|addr| IpAddress::Ipv6(addr.into())),
    };
    address.map_err(|_| Error::InvalidAddress {
        family,
        address: text.to_string(),
    })
}

fn parse_endpoint(family: AddressFamily, text: &EndpointText) -> Result<IpEndpoint> {
    match text {
        EndpointText::Split(address, port) => {
            Ok(IpEndpoint::new(parse_address(family, address)?, *port))
        }

        EndpointText::Joined(joined) => {
            let joined = joined.trim();
            let (address, port) = split_endpoint(family, joined);
            let address = parse_address(family, address)?;
            let Some(port) = port else {
                return Err(Error::InvalidPort(joined.to_string()));
            };
            let port = port
                .parse::<u16>()
                .map_err(|_| Error::InvalidPort(joined.to_string()))?;
            Ok(IpEndpoint::new(address, port))
        }
    }
}

fn split_endpoint(family: AddressFamily, text: &str) -> (&str, Option<&str>) {
    if let Some(rest) = text.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((address, port)) => (address, port.strip_prefix(':')),
            None => (text, None),
        };
    }

    // IPv6 endpoints must be bracketed, otherwise the port is ambiguous.
    if family == AddressFamily::Ipv6 {
        return (text, None);
    }

    match text.rsplit_once(':') {
        Some((address, port)) => (address, Some(port)),
        None => (text, None),
    }
}

fn endpoint_socket_addr(endpoint: IpEndpoint) -> SocketAddr {
    let addr = match endpoint.addr {
        IpAddress::Ipv4(addr) => IpAddr::V4(addr.0.into()),
        IpAddress::Ipv6(addr) => IpAddr::V6(addr.0.into()),
    };
    SocketAddr::new(addr, endpoint.port)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ssh_rule() -> ForwardingRule {
        RuleBuilder::new(AddressFamily::Ipv4, SocketType::Stream)
            .source_endpoint("0.0.0.0:2222")
            .destination_endpoint("10.0.2.15:22")
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_ipv4_endpoints() {
        let rule = ssh_rule();
        assert_eq!(rule.family(), AddressFamily::Ipv4);
        assert_eq!(rule.socket_type(), SocketType::Stream);
        assert_eq!(rule.source_socket_addr().ip().to_string(), "0.0.0.0");
        assert_eq!(rule.source_socket_addr().port(), 2222);
        assert_eq!(rule.destination_socket_addr().ip().to_string(), "10.0.2.15");
        assert_eq!(rule.destination_socket_addr().port(), 22);
        assert_eq!(rule.to_string(), "tcp 0.0.0.0:2222 -> 10.0.2.15:22");
    }

    #[test]
    fn test_split_and_joined_agree() {
        let split = ForwardingRule::new(
            AddressFamily::Ipv4,
            SocketType::Stream,
            "0.0.0.0",
            2222,
            "10.0.2.15",
            22,
        )
        .unwrap();
        assert_eq!(split, ssh_rule());
    }

    #[test]
    fn test_build_ipv6_endpoints() {
        let rule = RuleBuilder::new(AddressFamily::Ipv6, SocketType::Datagram)
            .source_endpoint("[::]:5353")
            .destination("fd00::15", 53)
            .build()
            .unwrap();
        assert_eq!(rule.family(), AddressFamily::Ipv6);
        assert_eq!(
            rule.source_socket_addr(),
            "[::]:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            rule.destination_socket_addr(),
            "[fd00::15]:53".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = RuleBuilder::new(AddressFamily::Ipv4, SocketType::Stream)
            .source_endpoint("bad-ip")
            .destination_endpoint("10.0.2.15:22")
            .build();
        match result {
            Err(Error::InvalidAddress { family, address }) => {
                assert_eq!(family, AddressFamily::Ipv4);
                assert_eq!(address, "bad-ip");
            }
            other => panic!("expected invalid address, got {:?}", other),
        }
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let result = ForwardingRule::new(
            AddressFamily::Ipv6,
            SocketType::Stream,
            "::",
            2222,
            "10.0.2.15",
            22,
        );
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));

        let result = ForwardingRule::new(
            AddressFamily::Ipv4,
            SocketType::Stream,
            "::1",
            2222,
            "10.0.2.15",
            22,
        );
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn test_bad_port_and_missing_endpoint() {
        let result = RuleBuilder::new(AddressFamily::Ipv4, SocketType::Stream)
            .source_endpoint("0.0.0.0:http")
            .destination_endpoint("10.0.2.15:22")
            .build();
        assert!(matches!(result, Err(Error::InvalidPort(_))));

        let result = RuleBuilder::new(AddressFamily::Ipv4, SocketType::Stream)
            .source_endpoint("0.0.0.0:2222")
            .build();
        assert!(matches!(result, Err(Error::MissingEndpoint("destination"))));
    }

    #[test]
    fn test_equality_distinguishes_every_field() {
        let base = ssh_rule();
        assert_eq!(base, base.clone());

        let variants = [
            ForwardingRule::new(
                AddressFamily::Ipv4,
                SocketType::Datagram,
                "0.0.0.0",
                2222,
                "10.0.2.15",
                22,
            ),
            ForwardingRule::new(
                AddressFamily::Ipv4,
                SocketType::Stream,
                "127.0.0.1",
                2222,
                "10.0.2.15",
                22,
            ),
            ForwardingRule::new(
                AddressFamily::Ipv4,
                SocketType::Stream,
                "0.0.0.0",
                2223,
                "10.0.2.15",
                22,
            ),
            ForwardingRule::new(
                AddressFamily::Ipv4,
                SocketType::Stream,
                "0.0.0.0",
                2222,
                "10.0.2.16",
                22,
            ),
            ForwardingRule::new(
                AddressFamily::Ipv4,
                SocketType::Stream,
                "0.0.0.0",
                2222,
                "10.0.2.15",
                23,
            ),
            ForwardingRule::new(AddressFamily::Ipv6, SocketType::Stream, "::", 2222, "::1", 22),
        ];

        for other in variants {
            let other = other.unwrap();
            assert_ne!(base, other);
            assert_ne!(other, base);
        }
    }

    #[test]
    fn test_ipv4_endpoints_decode_to_input() {
        let cases = [
            ("0.0.0.0", 2222, "10.0.2.15", 22),
            ("255.255.255.255", 65535, "0.0.0.0", 0),
            ("127.0.0.1", 0, "255.255.255.255", 65535),
            ("192.168.100.254", 8080, "172.16.31.7", 80),
            ("1.2.3.4", 1, "10.0.2.2", 65534),
            ("203.0.113.99", 443, "100.64.0.1", 4433),
        ];

        for (source_addr, source_port, destination_addr, destination_port) in cases {
            let split = RuleBuilder::new(AddressFamily::Ipv4, SocketType::Stream)
                .source(source_addr, source_port)
                .destination(destination_addr, destination_port)
                .build()
                .unwrap();
            let joined = RuleBuilder::new(AddressFamily::Ipv4, SocketType::Datagram)
                .source_endpoint(format!("{}:{}", source_addr, source_port))
                .destination_endpoint(format!("{}:{}", destination_addr, destination_port))
                .build()
                .unwrap();

            for rule in [&split, &joined] {
                let source = rule.source_socket_addr();
                let destination = rule.destination_socket_addr();
                assert_eq!(source.ip().to_string(), source_addr);
                assert_eq!(source.port(), source_port);
                assert_eq!(destination.ip().to_string(), destination_addr);
                assert_eq!(destination.port(), destination_port);
            }
            assert_eq!(split.source(), joined.source());
            assert_eq!(split.destination(), joined.destination());
        }
    }

    #[test]
    fn test_unbracketed_ipv6_endpoint_rejected() {
        for text in ["fd00::1", "fd00::15:53"] {
            let result = RuleBuilder::new(AddressFamily::Ipv6, SocketType::Stream)
                .source_endpoint(text)
                .destination_endpoint("[fd00::15]:22")
                .build();
            match result {
                Err(Error::InvalidPort(endpoint)) => assert_eq!(endpoint, text),
                other => panic!("expected invalid port for {}, got {:?}", text, other),
            }
        }

        let result = RuleBuilder::new(AddressFamily::Ipv6, SocketType::Stream)
            .source_endpoint("not-an-address")
            .destination_endpoint("[fd00::15]:22")
            .build();
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn test_family_inference() {
        assert_eq!(AddressFamily::of_endpoint("[::1]:22"), AddressFamily::Ipv6);
        assert_eq!(AddressFamily::of_endpoint("10.0.2.15:22"), AddressFamily::Ipv4);
    }
}
