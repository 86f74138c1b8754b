use std::net::{SocketAddrV4, SocketAddrV6};
use std::sync::Arc;

use log::trace;
use nix::sys::socket::{SockaddrLike, SockaddrStorage};
use smoltcp::wire::{IpAddress, Ipv4Address, Ipv6Address};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MappingOutcome {
    Failed,
    AsIs,
    Mapped,
}

/// Verdict of an inbound remap: the source address to forward with, or
/// `Failed` if the connection should be rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SourceMapping<A> {
    AsIs(A),
    Mapped(A),
    Failed,
}

impl<A: Copy> SourceMapping<A> {
    pub fn outcome(&self) -> MappingOutcome {
        match self {
            SourceMapping::AsIs(_) => MappingOutcome::AsIs,
            SourceMapping::Mapped(_) => MappingOutcome::Mapped,
            SourceMapping::Failed => MappingOutcome::Failed,
        }
    }

    pub fn address(&self) -> Option<A> {
        match self {
            SourceMapping::AsIs(address) | SourceMapping::Mapped(address) => Some(*address),
            SourceMapping::Failed => None,
        }
    }

    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> SourceMapping<B> {
        match self {
            SourceMapping::AsIs(address) => SourceMapping::AsIs(f(address)),
            SourceMapping::Mapped(address) => SourceMapping::Mapped(f(address)),
            SourceMapping::Failed => SourceMapping::Failed,
        }
    }
}

pub trait InboundRemap<A>: Send + Sync {
    fn remap_inbound(&self, peer: A) -> SourceMapping<A>;
}

/// Connections from the host's own loopback appear to the guest as coming
/// from the gateway's host-loopback address. Any other peer keeps its address.
#[derive(Debug, Clone)]
pub struct LoopbackRemap {
    host_loopback_ipv4: Option<Ipv4Address>,
    host_loopback_ipv6: Option<Ipv6Address>,
}

impl LoopbackRemap {
    pub fn new(
        host_loopback_ipv4: Option<Ipv4Address>,
        host_loopback_ipv6: Option<Ipv6Address>,
    ) -> Self {
        LoopbackRemap {
            host_loopback_ipv4,
            host_loopback_ipv6,
        }
    }
}

impl InboundRemap<Ipv4Address> for LoopbackRemap {
    fn remap_inbound(&self, peer: Ipv4Address) -> SourceMapping<Ipv4Address> {
        if !peer.is_loopback() {
            return SourceMapping::AsIs(peer);
        }

        match self.host_loopback_ipv4 {
            Some(address) => SourceMapping::Mapped(address),
            None => SourceMapping::Failed,
        }
    }
}

impl InboundRemap<Ipv6Address> for LoopbackRemap {
    fn remap_inbound(&self, peer: Ipv6Address) -> SourceMapping<Ipv6Address> {
        if !peer.is_loopback() {
            return SourceMapping::AsIs(peer);
        }

        match self.host_loopback_ipv6 {
            Some(address) => SourceMapping::Mapped(address),
            None => SourceMapping::Failed,
        }
    }
}

/// Picks the NAT-visible source address for a forwarded connection by
/// handing the peer to the remap policy of its address family.
#[derive(Clone)]
pub struct SourceResolver {
    ipv4: Arc<dyn InboundRemap<Ipv4Address>>,
    ipv6: Arc<dyn InboundRemap<Ipv6Address>>,
}

impl SourceResolver {
    pub fn new(
        ipv4: Arc<dyn InboundRemap<Ipv4Address>>,
        ipv6: Arc<dyn InboundRemap<Ipv6Address>>,
    ) -> Self {
        SourceResolver { ipv4, ipv6 }
    }

    pub fn with_policy<P>(policy: P) -> Self
    where
        P: InboundRemap<Ipv4Address> + InboundRemap<Ipv6Address> + 'static,
    {
        let policy = Arc::new(policy);
        SourceResolver {
            ipv4: policy.clone(),
            ipv6: policy,
        }
    }

    pub fn resolve_source(&self, peer: &SockaddrStorage) -> SourceMapping<IpAddress> {
        if let Some(peer) = peer.as_sockaddr_in() {
            let peer = SocketAddrV4::from(*peer);
            let address = Ipv4Address::from(*peer.ip());
            return self.ipv4.remap_inbound(address).map(IpAddress::Ipv4);
        }

        if let Some(peer) = peer.as_sockaddr_in6() {
            let peer = SocketAddrV6::from(*peer);
            let address = Ipv6Address::from(*peer.ip());
            return self.ipv6.remap_inbound(address).map(IpAddress::Ipv6);
        }

        trace!("no inbound remap for peer family {:?}", peer.family());
        SourceMapping::Failed
    }
}
