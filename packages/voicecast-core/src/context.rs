//! Where the voice bridge can reach this server.
//!
//! The bridge posts stream-ended notifications back to us, so provisioning
//! has to hand it a callback URL. The port is only known once the listener is
//! bound, hence the shared atomic.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::protocol_constants::STREAM_ENDED_CALLBACK_PATH;

/// Advertise address plus the (possibly late-bound) HTTP port.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    port: Arc<AtomicU16>,
    advertise_ip: IpAddr,
}

impl NetworkContext {
    /// Uses an advertise IP taken from configuration.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(AtomicU16::new(bind_port)),
            advertise_ip,
        }
    }

    /// Asks `ip_detector` for the advertise IP.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Detection`] when no usable interface is found.
    pub fn auto_detect(
        preferred_port: u16,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        Ok(Self::explicit(preferred_port, ip_detector.detect()?))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::from([127, 0, 0, 1]))
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn advertise_ip(&self) -> IpAddr {
        self.advertise_ip
    }

    /// Records the port the listener actually bound.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
    }

    /// URL the voice bridge posts `StreamEnded` notifications to.
    #[must_use]
    pub fn stream_ended_callback_url(&self) -> String {
        let host = match self.advertise_ip {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{ip}]"),
        };
        format!("http://{host}:{}{STREAM_ENDED_CALLBACK_PATH}", self.port())
    }
}

/// Source of the local advertise IP.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<IpAddr, NetworkError>;
}

/// Picks the address of the default outbound interface.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<IpAddr, NetworkError> {
        local_ip_address::local_ip().map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}
