use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Connection admission limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 5,
        }
    }
}

/// Reason a connection was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitRejection {
    TotalLimitReached,
    IpLimitReached,
}

impl std::fmt::Display for RateLimitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalLimitReached => write!(f, "server at max connections"),
            Self::IpLimitReached => write!(f, "too many connections from this IP"),
        }
    }
}

/// Tracks connection counts per IP and total.
/// Shared across the accept loop and connection tasks via Arc<Mutex>.
#[derive(Debug)]
pub struct ConnectionLimiter {
    config: RateLimitConfig,
    total: usize,
    per_ip: BTreeMap<IpAddr, usize>,
}

pub type SharedLimiter = Arc<Mutex<ConnectionLimiter>>;

impl ConnectionLimiter {
    pub fn new(config: RateLimitConfig) -> SharedLimiter {
        Arc::new(Mutex::new(Self {
            config,
            total: 0,
            per_ip: BTreeMap::new(),
        }))
    }

    /// Try to admit a new connection.
    pub fn try_admit(&mut self, ip: IpAddr) -> Result<(), RateLimitRejection> {
        if self.total >= self.config.max_connections_total {
            return Err(RateLimitRejection::TotalLimitReached);
        }
        let count = self.per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(RateLimitRejection::IpLimitReached);
        }
        *count += 1;
        self.total += 1;
        Ok(())
    }

    /// Count a connection without checking limits.
    pub fn force_admit(&mut self, ip: Option<IpAddr>) {
        if let Some(ip) = ip {
            *self.per_ip.entry(ip).or_insert(0) += 1;
        }
        self.total += 1;
    }

    /// Release a connection slot when a client disconnects.
    pub fn release(&mut self, ip: Option<IpAddr>) {
        if let Some(ip) = ip {
            if let Some(count) = self.per_ip.get_mut(&ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.per_ip.remove(&ip);
                }
            }
        }
        self.total = self.total.saturating_sub(1);
    }

    pub fn total_connections(&self) -> usize {
        self.total
    }
}

fn lock(limiter: &SharedLimiter) -> MutexGuard<'_, ConnectionLimiter> {
    limiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A held connection slot. Released when dropped.
#[derive(Debug)]
pub struct ConnectionPermit {
    limiter: SharedLimiter,
    ip: Option<IpAddr>,
}

impl ConnectionPermit {
    /// Admit a freshly accepted connection, subject to the limits.
    pub fn acquire(limiter: &SharedLimiter, ip: IpAddr) -> Result<Self, RateLimitRejection> {
        lock(limiter).try_admit(ip)?;
        Ok(Self {
            limiter: Arc::clone(limiter),
            ip: Some(ip),
        })
    }

    /// Admit a connection inherited across a hot restart. Never rejected.
    pub fn inherited(limiter: &SharedLimiter, ip: Option<IpAddr>) -> Self {
        lock(limiter).force_admit(ip);
        Self {
            limiter: Arc::clone(limiter),
            ip,
        }
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        lock(&self.limiter).release(self.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn connection_limiter_admits_within_limit() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 10,
            max_connections_per_ip: 3,
        });
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let mut l = limiter.lock().unwrap();
        assert!(l.try_admit(ip).is_ok());
        assert!(l.try_admit(ip).is_ok());
        assert!(l.try_admit(ip).is_ok());
        assert_eq!(l.total_connections(), 3);
    }

    #[test]
    fn connection_limiter_rejects_per_ip() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 100,
            max_connections_per_ip: 2,
        });
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut l = limiter.lock().unwrap();
        assert!(l.try_admit(ip).is_ok());
        assert!(l.try_admit(ip).is_ok());
        assert_eq!(l.try_admit(ip), Err(RateLimitRejection::IpLimitReached));
    }

    #[test]
    fn connection_limiter_rejects_total() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 2,
            max_connections_per_ip: 10,
        });
        let mut l = limiter.lock().unwrap();
        let ip1 = IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1));
        let ip2 = IpAddr::V4(Ipv4Addr::new(2, 0, 0, 2));
        let ip3 = IpAddr::V4(Ipv4Addr::new(3, 0, 0, 3));
        assert!(l.try_admit(ip1).is_ok());
        assert!(l.try_admit(ip2).is_ok());
        assert_eq!(l.try_admit(ip3), Err(RateLimitRejection::TotalLimitReached));
    }

    #[test]
    fn permit_releases_on_drop() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 10,
            max_connections_per_ip: 1,
        });
        let ip = IpAddr::V4(Ipv4Addr::new(5, 5, 5, 5));
        let permit = ConnectionPermit::acquire(&limiter, ip).unwrap();
        assert_eq!(
            ConnectionPermit::acquire(&limiter, ip).unwrap_err(),
            RateLimitRejection::IpLimitReached
        );
        drop(permit);
        assert!(ConnectionPermit::acquire(&limiter, ip).is_ok());
        assert_eq!(limiter.lock().unwrap().total_connections(), 0);
    }

    #[test]
    fn inherited_permit_ignores_limits_but_counts() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 1,
            max_connections_per_ip: 1,
        });
        let ip = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
        let _a = ConnectionPermit::inherited(&limiter, Some(ip));
        let _b = ConnectionPermit::inherited(&limiter, Some(ip));
        assert_eq!(limiter.lock().unwrap().total_connections(), 2);
        assert_eq!(
            ConnectionPermit::acquire(&limiter, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap_err(),
            RateLimitRejection::TotalLimitReached
        );
    }
}
