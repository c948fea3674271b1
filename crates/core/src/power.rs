//! Power domain reference counts.
//!
//! A domain may be shared (a DCE controller domain covers the timing
//! generator and every front end scanning from it). The sequencer gates a
//! domain only when its last user releases it.

use dc_hal::PowerDomain;
use dc_utils::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PowerDomainRefs {
    refs: HashMap<PowerDomain, u32>,
}

impl PowerDomainRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference. Returns `true` on the first one; the caller ungates.
    pub fn acquire(&mut self, domain: PowerDomain) -> bool {
        let count = self.refs.entry(domain).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop a reference. Returns `true` when the last one goes; the caller
    /// gates. Releasing an unreferenced domain is ignored.
    pub fn release(&mut self, domain: PowerDomain) -> bool {
        match self.refs.get_mut(&domain) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.refs.remove(&domain);
                true
            }
            None => {
                log::warn!("[HWSEQ] release of unreferenced domain {:?}", domain);
                false
            }
        }
    }

    pub fn count(&self, domain: PowerDomain) -> u32 {
        self.refs.get(&domain).copied().unwrap_or(0)
    }

    pub fn is_powered(&self, domain: PowerDomain) -> bool {
        self.count(domain) > 0
    }

    /// Forget every reference, e.g. after boot-time gating of all domains.
    pub fn clear(&mut self) {
        self.refs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last_reference_transition() {
        let mut refs = PowerDomainRefs::new();
        let d = PowerDomain::Controller(0);
        assert!(refs.acquire(d));
        assert!(!refs.acquire(d));
        assert_eq!(refs.count(d), 2);
        assert!(!refs.release(d));
        assert!(refs.release(d));
        assert!(!refs.is_powered(d));
    }

    #[test]
    fn test_release_without_acquire_saturates() {
        let mut refs = PowerDomainRefs::new();
        assert!(!refs.release(PowerDomain::Hubp(1)));
        assert_eq!(refs.count(PowerDomain::Hubp(1)), 0);
    }

    #[test]
    fn test_domains_are_independent() {
        let mut refs = PowerDomainRefs::new();
        assert!(refs.acquire(PowerDomain::Hubp(0)));
        assert!(refs.acquire(PowerDomain::Dpp(0)));
        assert!(refs.release(PowerDomain::Hubp(0)));
        assert!(refs.is_powered(PowerDomain::Dpp(0)));
    }
}
