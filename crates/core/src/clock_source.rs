//! Clock source reference counting.
//!
//! Each resource context carries its own [`ClockSourceRegistry`]: one slot per
//! PLL plus the DP DTO, each with a reference count and the timing it is
//! currently generating. The registry only reasons about availability; the
//! hardware is touched by the sequencer.

use alloc::vec::Vec;

use dc_error::define_dc_error;
use dc_hal::{ClockSourceId, ClockSourceKind, SignalType};

define_dc_error! {
    pub enum ClockSourceError(0x31) {
        /// No shareable or idle source for the requirement
        NotAvailable = 0x01 [ResourceExhaustion] => "No clock source available",
        /// Released more often than acquired
        RefCountUnderflow = 0x02 [Internal] => "Clock source refcount underflow",
        /// Handle does not belong to this pool
        UnknownSource = 0x03 [Internal] => "Unknown clock source",
        /// A pipe kept its reference but the new snapshot dropped the source
        RetiredStillReferenced = 0x04 [Internal] => "Clock source held by a kept pipe",
    }
}

/// What a stream needs from its clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRequirement {
    pub signal: SignalType,
    pub pix_clk_khz: u32,
    pub h_total: u32,
    pub v_total: u32,
}

impl ClockRequirement {
    /// DP and virtual signals run off the DTO.
    pub fn wants_dto(&self) -> bool {
        self.signal.is_dp() || self.signal.is_virtual()
    }

    /// Two TMDS streams may share a PLL when they run the same pixel clock
    /// and scan geometry and are the same signal class.
    fn can_share_pll_with(&self, other: &Self) -> bool {
        if self.wants_dto() || other.wants_dto() {
            return false;
        }
        let same_class = (self.signal.is_hdmi() && other.signal.is_hdmi())
            || (self.signal.is_dvi() && other.signal.is_dvi());
        same_class
            && self.pix_clk_khz == other.pix_clk_khz
            && self.h_total == other.h_total
            && self.v_total == other.v_total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    id: ClockSourceId,
    ref_count: u32,
    usage: Option<ClockRequirement>,
}

impl Slot {
    fn kind(&self) -> ClockSourceKind {
        match self.id {
            ClockSourceId::Pll(_) => ClockSourceKind::Pll,
            ClockSourceId::DpDto => ClockSourceKind::DpDto,
        }
    }
}

/// Per-snapshot reference counts for every clock source in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSourceRegistry {
    slots: Vec<Slot>,
}

impl ClockSourceRegistry {
    pub fn new(ids: &[ClockSourceId]) -> Self {
        Self {
            slots: ids
                .iter()
                .map(|&id| Slot {
                    id,
                    ref_count: 0,
                    usage: None,
                })
                .collect(),
        }
    }

    /// Number of sources in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Sources with a non-zero reference count.
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| s.ref_count > 0).count()
    }

    pub fn ref_count(&self, id: ClockSourceId) -> u32 {
        self.slot(id).map_or(0, |s| s.ref_count)
    }

    pub fn ids(&self) -> impl Iterator<Item = ClockSourceId> + '_ {
        self.slots.iter().map(|s| s.id)
    }

    fn slot(&self, id: ClockSourceId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    fn slot_mut(&mut self, id: ClockSourceId) -> Result<&mut Slot, ClockSourceError> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ClockSourceError::UnknownSource)
    }

    /// Pick and reference a source for `req`.
    ///
    /// With `allow_sharing`, a PLL already generating a compatible timing is
    /// reused before an idle one is taken.
    pub fn acquire(
        &mut self,
        req: &ClockRequirement,
        allow_sharing: bool,
    ) -> Result<ClockSourceId, ClockSourceError> {
        if req.signal == SignalType::None {
            return Err(ClockSourceError::NotAvailable);
        }

        let index = if req.wants_dto() {
            self.slots
                .iter()
                .position(|s| s.kind() == ClockSourceKind::DpDto)
        } else {
            let shared = allow_sharing
                .then(|| {
                    self.slots.iter().position(|s| {
                        s.kind() == ClockSourceKind::Pll
                            && s.ref_count > 0
                            && s.usage.is_some_and(|u| u.can_share_pll_with(req))
                    })
                })
                .flatten();
            shared.or_else(|| {
                self.slots
                    .iter()
                    .position(|s| s.kind() == ClockSourceKind::Pll && s.ref_count == 0)
            })
        };

        let slot = index
            .and_then(|i| self.slots.get_mut(i))
            .ok_or(ClockSourceError::NotAvailable)?;
        slot.ref_count += 1;
        if slot.usage.is_none() {
            slot.usage = Some(*req);
        }
        log::trace!(
            "[CLK] acquire {:?} for {} @ {} kHz -> refcount {}",
            slot.id,
            req.signal.name(),
            req.pix_clk_khz,
            slot.ref_count
        );
        Ok(slot.id)
    }

    /// Reference `id` on behalf of a pipe copied from a previous snapshot.
    pub fn retain(&mut self, id: ClockSourceId, req: &ClockRequirement) -> Result<(), ClockSourceError> {
        let slot = self.slot_mut(id)?;
        slot.ref_count += 1;
        if slot.usage.is_none() {
            slot.usage = Some(*req);
        }
        Ok(())
    }

    /// Drop one reference. Returns the remaining count.
    pub fn release(&mut self, id: ClockSourceId) -> Result<u32, ClockSourceError> {
        let slot = self.slot_mut(id)?;
        if slot.ref_count == 0 {
            log::error!("[CLK] refcount underflow on {:?}", id);
            return Err(ClockSourceError::RefCountUnderflow);
        }
        slot.ref_count -= 1;
        if slot.ref_count == 0 {
            slot.usage = None;
        }
        Ok(slot.ref_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClockSourceRegistry {
        ClockSourceRegistry::new(&[
            ClockSourceId::Pll(0),
            ClockSourceId::Pll(1),
            ClockSourceId::DpDto,
        ])
    }

    fn hdmi_1080p() -> ClockRequirement {
        ClockRequirement {
            signal: SignalType::Hdmi,
            pix_clk_khz: 148_500,
            h_total: 2200,
            v_total: 1125,
        }
    }

    #[test]
    fn test_identical_tmds_streams_share() {
        let mut reg = registry();
        let a = reg.acquire(&hdmi_1080p(), true).unwrap();
        let b = reg.acquire(&hdmi_1080p(), true).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.ref_count(a), 2);
        assert_eq!(reg.outstanding(), 1);

        assert_eq!(reg.release(a), Ok(1));
        assert_eq!(reg.ref_count(a), 1);
    }

    #[test]
    fn test_sharing_disabled_takes_idle_pll() {
        let mut reg = registry();
        let a = reg.acquire(&hdmi_1080p(), false).unwrap();
        let b = reg.acquire(&hdmi_1080p(), false).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            reg.acquire(&hdmi_1080p(), false),
            Err(ClockSourceError::NotAvailable)
        );
        // Sharing still succeeds once PLLs run out
        assert!(reg.acquire(&hdmi_1080p(), true).is_ok());
    }

    #[test]
    fn test_no_sharing_across_signal_class() {
        let mut reg = registry();
        let hdmi = reg.acquire(&hdmi_1080p(), true).unwrap();
        let dvi = reg
            .acquire(
                &ClockRequirement {
                    signal: SignalType::DviSingleLink,
                    ..hdmi_1080p()
                },
                true,
            )
            .unwrap();
        assert_ne!(hdmi, dvi);
    }

    #[test]
    fn test_no_sharing_on_different_timing() {
        let mut reg = registry();
        let a = reg.acquire(&hdmi_1080p(), true).unwrap();
        let b = reg
            .acquire(
                &ClockRequirement {
                    v_total: 1126,
                    ..hdmi_1080p()
                },
                true,
            )
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dp_uses_dto() {
        let mut reg = registry();
        let dp = ClockRequirement {
            signal: SignalType::DisplayPort,
            ..hdmi_1080p()
        };
        assert_eq!(reg.acquire(&dp, false), Ok(ClockSourceId::DpDto));
        assert_eq!(reg.acquire(&dp, false), Ok(ClockSourceId::DpDto));
        assert_eq!(reg.ref_count(ClockSourceId::DpDto), 2);
        // PLLs untouched
        assert_eq!(reg.ref_count(ClockSourceId::Pll(0)), 0);
    }

    #[test]
    fn test_underflow_is_reported() {
        let mut reg = registry();
        assert_eq!(
            reg.release(ClockSourceId::Pll(0)),
            Err(ClockSourceError::RefCountUnderflow)
        );
        assert_eq!(
            reg.release(ClockSourceId::Pll(7)),
            Err(ClockSourceError::UnknownSource)
        );
    }

    #[test]
    fn test_released_pll_forgets_usage() {
        let mut reg = registry();
        let a = reg.acquire(&hdmi_1080p(), true).unwrap();
        reg.release(a).unwrap();
        let other = ClockRequirement {
            pix_clk_khz: 74_250,
            h_total: 1650,
            v_total: 750,
            ..hdmi_1080p()
        };
        let b = reg.acquire(&other, true).unwrap();
        assert_eq!(a, b);
        // New usage recorded, old timing no longer shares
        let c = reg.acquire(&hdmi_1080p(), true).unwrap();
        assert_ne!(b, c);
    }

    #[test]
    fn test_refcount_conservation_over_sequence() {
        let mut reg = registry();
        let reqs = [
            hdmi_1080p(),
            ClockRequirement {
                signal: SignalType::DisplayPort,
                ..hdmi_1080p()
            },
            ClockRequirement {
                pix_clk_khz: 594_000,
                h_total: 4400,
                v_total: 2250,
                ..hdmi_1080p()
            },
            ClockRequirement {
                pix_clk_khz: 25_175,
                h_total: 800,
                v_total: 525,
                ..hdmi_1080p()
            },
        ];
        let mut held = Vec::new();
        // Deterministic interleaving of acquires and releases
        for step in 0..64usize {
            let req = &reqs[step % reqs.len()];
            if step % 3 == 2 {
                if let Some(id) = held.pop() {
                    reg.release(id).unwrap();
                }
            } else if let Ok(id) = reg.acquire(req, step % 2 == 0) {
                held.push(id);
            }
            assert!(reg.outstanding() <= reg.capacity());
            let total: u32 = reg.ids().map(|id| reg.ref_count(id)).sum();
            assert_eq!(total as usize, held.len());
        }
        while let Some(id) = held.pop() {
            reg.release(id).unwrap();
        }
        assert_eq!(reg.outstanding(), 0);
    }
}
