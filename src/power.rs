//! Power management - high-frequency clock votes for bus transfers.
//!
//! The node idles on the low-frequency clock. Components that need the
//! crystal-accurate HFCLK (an I²C transfer in flight) hold a vote; the
//! clock is requested when the first vote arrives and released with the
//! last one.
//!
//! nRF52840 clock modes:
//! - LFCLK only: CPU sleeping between events (~3 µA with RTC running)
//! - HFXO requested: crystal running for timing-sensitive peripherals

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// No votes; the HF crystal may stop.
    LowPower,
    /// At least one vote; the HF crystal is requested.
    HighPower,
}

/// Reference-counted high-power votes.
pub struct PowerManager {
    votes: u8,
}

impl PowerManager {
    pub const fn new() -> Self {
        Self { votes: 0 }
    }

    pub fn state(&self) -> PowerState {
        if self.votes == 0 {
            PowerState::LowPower
        } else {
            PowerState::HighPower
        }
    }

    pub fn votes(&self) -> u8 {
        self.votes
    }

    /// Add a vote. Returns the new state if it changed.
    pub fn acquire(&mut self) -> Option<PowerState> {
        let before = self.state();
        self.votes = self.votes.saturating_add(1);
        self.transition(before)
    }

    /// Drop a vote. Releasing with no votes held is ignored.
    pub fn release(&mut self) -> Option<PowerState> {
        if self.votes == 0 {
            warn!("Power: release without a vote");
            return None;
        }
        let before = self.state();
        self.votes -= 1;
        self.transition(before)
    }

    /// Drop every vote, e.g. when the link and sensor are reset.
    pub fn release_all(&mut self) -> Option<PowerState> {
        let before = self.state();
        self.votes = 0;
        self.transition(before)
    }

    fn transition(&self, before: PowerState) -> Option<PowerState> {
        let after = self.state();
        if after == before {
            return None;
        }
        info!("Power: {} -> {}", before, after);
        Some(after)
    }
}

impl Default for PowerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vote_and_last_release_switch_state() {
        let mut pm = PowerManager::new();
        assert_eq!(pm.acquire(), Some(PowerState::HighPower));
        assert_eq!(pm.acquire(), None);
        assert_eq!(pm.votes(), 2);
        assert_eq!(pm.release(), None);
        assert_eq!(pm.release(), Some(PowerState::LowPower));
    }

    #[test]
    fn unbalanced_release_is_ignored() {
        let mut pm = PowerManager::new();
        assert_eq!(pm.release(), None);
        assert_eq!(pm.state(), PowerState::LowPower);
    }

    #[test]
    fn release_all_from_several_votes() {
        let mut pm = PowerManager::new();
        pm.acquire();
        pm.acquire();
        assert_eq!(pm.release_all(), Some(PowerState::LowPower));
        assert_eq!(pm.release_all(), None);
    }
}
