//! Two-button gesture: hold A, click B, release A.
//!
//! The only accepted order is press A → press B → release B → release A.
//! Completing it flips the indication mode. Any other edge sends the
//! sequence back to the first stage; that edge is discarded.

/// Debounced button edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEdge {
    PressA,
    ReleaseA,
    PressB,
    ReleaseB,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GestureStage {
    WaitPressA,
    WaitPressB,
    WaitReleaseB,
    WaitReleaseA,
}

impl GestureStage {
    const fn expects(self) -> ButtonEdge {
        match self {
            GestureStage::WaitPressA => ButtonEdge::PressA,
            GestureStage::WaitPressB => ButtonEdge::PressB,
            GestureStage::WaitReleaseB => ButtonEdge::ReleaseB,
            GestureStage::WaitReleaseA => ButtonEdge::ReleaseA,
        }
    }

    const fn next(self) -> Self {
        match self {
            GestureStage::WaitPressA => GestureStage::WaitPressB,
            GestureStage::WaitPressB => GestureStage::WaitReleaseB,
            GestureStage::WaitReleaseB => GestureStage::WaitReleaseA,
            GestureStage::WaitReleaseA => GestureStage::WaitPressA,
        }
    }
}

pub struct GestureSequencer {
    stage: GestureStage,
    /// Indications requested on (`true`) or off.
    mode: bool,
}

impl GestureSequencer {
    pub const fn new() -> Self {
        Self {
            stage: GestureStage::WaitPressA,
            mode: true,
        }
    }

    pub fn stage(&self) -> GestureStage {
        self.stage
    }

    pub fn mode(&self) -> bool {
        self.mode
    }

    /// Feed one edge. Returns the new mode when the gesture completes.
    pub fn on_edge(&mut self, edge: ButtonEdge) -> Option<bool> {
        if edge != self.stage.expects() {
            if self.stage != GestureStage::WaitPressA {
                trace!("gesture: {} out of sequence at {}", edge, self.stage);
            }
            self.stage = GestureStage::WaitPressA;
            return None;
        }

        let completed = self.stage == GestureStage::WaitReleaseA;
        self.stage = self.stage.next();
        if completed {
            self.mode = !self.mode;
            debug!("gesture: complete, indications {}", self.mode);
            return Some(self.mode);
        }
        None
    }

    /// Forget a partially entered gesture. The mode is kept.
    pub fn reset(&mut self) {
        self.stage = GestureStage::WaitPressA;
    }
}

impl Default for GestureSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::ButtonEdge::*;
    use super::*;

    fn feed(seq: &mut GestureSequencer, edges: &[ButtonEdge]) -> Option<bool> {
        let mut last = None;
        for edge in edges {
            last = seq.on_edge(*edge);
        }
        last
    }

    #[test]
    fn full_sequence_toggles_mode_once() {
        let mut seq = GestureSequencer::new();
        assert!(seq.mode());
        assert_eq!(feed(&mut seq, &[PressA, PressB, ReleaseB]), None);
        assert_eq!(seq.on_edge(ReleaseA), Some(false));
        assert_eq!(seq.stage(), GestureStage::WaitPressA);

        assert_eq!(feed(&mut seq, &[PressA, PressB, ReleaseB, ReleaseA]), Some(true));
    }

    #[test]
    fn releasing_a_first_resets_without_toggle() {
        let mut seq = GestureSequencer::new();
        assert_eq!(feed(&mut seq, &[PressA, PressB, ReleaseA]), None);
        assert_eq!(seq.stage(), GestureStage::WaitPressA);
        assert!(seq.mode());
    }

    #[test]
    fn stray_edge_then_fresh_gesture_toggles() {
        let mut seq = GestureSequencer::new();
        feed(&mut seq, &[PressA, ReleaseA]);
        assert_eq!(seq.stage(), GestureStage::WaitPressA);

        assert_eq!(feed(&mut seq, &[PressA, PressB, ReleaseB, ReleaseA]), Some(false));
    }

    #[test]
    fn repeated_press_a_resets_to_first_stage() {
        let mut seq = GestureSequencer::new();
        feed(&mut seq, &[PressA, PressA]);
        assert_eq!(seq.stage(), GestureStage::WaitPressA);
        assert!(seq.mode());
    }

    #[test]
    fn b_alone_never_toggles() {
        let mut seq = GestureSequencer::new();
        for _ in 0..4 {
            assert_eq!(feed(&mut seq, &[PressB, ReleaseB]), None);
        }
        assert_eq!(seq.stage(), GestureStage::WaitPressA);
        assert!(seq.mode());
    }

    #[test]
    fn reset_keeps_mode() {
        let mut seq = GestureSequencer::new();
        feed(&mut seq, &[PressA, PressB, ReleaseB, ReleaseA]);
        feed(&mut seq, &[PressA, PressB]);
        seq.reset();
        assert_eq!(seq.stage(), GestureStage::WaitPressA);
        assert!(!seq.mode());
    }
}
