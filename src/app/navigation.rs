use crate::domain::{ScrollOffset, TimelineLayout, ZoomAnchor};
use std::time::{Duration, Instant};

/// Scroll drift below this is treated as the controller's own scroll.
pub const SCROLL_EPSILON_PX: f64 = 1.0;
pub const AUTO_FOLLOW_GRACE: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationPhase {
    NotAligned,
    AutoFollowing,
    /// Aligned once, grace period over, no user input yet.
    Settled,
    UserControlled,
}

#[derive(Clone, Debug, Default)]
pub struct NavigationState {
    has_user_navigated: bool,
    has_initial_alignment: bool,
    auto_follow_deadline: Option<Instant>,
    pending_zoom_anchor: Option<ZoomAnchor>,
    last_programmatic: Option<ScrollOffset>,
    suppress_next_observation: bool,
}

impl NavigationState {
    /// Back to "not navigated, not aligned". Used on reload and group-by switch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_user_navigated(&self) -> bool {
        self.has_user_navigated
    }

    pub fn has_initial_alignment(&self) -> bool {
        self.has_initial_alignment
    }

    pub fn auto_follow_deadline(&self) -> Option<Instant> {
        self.auto_follow_deadline
    }

    pub fn arm_auto_follow(&mut self, now: Instant) {
        self.auto_follow_deadline = Some(now + AUTO_FOLLOW_GRACE);
    }

    pub fn phase(&self, now: Instant, loading: bool) -> NavigationPhase {
        if self.has_user_navigated {
            NavigationPhase::UserControlled
        } else if !self.has_initial_alignment {
            NavigationPhase::NotAligned
        } else if self.should_auto_follow(now, loading) {
            NavigationPhase::AutoFollowing
        } else {
            NavigationPhase::Settled
        }
    }

    /// Zoom and pan input. Sticky until the next reset.
    pub fn mark_user_navigated(&mut self) {
        self.has_user_navigated = true;
    }

    pub fn set_zoom_anchor(&mut self, anchor: ZoomAnchor) {
        self.pending_zoom_anchor = Some(anchor);
    }

    pub fn pending_zoom_anchor(&self) -> Option<ZoomAnchor> {
        self.pending_zoom_anchor
    }

    pub fn record_programmatic(&mut self, scroll: ScrollOffset) {
        self.last_programmatic = Some(scroll);
        self.suppress_next_observation = true;
    }

    /// Compares an observed offset with the last one the controller set. The tick right after a
    /// programmatic scroll is skipped. Returns true when this observation flipped to user control.
    pub fn observe_scroll(&mut self, scroll: ScrollOffset) -> bool {
        if self.suppress_next_observation {
            self.suppress_next_observation = false;
            return false;
        }
        if self.has_user_navigated {
            return false;
        }
        let diverged = match self.last_programmatic {
            Some(last) => scroll.distance(&last) > SCROLL_EPSILON_PX,
            None => scroll.x.abs() > SCROLL_EPSILON_PX || scroll.y.abs() > SCROLL_EPSILON_PX,
        };
        if diverged {
            self.has_user_navigated = true;
        }
        diverged
    }

    pub fn should_auto_follow(&self, now: Instant, loading: bool) -> bool {
        if self.has_user_navigated {
            return false;
        }
        if !self.has_initial_alignment || loading {
            return true;
        }
        self.auto_follow_deadline
            .is_some_and(|deadline| now < deadline)
    }

    /// Scroll target after a layout pass: a pending zoom anchor wins and is consumed, otherwise
    /// auto-follow snaps to the latest data, otherwise the current offset is only clamped.
    pub fn settle(
        &mut self,
        layout: &TimelineLayout,
        scroll: ScrollOffset,
        now: Instant,
        loading: bool,
    ) -> ScrollOffset {
        let target = if let Some(anchor) = self.pending_zoom_anchor.take() {
            anchor.resolve(layout, scroll)
        } else if self.should_auto_follow(now, loading) {
            self.has_initial_alignment = true;
            layout.latest_scroll(scroll)
        } else {
            layout.clamp_scroll(scroll)
        };
        if target != scroll || self.last_programmatic.is_none() {
            self.record_programmatic(target);
        }
        target
    }
}
