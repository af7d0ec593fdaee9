//! Per-route solo, solo-isolate and mute state
//!
//! Implicit solo is counted, not flagged: several independent paths can
//! solo the same route, and each release must only undo its own share.
//! Counters saturate at zero.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Apply a signed delta to a counter, clamping at zero
///
/// Returns (old, new).
fn mod_counter(counter: &AtomicU32, delta: i32) -> (u32, u32) {
    let old = counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some(apply_delta(v, delta))
        })
        .unwrap_or_else(|v| v);
    (old, apply_delta(old, delta))
}

#[inline]
fn apply_delta(value: u32, delta: i32) -> u32 {
    if delta < 0 {
        value.saturating_sub(delta.unsigned_abs())
    } else {
        value.saturating_add(delta as u32)
    }
}

// ============ Solo ============

#[derive(Debug, Default)]
pub struct SoloControl {
    self_solo: AtomicBool,
    soloed_by_upstream: AtomicU32,
    soloed_by_downstream: AtomicU32,
}

impl SoloControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set explicit solo; returns the transition (+1, -1 or 0)
    pub fn set_self_solo(&self, on: bool) -> i32 {
        match (self.self_solo.swap(on, Ordering::AcqRel), on) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        }
    }

    #[inline]
    pub fn self_soloed(&self) -> bool {
        self.self_solo.load(Ordering::Acquire)
    }

    #[inline]
    pub fn soloed_by_others_upstream(&self) -> u32 {
        self.soloed_by_upstream.load(Ordering::Acquire)
    }

    #[inline]
    pub fn soloed_by_others_downstream(&self) -> u32 {
        self.soloed_by_downstream.load(Ordering::Acquire)
    }

    #[inline]
    pub fn soloed_by_others(&self) -> bool {
        self.soloed_by_others_upstream() > 0 || self.soloed_by_others_downstream() > 0
    }

    /// Explicitly or implicitly soloed
    #[inline]
    pub fn soloed(&self) -> bool {
        self.self_soloed() || self.soloed_by_others()
    }

    pub fn mod_solo_by_others_upstream(&self, delta: i32) -> u32 {
        let (old, new) = mod_counter(&self.soloed_by_upstream, delta);
        log::trace!("solo by upstream {} -> {} (delta {})", old, new, delta);
        new
    }

    pub fn mod_solo_by_others_downstream(&self, delta: i32) -> u32 {
        let (old, new) = mod_counter(&self.soloed_by_downstream, delta);
        log::trace!("solo by downstream {} -> {} (delta {})", old, new, delta);
        new
    }

    /// Drop explicit and implicit solo; returns true if anything was set
    pub fn clear_all(&self) -> bool {
        let was_self = self.self_solo.swap(false, Ordering::AcqRel);
        let up = self.soloed_by_upstream.swap(0, Ordering::AcqRel);
        let down = self.soloed_by_downstream.swap(0, Ordering::AcqRel);
        was_self || up > 0 || down > 0
    }
}

// ============ Solo Isolate ============

#[derive(Debug, Default)]
pub struct SoloIsolateControl {
    self_isolated: AtomicBool,
    isolated_by_upstream: AtomicU32,
}

impl SoloIsolateControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transition (+1, -1 or 0)
    pub fn set_solo_isolated(&self, on: bool) -> i32 {
        match (self.self_isolated.swap(on, Ordering::AcqRel), on) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        }
    }

    #[inline]
    pub fn self_isolated(&self) -> bool {
        self.self_isolated.load(Ordering::Acquire)
    }

    #[inline]
    pub fn isolated_by_upstream(&self) -> u32 {
        self.isolated_by_upstream.load(Ordering::Acquire)
    }

    #[inline]
    pub fn solo_isolated(&self) -> bool {
        self.self_isolated() || self.isolated_by_upstream() > 0
    }

    pub fn mod_isolated_by_upstream(&self, delta: i32) -> u32 {
        mod_counter(&self.isolated_by_upstream, delta).1
    }
}

// ============ Mute ============

#[derive(Debug, Default)]
pub struct MuteControl {
    self_muted: AtomicBool,
    muted_by_others_soloing: AtomicBool,
    /// What the audio thread acts on
    effective: AtomicBool,
}

impl MuteControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the explicit mute changed
    pub fn set_muted(&self, on: bool) -> bool {
        self.self_muted.swap(on, Ordering::AcqRel) != on
    }

    #[inline]
    pub fn muted_by_self(&self) -> bool {
        self.self_muted.load(Ordering::Acquire)
    }

    #[inline]
    pub fn muted_by_others_soloing(&self) -> bool {
        self.muted_by_others_soloing.load(Ordering::Acquire)
    }

    /// Effective mute as last evaluated
    #[inline]
    pub fn muted(&self) -> bool {
        self.effective.load(Ordering::Acquire)
    }

    /// Store a fresh evaluation; returns true if the effective mute flipped
    pub(crate) fn evaluate(&self, muted_by_others_soloing: bool, self_mute_counts: bool) -> bool {
        self.muted_by_others_soloing
            .store(muted_by_others_soloing, Ordering::Release);
        let effective = (self_mute_counts && self.muted_by_self()) || muted_by_others_soloing;
        self.effective.swap(effective, Ordering::AcqRel) != effective
    }
}
