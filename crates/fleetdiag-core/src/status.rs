// ── Status deriver ──
//
// Reduction of the raw LED signal, address availability and radio silence
// into the one status the device reports.

use tracing::debug;

use crate::model::{LedCounter, NetworkStatus};

/// Derive the reported status.
///
/// No usable address dominates radio silence, which dominates the raw
/// signal.
pub fn derive(raw: LedCounter, usable_addr_count: usize, radio_silence: bool) -> LedCounter {
    if usable_addr_count == 0 {
        LedCounter::WaitingForIp
    } else if radio_silence {
        LedCounter::RadioSilence
    } else {
        raw
    }
}

/// Keeps the inputs of [`derive`] and recomputes only when the effective
/// triple changes.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    raw: LedCounter,
    usable_addr_count: usize,
    radio_silence: bool,
    derived: LedCounter,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self {
            raw: LedCounter::Undefined,
            usable_addr_count: 0,
            radio_silence: false,
            derived: derive(LedCounter::Undefined, 0, false),
        }
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derived(&self) -> LedCounter {
        self.derived
    }

    pub fn radio_silence(&self) -> bool {
        self.radio_silence
    }

    /// Apply a new LED counter. Returns `false` when the value is unchanged.
    pub fn update_led(&mut self, raw: LedCounter) -> bool {
        if raw == self.raw {
            return false;
        }
        self.raw = raw;
        self.recompute();
        true
    }

    /// Apply a new network status. Returns `true` when the derived inputs
    /// changed: the usable address count crossed zero or the effective
    /// radio-silence flag flipped.
    ///
    /// While a radio-silence change is in progress the previous flag stays
    /// in effect.
    pub fn update_network(&mut self, status: &NetworkStatus) -> bool {
        let count = status.usable_addr_count();
        let crossed_zero = (self.usable_addr_count == 0) != (count == 0);

        let mut silence_changed = false;
        if !status.radio_silence.change_in_progress {
            silence_changed = self.radio_silence != status.radio_silence.imposed;
            self.radio_silence = status.radio_silence.imposed;
        }

        if crossed_zero || silence_changed {
            self.usable_addr_count = count;
            self.recompute();
            true
        } else {
            false
        }
    }

    fn recompute(&mut self) {
        self.derived = derive(self.raw, self.usable_addr_count, self.radio_silence);
        debug!(
            raw = %self.raw,
            usable_addrs = self.usable_addr_count,
            radio_silence = self.radio_silence,
            derived = %self.derived,
            "derived status"
        );
    }
}
