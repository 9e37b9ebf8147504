//! Anchor policy: decides whether a new event stores a full snapshot or a
//! patch.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::event::EventKind;

/// Why an event was (or was not) stored as an anchor. Persisted in the
/// `anchor_reason` column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnchorReason {
  ForcedAnchor,
  MilestoneEvent,
  PeriodicAnchor,
  PatchOnly,
}

impl AnchorReason {
  pub fn is_anchor(self) -> bool { !matches!(self, Self::PatchOnly) }

  pub fn as_str(self) -> &'static str { self.into() }
}

pub const DEFAULT_ANCHOR_INTERVAL: u32 = 10;

fn default_interval() -> u32 { DEFAULT_ANCHOR_INTERVAL }

/// Anchor cadence. Rules apply in priority order: forced, milestone,
/// periodic, patch-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPolicy {
  /// Every `interval`-th event of an aggregate is an anchor. `0` disables
  /// periodic anchors.
  #[serde(default = "default_interval")]
  pub interval: u32,
}

impl Default for AnchorPolicy {
  fn default() -> Self { Self { interval: DEFAULT_ANCHOR_INTERVAL } }
}

impl AnchorPolicy {
  pub fn with_interval(interval: u32) -> Self { Self { interval } }

  /// `history_len` is the number of events already stored for the aggregate.
  pub fn decide(&self, history_len: u64, kind: &EventKind, force_anchor: bool) -> AnchorReason {
    if force_anchor {
      AnchorReason::ForcedAnchor
    } else if kind.is_milestone() {
      AnchorReason::MilestoneEvent
    } else if self.interval != 0 && (history_len + 1) % u64::from(self.interval) == 0 {
      AnchorReason::PeriodicAnchor
    } else {
      AnchorReason::PatchOnly
    }
  }
}
