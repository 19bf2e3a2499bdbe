//! Split allocation
//!
//! Turns a total, a participant set and a [`SplitMode`] into the amount each
//! participant owes. The calculator never fails: bad input produces a
//! degenerate allocation with `is_valid == false`, so callers must check the
//! flag before accepting a split.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Amount, CoreError};

/// Largest absolute remainder (0.01) a custom split may leave and still count
/// as balanced.
pub const CUSTOM_TOLERANCE: Amount = Amount::from_micros(10_000);

/// How the total is divided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Everyone owes the same share
    #[default]
    Equal,
    /// Each participant's share is given explicitly
    Custom,
}

impl FromStr for SplitMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "custom" => Ok(Self::Custom),
            other => Err(CoreError::InvalidSplitMode(other.to_string())),
        }
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Result of dividing a split's total among its participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAllocation {
    /// Amount being split
    pub total_amount: Amount,
    /// Participant who paid the expense and is owed by everyone else
    pub creator: Option<String>,
    /// Division mode
    pub mode: SplitMode,
    /// Share owed by each participant, creator included
    pub shares: BTreeMap<String, Amount>,
    /// `total_amount` minus the allocated shares. Always zero in equal mode.
    pub remainder: Amount,
    /// Whether the allocation may be submitted
    pub is_valid: bool,
}

/// One participant's debt to the creator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub from: String,
    pub to: String,
    pub amount: Amount,
}

impl SplitAllocation {
    /// Share for a participant, if they are part of the split
    pub fn share_of(&self, participant_id: &str) -> Option<Amount> {
        self.shares.get(participant_id).copied()
    }

    pub fn participant_count(&self) -> usize {
        self.shares.len()
    }

    /// Total minus the sum of all shares.
    ///
    /// In equal mode this is the sub-micro-unit residue left by integer
    /// division (e.g. 0.000001 when splitting 100 three ways), which
    /// `remainder` reports as zero.
    pub fn rounding_dust(&self) -> Amount {
        unallocated(self.total_amount, &self.shares)
    }

    /// Debts owed to the creator, ordered by participant id.
    ///
    /// Empty when the allocation is invalid or has no creator.
    pub fn settlements(&self) -> Vec<Settlement> {
        let creator = match (&self.creator, self.is_valid) {
            (Some(creator), true) => creator,
            _ => return Vec::new(),
        };

        self.shares
            .iter()
            .filter(|(id, share)| *id != creator && share.is_positive())
            .map(|(id, share)| Settlement {
                from: id.clone(),
                to: creator.clone(),
                amount: *share,
            })
            .collect()
    }
}

/// Divide `total` among the creator and `participant_ids`.
///
/// Ids are de-duplicated, so a creator repeated among the participants is
/// counted once. An empty `creator_id` means the split has no creator.
/// `custom_amounts` is only read in [`SplitMode::Custom`]; missing entries
/// count as zero.
pub fn compute_allocation<S: AsRef<str>>(
    total: Amount,
    participant_ids: &[S],
    creator_id: &str,
    mode: SplitMode,
    custom_amounts: &HashMap<String, Amount>,
) -> SplitAllocation {
    let creator = (!creator_id.is_empty()).then(|| creator_id.to_string());

    let members: BTreeSet<String> = creator
        .iter()
        .cloned()
        .chain(participant_ids.iter().map(|id| id.as_ref().to_string()))
        .collect();

    if !total.is_positive() || members.is_empty() {
        return SplitAllocation {
            total_amount: total,
            creator,
            mode,
            shares: members.into_iter().map(|id| (id, Amount::ZERO)).collect(),
            remainder: total,
            is_valid: false,
        };
    }

    match mode {
        SplitMode::Equal => {
            let share = total
                .split_even(members.len() as u64)
                .unwrap_or(Amount::ZERO);
            SplitAllocation {
                total_amount: total,
                creator,
                mode,
                shares: members.into_iter().map(|id| (id, share)).collect(),
                remainder: Amount::ZERO,
                is_valid: true,
            }
        }
        SplitMode::Custom => {
            let shares: BTreeMap<String, Amount> = members
                .into_iter()
                .map(|id| {
                    let share = custom_amounts.get(&id).copied().unwrap_or(Amount::ZERO);
                    (id, share)
                })
                .collect();
            let remainder = unallocated(total, &shares);

            SplitAllocation {
                total_amount: total,
                creator,
                mode,
                shares,
                remainder,
                is_valid: remainder.abs() < CUSTOM_TOLERANCE,
            }
        }
    }
}

/// `total` minus the sum of `shares`, computed exactly and clamped to the
/// `Amount` range. A clamped result is never within tolerance.
fn unallocated(total: Amount, shares: &BTreeMap<String, Amount>) -> Amount {
    let allocated: i128 = shares.values().map(|share| i128::from(share.micros())).sum();
    let exact = i128::from(total.micros()) - allocated;
    let clamped = exact.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    Amount::from_micros(clamped as i64)
}
