//! Subscription status and lifecycle state.
//!
//! `SubscriptionStatus` is the flat tag stored in the database and shown to
//! the billing UI. `LifecycleState` is the same thing with the data each
//! state owns, so a grace start date can only exist while in grace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, Timestamp, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Free trial after provisioning.
    Trialing,
    /// Paid and current.
    Active,
    /// Renewal failed; paid tier kept until the grace window closes.
    Grace,
    /// Grace elapsed without payment.
    Suspended,
    /// Terminal. A new record is needed to come back.
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether the subscription's tier and add-on are honoured.
    ///
    /// Suspended and cancelled clinics fall back to the entry tier.
    pub fn grants_paid_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::Grace
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "TRIALING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Grace => "GRACE",
            SubscriptionStatus::Suspended => "SUSPENDED",
            SubscriptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIALING" => Ok(SubscriptionStatus::Trialing),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "GRACE" => Ok(SubscriptionStatus::Grace),
            "SUSPENDED" => Ok(SubscriptionStatus::Suspended),
            "CANCELLED" => Ok(SubscriptionStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From TRIALING
            (Trialing, Active)
                | (Trialing, Grace) // trial ended, manual payment expected
                | (Trialing, Cancelled)
            // From ACTIVE
                | (Active, Active) // renewal
                | (Active, Grace)
                | (Active, Suspended) // no payment method at renewal
                | (Active, Cancelled)
            // From GRACE
                | (Grace, Active)
                | (Grace, Suspended)
                | (Grace, Cancelled)
            // From SUSPENDED
                | (Suspended, Active)
                | (Suspended, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trialing => vec![Active, Grace, Cancelled],
            Active => vec![Active, Grace, Suspended, Cancelled],
            Grace => vec![Active, Suspended, Cancelled],
            Suspended => vec![Active, Cancelled],
            Cancelled => vec![],
        }
    }
}

/// Status plus the data owned by that status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Trialing {
        /// An administrator picked a tier during the trial.
        manual_tier_selected: bool,
    },
    Active,
    Grace {
        started_at: Timestamp,
    },
    Suspended {
        since: Timestamp,
    },
    Cancelled {
        at: Timestamp,
    },
}

impl LifecycleState {
    pub fn status(&self) -> SubscriptionStatus {
        match self {
            LifecycleState::Trialing { .. } => SubscriptionStatus::Trialing,
            LifecycleState::Active => SubscriptionStatus::Active,
            LifecycleState::Grace { .. } => SubscriptionStatus::Grace,
            LifecycleState::Suspended { .. } => SubscriptionStatus::Suspended,
            LifecycleState::Cancelled { .. } => SubscriptionStatus::Cancelled,
        }
    }

    pub fn grace_started_at(&self) -> Option<Timestamp> {
        match self {
            LifecycleState::Grace { started_at } => Some(*started_at),
            _ => None,
        }
    }

    /// Rebuilds the state from its stored columns.
    pub fn from_parts(
        status: SubscriptionStatus,
        manual_tier_selected: bool,
        state_changed_at: Timestamp,
    ) -> Self {
        match status {
            SubscriptionStatus::Trialing => LifecycleState::Trialing {
                manual_tier_selected,
            },
            SubscriptionStatus::Active => LifecycleState::Active,
            SubscriptionStatus::Grace => LifecycleState::Grace {
                started_at: state_changed_at,
            },
            SubscriptionStatus::Suspended => LifecycleState::Suspended {
                since: state_changed_at,
            },
            SubscriptionStatus::Cancelled => LifecycleState::Cancelled {
                at: state_changed_at,
            },
        }
    }

    /// When the state was entered, for states that record it.
    pub fn entered_at(&self) -> Option<Timestamp> {
        match self {
            LifecycleState::Grace { started_at } => Some(*started_at),
            LifecycleState::Suspended { since } => Some(*since),
            LifecycleState::Cancelled { at } => Some(*at),
            LifecycleState::Trialing { .. } | LifecycleState::Active => None,
        }
    }
}
