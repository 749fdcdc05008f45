use std::str::FromStr;

use crate::domain::errors::SyncError;
use crate::domain::state::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    Idle,
    Dragging { owner: ParticipantId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// Any participant may take over a drag at any time.
    #[default]
    Permissive,
    /// Begin-drag is compare-and-set; only the owner may drive or end it.
    Exclusive,
}

impl FromStr for OwnershipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(OwnershipPolicy::Permissive),
            "exclusive" => Ok(OwnershipPolicy::Exclusive),
            other => Err(format!("unknown ownership policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnershipRules {
    pub policy: OwnershipPolicy,
    pub lock_blocks_drag: bool,
    /// Seconds without owner activity before a drag is force-ended.
    pub drag_timeout: Option<f64>,
}

impl Default for OwnershipRules {
    fn default() -> Self {
        Self {
            policy: OwnershipPolicy::Permissive,
            lock_blocks_drag: false,
            drag_timeout: Some(10.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragGrant {
    Granted,
    /// The requester already held the drag.
    Renewed,
    /// Permissive takeover from another participant.
    TakenOver { previous: ParticipantId },
}

/// Authoritative drag ownership for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ownership {
    state: OwnershipState,
    last_owner_activity: f64,
}

impl Default for Ownership {
    fn default() -> Self {
        Self {
            state: OwnershipState::Idle,
            last_owner_activity: 0.0,
        }
    }
}

impl Ownership {
    pub fn state(&self) -> OwnershipState {
        self.state
    }

    pub fn owner(&self) -> Option<ParticipantId> {
        match self.state {
            OwnershipState::Idle => None,
            OwnershipState::Dragging { owner } => Some(owner),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, OwnershipState::Dragging { .. })
    }

    pub fn begin_drag(
        &mut self,
        requester: ParticipantId,
        locked: bool,
        rules: &OwnershipRules,
        now: f64,
    ) -> Result<DragGrant, SyncError> {
        if locked && rules.lock_blocks_drag {
            return Err(SyncError::EntityLocked);
        }

        let grant = match self.state {
            OwnershipState::Idle => DragGrant::Granted,
            OwnershipState::Dragging { owner } if owner == requester => DragGrant::Renewed,
            OwnershipState::Dragging { owner } => match rules.policy {
                OwnershipPolicy::Permissive => DragGrant::TakenOver { previous: owner },
                OwnershipPolicy::Exclusive => return Err(SyncError::DragDenied { holder: owner }),
            },
        };

        self.state = OwnershipState::Dragging { owner: requester };
        self.last_owner_activity = now;
        Ok(grant)
    }

    /// Returns to Idle. The caller adopts the final pose.
    pub fn end_drag(
        &mut self,
        requester: ParticipantId,
        rules: &OwnershipRules,
    ) -> Result<Option<ParticipantId>, SyncError> {
        self.authorize(requester, rules)?;
        Ok(self.force_release())
    }

    /// Checks a move/rotate from `sender` and refreshes the owner's activity.
    pub fn authorize_update(
        &mut self,
        sender: ParticipantId,
        rules: &OwnershipRules,
        now: f64,
    ) -> Result<(), SyncError> {
        self.authorize(sender, rules)?;
        if self.owner() == Some(sender) {
            self.last_owner_activity = now;
        }
        Ok(())
    }

    pub fn force_release(&mut self) -> Option<ParticipantId> {
        let previous = self.owner();
        self.state = OwnershipState::Idle;
        previous
    }

    pub fn is_owned_by(&self, participant: ParticipantId) -> bool {
        self.owner() == Some(participant)
    }

    pub fn timed_out(&self, rules: &OwnershipRules, now: f64) -> bool {
        match (self.state, rules.drag_timeout) {
            (OwnershipState::Dragging { .. }, Some(timeout)) => now - self.last_owner_activity >= timeout,
            _ => false,
        }
    }

    fn authorize(&self, sender: ParticipantId, rules: &OwnershipRules) -> Result<(), SyncError> {
        match (rules.policy, self.state) {
            (OwnershipPolicy::Exclusive, OwnershipState::Dragging { owner }) if owner != sender => {
                Err(SyncError::NotDragOwner { owner })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: ParticipantId = ParticipantId(1);
    const BOB: ParticipantId = ParticipantId(2);

    fn exclusive() -> OwnershipRules {
        OwnershipRules {
            policy: OwnershipPolicy::Exclusive,
            ..OwnershipRules::default()
        }
    }

    #[test]
    fn permissive_lets_second_begin_drag_take_over() {
        // Both concurrent requests succeed; the last one wins.
        let rules = OwnershipRules::default();
        let mut ownership = Ownership::default();

        assert_eq!(ownership.begin_drag(ALICE, false, &rules, 0.0), Ok(DragGrant::Granted));
        assert_eq!(
            ownership.begin_drag(BOB, false, &rules, 0.0),
            Ok(DragGrant::TakenOver { previous: ALICE })
        );
        assert_eq!(ownership.owner(), Some(BOB));
    }

    #[test]
    fn exclusive_denies_the_loser() {
        let rules = exclusive();
        let mut ownership = Ownership::default();

        assert_eq!(ownership.begin_drag(ALICE, false, &rules, 0.0), Ok(DragGrant::Granted));
        assert_eq!(
            ownership.begin_drag(BOB, false, &rules, 0.0),
            Err(SyncError::DragDenied { holder: ALICE })
        );
        assert_eq!(ownership.begin_drag(ALICE, false, &rules, 0.1), Ok(DragGrant::Renewed));
        assert_eq!(ownership.owner(), Some(ALICE));
    }

    #[test]
    fn exclusive_rejects_updates_and_end_from_non_owner() {
        let rules = exclusive();
        let mut ownership = Ownership::default();
        ownership.begin_drag(ALICE, false, &rules, 0.0).unwrap();

        assert_eq!(
            ownership.authorize_update(BOB, &rules, 0.1),
            Err(SyncError::NotDragOwner { owner: ALICE })
        );
        assert_eq!(
            ownership.end_drag(BOB, &rules),
            Err(SyncError::NotDragOwner { owner: ALICE })
        );
        assert_eq!(ownership.end_drag(ALICE, &rules), Ok(Some(ALICE)));
        assert_eq!(ownership.state(), OwnershipState::Idle);
    }

    #[test]
    fn permissive_accepts_updates_from_anyone() {
        let rules = OwnershipRules::default();
        let mut ownership = Ownership::default();
        ownership.begin_drag(ALICE, false, &rules, 0.0).unwrap();

        assert_eq!(ownership.authorize_update(BOB, &rules, 0.1), Ok(()));
        assert_eq!(ownership.end_drag(BOB, &rules), Ok(Some(ALICE)));
    }

    #[test]
    fn lock_blocks_drag_only_when_enabled() {
        let mut ownership = Ownership::default();
        let permissive = OwnershipRules::default();
        assert!(ownership.begin_drag(ALICE, true, &permissive, 0.0).is_ok());

        let mut ownership = Ownership::default();
        let strict = OwnershipRules {
            lock_blocks_drag: true,
            ..OwnershipRules::default()
        };
        assert_eq!(
            ownership.begin_drag(ALICE, true, &strict, 0.0),
            Err(SyncError::EntityLocked)
        );
        assert!(!ownership.is_dragging());
    }

    #[test]
    fn drag_times_out_without_owner_activity() {
        let rules = OwnershipRules {
            drag_timeout: Some(1.0),
            ..OwnershipRules::default()
        };
        let mut ownership = Ownership::default();
        ownership.begin_drag(ALICE, false, &rules, 0.0).unwrap();

        ownership.authorize_update(ALICE, &rules, 0.8).unwrap();
        assert!(!ownership.timed_out(&rules, 1.5));
        // Non-owner traffic does not keep the drag alive.
        ownership.authorize_update(BOB, &rules, 1.7).unwrap();
        assert!(ownership.timed_out(&rules, 1.8));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Exclusive".parse::<OwnershipPolicy>(), Ok(OwnershipPolicy::Exclusive));
        assert_eq!(" permissive ".parse::<OwnershipPolicy>(), Ok(OwnershipPolicy::Permissive));
        assert!("strict".parse::<OwnershipPolicy>().is_err());
    }
}
