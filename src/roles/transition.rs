//! Degree role transitions as pure plans.
//!
//! Given the roles a member holds and the degree they toggled, produce the
//! effects to apply. The engine executes the plan under the member's lock,
//! so the plan is always computed from a fresh read.
//!
//! A plan only lists effects that change the member's roles, grants come
//! before revocations, and every effect can be undone. A member is never
//! left without both tourist and degree, even when a call fails halfway.

use std::collections::HashSet;

use crate::directory::RoleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEffect {
    Add(RoleId),
    Remove(RoleId),
}

impl RoleEffect {
    pub fn undo(self) -> RoleEffect {
        match self {
            RoleEffect::Add(role) => RoleEffect::Remove(role),
            RoleEffect::Remove(role) => RoleEffect::Add(role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Apply(Vec<RoleEffect>),
    /// Another degree is already held. The member's reaction is retracted
    /// and no role changes.
    Reject,
    Noop,
}

/// The role set a degree transition touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegreeRoles {
    pub degree: RoleId,
    pub campus: RoleId,
    pub tourist: RoleId,
}

pub fn plan_degree_add(
    held: &HashSet<RoleId>,
    target: DegreeRoles,
    all_degrees: impl IntoIterator<Item = RoleId>,
) -> Transition {
    let other_held = all_degrees
        .into_iter()
        .any(|role| role != target.degree && held.contains(&role));
    if other_held {
        return Transition::Reject;
    }
    if held.contains(&target.degree) {
        return Transition::Noop;
    }
    changes(
        held,
        [
            RoleEffect::Add(target.degree),
            RoleEffect::Add(target.campus),
            RoleEffect::Remove(target.tourist),
        ],
    )
}

pub fn plan_degree_remove(held: &HashSet<RoleId>, target: DegreeRoles) -> Transition {
    if !held.contains(&target.degree) {
        return Transition::Noop;
    }
    changes(
        held,
        [
            RoleEffect::Add(target.tourist),
            RoleEffect::Remove(target.degree),
            RoleEffect::Remove(target.campus),
        ],
    )
}

/// Keeps the effects that would change `held`, in order.
fn changes(held: &HashSet<RoleId>, effects: impl IntoIterator<Item = RoleEffect>) -> Transition {
    let effects = effects
        .into_iter()
        .filter(|effect| match effect {
            RoleEffect::Add(role) => !held.contains(role),
            RoleEffect::Remove(role) => held.contains(role),
        })
        .collect();
    Transition::Apply(effects)
}

/// The role set `held` becomes once `transition` is applied.
pub fn apply_to(held: &HashSet<RoleId>, transition: &Transition) -> HashSet<RoleId> {
    let mut next = held.clone();
    if let Transition::Apply(effects) = transition {
        for effect in effects {
            match effect {
                RoleEffect::Add(role) => {
                    next.insert(*role);
                }
                RoleEffect::Remove(role) => {
                    next.remove(role);
                }
            }
        }
    }
    next
}
