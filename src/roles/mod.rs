//! Role menus and the reactions that drive them.

pub mod engine;
pub mod mapping;
pub mod onboarding;
pub mod reconciler;
pub mod transition;

pub use engine::{ReactionOutcome, ReactionRoleEngine};
pub use mapping::{MenuEntry, MenuMapping, MenuTarget, SharedMapping};
pub use onboarding::Onboarding;
pub use reconciler::{MenuItem, MenuPlan, MenuSection, Reconciler, Reconciliation, RefreshSummary};

/// The only glyph that toggles a menu entry.
pub const TOGGLE_EMOJI: &str = "\u{2611}\u{fe0f}";

/// Clients send the glyph with or without the emoji presentation selector.
pub fn is_toggle(emoji: &str) -> bool {
    emoji.trim_end_matches('\u{fe0f}') == TOGGLE_EMOJI.trim_end_matches('\u{fe0f}')
}
