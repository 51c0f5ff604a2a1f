//! Hover lifecycle of one message element:
//! Idle → AwaitingTranslation → Translated → Idle, with AwaitingTranslation → Idle on cancel.

use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HoverPhase {
    #[default]
    Idle,
    AwaitingTranslation,
    Translated,
}

impl std::fmt::Display for HoverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoverPhase::Idle => write!(f, "Idle"),
            HoverPhase::AwaitingTranslation => write!(f, "AwaitingTranslation"),
            HoverPhase::Translated => write!(f, "Translated"),
        }
    }
}

impl HoverPhase {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: HoverPhase) -> bool {
        matches!(
            (self, next),
            (HoverPhase::Idle, HoverPhase::AwaitingTranslation)
                // re-entered before the debounce elapsed
                | (HoverPhase::AwaitingTranslation, HoverPhase::AwaitingTranslation)
                | (HoverPhase::AwaitingTranslation, HoverPhase::Translated)
                // leave, cancel or release from anywhere
                | (_, HoverPhase::Idle)
        )
    }

    /// Move to `next` if the transition is valid.
    pub fn advance(&mut self, next: HoverPhase) -> Result<HoverPhase, String> {
        let current = *self;
        if !current.can_transition_to(next) {
            let msg = format!("invalid hover transition: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        *self = next;
        trace!(from = %current, to = %next, "hover_transition");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut phase = HoverPhase::default();
        assert_eq!(phase.advance(HoverPhase::AwaitingTranslation), Ok(HoverPhase::AwaitingTranslation));
        assert_eq!(phase.advance(HoverPhase::Translated), Ok(HoverPhase::Translated));
        assert_eq!(phase.advance(HoverPhase::Idle), Ok(HoverPhase::Idle));
    }

    #[test]
    fn cancel_from_awaiting() {
        let mut phase = HoverPhase::AwaitingTranslation;
        assert!(phase.advance(HoverPhase::Idle).is_ok());
    }

    #[test]
    fn rejects_skipping_the_debounce() {
        let mut phase = HoverPhase::Idle;
        assert!(phase.advance(HoverPhase::Translated).is_err());
        assert_eq!(phase, HoverPhase::Idle);

        let mut phase = HoverPhase::Translated;
        assert!(phase.advance(HoverPhase::AwaitingTranslation).is_err());
        assert_eq!(phase, HoverPhase::Translated);
    }
}
