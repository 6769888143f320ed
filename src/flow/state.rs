//! Guided-flow states and the transitions allowed between them.

/// What the current instruction is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInput {
    /// Typing indicator shown; the prompt is not visible yet.
    Revealing,
    /// Needs no input; advances after a pause.
    AutoAdvance,
    /// Waiting for one of the rendered answer buttons.
    Choice,
    /// Waiting for typed text; `skippable` when a Skip button is offered.
    Text { skippable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    /// No configuration loaded (or it has no menu items).
    #[default]
    Idle,
    MenuDisplayed,
    Instruction(StepInput),
    /// Collected data is being sent to the backend.
    Submitting { return_menu: Vec<String> },
    Complete,
    ReturnMenuDisplayed,
    /// An acknowledgement or apology is shown and a reset is scheduled.
    Acknowledged,
    ProductSearch,
}

impl FlowState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, target),
            // Reset and reload are always allowed
            (_, Idle) | (_, MenuDisplayed) |
            // Menu selection
            (MenuDisplayed | ReturnMenuDisplayed,
                Instruction(_) | Submitting { .. } | ProductSearch | Acknowledged) |
            // Walking instructions
            (Instruction(_), Instruction(_) | Submitting { .. }) |
            (Submitting { .. }, Complete) |
            (Complete, ReturnMenuDisplayed)
        )
    }

    /// Inside an instruction sequence.
    pub fn is_guided(&self) -> bool {
        matches!(self, Self::Instruction(_))
    }

    /// Typed text is an answer in this state.
    pub fn accepts_text(&self) -> bool {
        matches!(self, Self::Instruction(StepInput::Text { .. }) | Self::ProductSearch)
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::MenuDisplayed => "menu_displayed",
            Self::Instruction(StepInput::Revealing) => "instruction_revealing",
            Self::Instruction(StepInput::AutoAdvance) => "instruction_auto_advance",
            Self::Instruction(StepInput::Choice) => "instruction_choice",
            Self::Instruction(StepInput::Text { .. }) => "instruction_text",
            Self::Submitting { .. } => "submitting",
            Self::Complete => "complete",
            Self::ReturnMenuDisplayed => "return_menu_displayed",
            Self::Acknowledged => "acknowledged",
            Self::ProductSearch => "product_search",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use FlowState::*;
        let text = Instruction(StepInput::Text { skippable: false });
        let submitting = Submitting { return_menu: vec![] };
        let transitions = [
            (Idle, MenuDisplayed),
            (MenuDisplayed, Instruction(StepInput::Revealing)),
            (MenuDisplayed, Acknowledged),
            (MenuDisplayed, ProductSearch),
            (Instruction(StepInput::Revealing), text.clone()),
            (text.clone(), Instruction(StepInput::Revealing)),
            (text, submitting.clone()),
            (submitting, Complete),
            (Complete, ReturnMenuDisplayed),
            (ReturnMenuDisplayed, Instruction(StepInput::Revealing)),
            (Acknowledged, MenuDisplayed),
            (ProductSearch, MenuDisplayed),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(&to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use FlowState::*;
        assert!(!Idle.can_transition_to(&Instruction(StepInput::Revealing)));
        assert!(!Complete.can_transition_to(&Instruction(StepInput::Choice)));
        assert!(!Instruction(StepInput::Choice).can_transition_to(&Complete));
        assert!(!ProductSearch.can_transition_to(&Submitting { return_menu: vec![] }));
        assert!(!Submitting { return_menu: vec![] }.can_transition_to(&ReturnMenuDisplayed));
    }

    #[test]
    fn text_acceptance() {
        assert!(FlowState::Instruction(StepInput::Text { skippable: true }).accepts_text());
        assert!(FlowState::ProductSearch.accepts_text());
        assert!(!FlowState::Instruction(StepInput::Choice).accepts_text());
        assert!(!FlowState::Instruction(StepInput::Revealing).accepts_text());
        assert!(!FlowState::MenuDisplayed.accepts_text());
    }

    #[test]
    fn guided_only_inside_instructions() {
        assert!(FlowState::Instruction(StepInput::AutoAdvance).is_guided());
        assert!(!FlowState::Submitting { return_menu: vec![] }.is_guided());
        assert!(!FlowState::ProductSearch.is_guided());
    }
}
