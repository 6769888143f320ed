//! Guided-flow state machine.
//!
//! The engine owns the loaded [`ChatConfig`], the instruction cursor and the
//! answers collected so far. It performs no I/O: every operation returns the
//! display steps it wants played, and network results are fed back through
//! [`FlowEngine::on_submitted`] and [`FlowEngine::on_products`].

use tracing::{debug, info, warn};

use crate::config::Pacing;
use crate::error::{ChatError, FlowError};
use crate::render::{Choice, ChoicePurpose, ChoiceSet, InputState, Render};
use crate::schedule::{Continuation, Request, Step};

use super::model::{
    ChatConfig, DisplayAs, InputRequirement, Instruction, InstructionPath, Product, SKIP_VALUE,
    Submission, UserData,
};
use super::state::{FlowState, StepInput};

pub const MENU_PROMPT: &str = "Please select one of the following options:";
pub const RESET_PROMPT: &str = "How else can I help you today?";
pub const SUBMITTED: &str = "Thank you! Your information has been submitted.";
pub const SUBMIT_FAILED: &str = "I'm sorry, there was a problem submitting your information.";
pub const NEXT_PROMPT: &str = "What would you like to do next?";
pub const UNKNOWN_OPTION: &str = "Sorry, I can't find that option. Returning to the main menu.";
pub const MENU_GONE: &str = "Sorry, that option is no longer available. Returning to the main menu.";
pub const MAIN_MENU_LABEL: &str = "Main Menu";
pub const SEARCH_PROMPT: &str = "What product are you looking for?";
pub const NO_PRODUCTS: &str = "I couldn't find any products matching that.";
pub const SEARCH_FAILED: &str = "Sorry, product search isn't available right now.";

pub struct FlowEngine {
    pacing: Pacing,
    config: Option<ChatConfig>,
    state: FlowState,
    path: Option<InstructionPath>,
    user_data: UserData,
    selected_menu: Option<String>,
    choices: Option<ChoiceSet>,
    next_choice_id: u64,
}

impl FlowEngine {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            config: None,
            state: FlowState::Idle,
            path: None,
            user_data: UserData::new(),
            selected_menu: None,
            choices: None,
            next_choice_id: 0,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn config(&self) -> Option<&ChatConfig> {
        self.config.as_ref()
    }

    pub fn path(&self) -> Option<InstructionPath> {
        self.path
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub fn active_choices(&self) -> Option<&ChoiceSet> {
        self.choices.as_ref()
    }

    pub fn is_in_guided_flow(&self) -> bool {
        self.state.is_guided()
    }

    pub fn is_product_search_active(&self) -> bool {
        self.state == FlowState::ProductSearch
    }

    /// The instruction under the cursor.
    pub fn current_instruction(&self) -> Option<&Instruction> {
        let path = self.path?;
        self.config
            .as_ref()?
            .main_menu_items
            .get(path.main_menu_index)?
            .instructions
            .get(path.current()?)
    }

    // ── Entry points ────────────────────────────────────────────────

    /// Install a freshly fetched config: welcome texts, then the main menu.
    pub fn load(&mut self, mut config: ChatConfig) -> Vec<Step> {
        config.normalize();
        info!(
            menu_items = config.main_menu_items.len(),
            welcome_texts = config.welcome_texts.len(),
            "Chat configuration loaded"
        );
        let mut steps: Vec<Step> = config.welcome_texts.iter().map(|t| Render::bot(t).into()).collect();
        self.config = Some(config);
        steps.extend(self.show_main_menu());
        steps
    }

    /// Clear the traversal and show the main menu again from the loaded config.
    pub fn reset(&mut self) -> Vec<Step> {
        if self.config.is_none() {
            debug!(error = %FlowError::NoConfig, "Reset ignored");
            return Vec::new();
        }
        let mut steps = vec![Render::bot(RESET_PROMPT).into()];
        steps.extend(self.show_main_menu());
        steps
    }

    /// Run a continuation that reached the front of the display queue.
    pub fn resume(&mut self, continuation: Continuation) -> Vec<Step> {
        match continuation {
            Continuation::Advance if self.state == FlowState::Instruction(StepInput::AutoAdvance) => {
                self.advance()
            }
            Continuation::Reveal if self.state == FlowState::Instruction(StepInput::Revealing) => {
                self.reveal()
            }
            Continuation::Reset => self.reset(),
            Continuation::ShowReturnMenu(options) if self.state == FlowState::Complete => {
                self.show_return_menu(options)
            }
            other => {
                debug!(continuation = ?other, state = %self.state, "Dropping out-of-date continuation");
                Vec::new()
            }
        }
    }

    /// A choice button was pressed.
    pub fn select(&mut self, set_id: u64, index: usize) -> Vec<Step> {
        let Some(set) = self.choices.take() else {
            debug!(set_id, "Selection with no active choices");
            return Vec::new();
        };
        if set.id != set_id {
            debug!(set_id, active = set.id, "Ignoring selection from a stale choice set");
            self.choices = Some(set);
            return Vec::new();
        }
        let Some(choice) = set.options.get(index).cloned() else {
            debug!(set_id, index, "Selection index out of range");
            self.choices = Some(set);
            return Vec::new();
        };

        let mut steps = vec![Render::ClearChoices.into(), Render::user(&choice.text).into()];
        steps.extend(match set.purpose {
            ChoicePurpose::MainMenu => self.enter_menu(index),
            ChoicePurpose::Answer => self.record_choice(choice.value),
            ChoicePurpose::Skip => self.skip(),
            ChoicePurpose::ReturnMenu => self.return_to(&choice.value),
            ChoicePurpose::ExitSearch => self.reset(),
        });
        steps
    }

    /// Typed text while a text instruction is waiting. Anything else is
    /// ignored (empty result).
    pub fn answer_text(&mut self, text: &str) -> Vec<Step> {
        if !matches!(self.state, FlowState::Instruction(StepInput::Text { .. })) {
            debug!(state = %self.state, "Ignoring text outside a text-input step");
            return Vec::new();
        }

        let mut steps = vec![Render::user(text).into()];
        if self.choices.take().is_some() {
            steps.push(Render::ClearChoices.into());
        }
        if let Some(key) = self.current_instruction().and_then(Instruction::answer_key) {
            let key = key.to_string();
            self.user_data.insert(key, text);
        }
        steps.push(Render::input(InputState::Hidden).into());
        steps.extend(self.advance());
        steps
    }

    /// A product-search query. Ignored outside product-search mode.
    pub fn search(&mut self, query: &str) -> Vec<Step> {
        if self.state != FlowState::ProductSearch {
            debug!(state = %self.state, "Ignoring search outside product-search mode");
            return Vec::new();
        }
        let mut steps = vec![Render::user(query).into()];
        if self.choices.take().is_some() {
            steps.push(Render::ClearChoices.into());
        }
        steps.extend([
            Render::input(InputState::Disabled).into(),
            Render::typing(true).into(),
            Step::Request(Request::SearchProducts(query.to_string())),
        ]);
        steps
    }

    /// Result of the submission started by a completed flow.
    pub fn on_submitted(&mut self, result: Result<(), ChatError>) -> Vec<Step> {
        let FlowState::Submitting { return_menu } = &self.state else {
            debug!(state = %self.state, "Submission result with no submission pending");
            return Vec::new();
        };
        let return_menu = return_menu.clone();
        self.transition(FlowState::Complete);

        let mut steps = vec![Render::typing(false).into()];
        match result {
            Ok(()) => {
                info!(menu = ?self.selected_menu, fields = self.user_data.len(), "Guided flow submitted");
                steps.push(Render::bot(SUBMITTED).into());
                if return_menu.is_empty() {
                    steps.push(Step::Pause(self.pacing.completion_reset));
                    steps.push(Step::Then(Continuation::Reset));
                } else {
                    steps.push(Step::Pause(self.pacing.return_menu));
                    steps.push(Step::Then(Continuation::ShowReturnMenu(return_menu)));
                }
            }
            Err(e) => {
                warn!(error = %e, "Guided flow submission failed");
                steps.push(Render::bot(SUBMIT_FAILED).into());
                steps.push(Step::Pause(self.pacing.completion_reset));
                steps.push(Step::Then(Continuation::Reset));
            }
        }
        steps
    }

    /// Result of a product-search query.
    pub fn on_products(&mut self, result: Result<Vec<Product>, ChatError>) -> Vec<Step> {
        if self.state != FlowState::ProductSearch {
            debug!(state = %self.state, "Product results arrived outside product-search mode");
            return Vec::new();
        }
        let message = match result {
            Ok(products) if products.is_empty() => NO_PRODUCTS.to_string(),
            Ok(products) => {
                info!(count = products.len(), "Product search returned results");
                products_html(&products)
            }
            Err(e) => {
                warn!(error = %e, "Product search failed");
                SEARCH_FAILED.to_string()
            }
        };
        let exit = self.offer(ChoicePurpose::ExitSearch, [MAIN_MENU_LABEL.to_string()]);
        vec![
            Render::typing(false).into(),
            Render::bot(message).into(),
            Render::input(InputState::Enabled).into(),
            Render::Choices(exit).into(),
        ]
    }

    // ── Transitions ─────────────────────────────────────────────────

    fn transition(&mut self, next: FlowState) {
        if !self.state.can_transition_to(&next) {
            warn!(from = %self.state, to = %next, "Unexpected flow transition");
        }
        debug!(from = %self.state, to = %next, "Flow transition");
        self.state = next;
    }

    fn clear_traversal(&mut self) {
        self.user_data.clear();
        self.path = None;
        self.selected_menu = None;
        self.choices = None;
    }

    fn show_main_menu(&mut self) -> Vec<Step> {
        self.clear_traversal();
        let labels = self.config.as_ref().map(ChatConfig::menu_labels).unwrap_or_default();
        if labels.is_empty() {
            self.transition(FlowState::Idle);
            return vec![Render::input(InputState::Enabled).into()];
        }
        self.transition(FlowState::MenuDisplayed);
        let menu = self.offer(ChoicePurpose::MainMenu, labels);
        vec![
            Step::Pause(self.pacing.menu_reveal),
            Render::bot(MENU_PROMPT).into(),
            Render::Choices(menu).into(),
            Render::input(InputState::Hidden).into(),
        ]
    }

    /// Enter the menu item at `index` (main menu or return menu selection).
    fn enter_menu(&mut self, index: usize) -> Vec<Step> {
        self.clear_traversal();
        let Some(item) = self.config.as_ref().and_then(|c| c.main_menu_items.get(index)) else {
            warn!(error = %FlowError::UnknownMenuItem { index }, "Menu selection no longer resolves");
            return self.apologize(MENU_GONE);
        };
        let name = item.name.clone();
        let has_instructions = !item.instructions.is_empty();
        let product_search = item.product_search;

        info!(menu = %name, "Menu item selected");
        self.selected_menu = Some(name.clone());

        if product_search {
            self.transition(FlowState::ProductSearch);
            let exit = self.offer(ChoicePurpose::ExitSearch, [MAIN_MENU_LABEL.to_string()]);
            return vec![
                Render::bot(SEARCH_PROMPT).into(),
                Render::input(InputState::Enabled).into(),
                Render::Choices(exit).into(),
            ];
        }

        if !has_instructions {
            self.transition(FlowState::Acknowledged);
            return vec![
                Render::bot(format!("Thank you for your interest in \"{name}\".")).into(),
                Step::Pause(self.pacing.acknowledgement_reset),
                Step::Then(Continuation::Reset),
            ];
        }

        self.path = Some(InstructionPath::new(index));
        self.advance()
    }

    /// Pre-increment the cursor and process the instruction it lands on.
    fn advance(&mut self) -> Vec<Step> {
        let Some(path) = self.path.as_mut() else {
            return Vec::new();
        };
        path.advance();
        let path = *path;

        let end = match self.current_instruction() {
            None => Some(Vec::new()),
            Some(instr) if !instr.return_menu.is_empty() => Some(instr.return_menu.clone()),
            Some(_) => None,
        };
        if let Some(return_menu) = end {
            debug!(instruction_index = path.instruction_index, "Reached end of guided flow");
            return self.complete(return_menu);
        }

        debug!(instruction_index = path.instruction_index, "Advancing to instruction");
        self.transition(FlowState::Instruction(StepInput::Revealing));
        vec![
            Render::typing(true).into(),
            Step::Pause(self.pacing.typing),
            Render::typing(false).into(),
            Step::Then(Continuation::Reveal),
        ]
    }

    /// Show the current prompt and set up its input.
    fn reveal(&mut self) -> Vec<Step> {
        let Some(instr) = self.current_instruction().cloned() else {
            return Vec::new();
        };
        let mut steps = vec![Render::bot(&instr.name).into()];

        let buttons = instr.display_as == DisplayAs::Button && !instr.values.is_empty();
        if instr.require_user_input == InputRequirement::No {
            self.transition(FlowState::Instruction(StepInput::AutoAdvance));
            steps.push(Step::Pause(self.pacing.auto_advance));
            steps.push(Step::Then(Continuation::Advance));
        } else if buttons {
            self.transition(FlowState::Instruction(StepInput::Choice));
            let set = self.offer(ChoicePurpose::Answer, instr.values.clone());
            steps.push(Render::input(InputState::Hidden).into());
            steps.push(Render::Choices(set).into());
        } else {
            let skippable = instr.offers_skip();
            self.transition(FlowState::Instruction(StepInput::Text { skippable }));
            steps.push(Render::input(InputState::Enabled).into());
            if skippable {
                let set = self.offer(ChoicePurpose::Skip, [SKIP_VALUE.to_string()]);
                steps.push(Render::Choices(set).into());
            }
        }
        steps
    }

    fn record_choice(&mut self, value: String) -> Vec<Step> {
        if self.state != FlowState::Instruction(StepInput::Choice) {
            return Vec::new();
        }
        if let Some(key) = self.current_instruction().and_then(Instruction::answer_key) {
            let key = key.to_string();
            self.user_data.insert(key, value);
        }
        self.advance()
    }

    fn skip(&mut self) -> Vec<Step> {
        if !matches!(self.state, FlowState::Instruction(StepInput::Text { skippable: true })) {
            return Vec::new();
        }
        let mut steps = vec![Render::input(InputState::Hidden).into()];
        steps.extend(self.advance());
        steps
    }

    fn complete(&mut self, return_menu: Vec<String>) -> Vec<Step> {
        self.transition(FlowState::Submitting { return_menu });
        let submission = Submission {
            menu: self.selected_menu.clone().unwrap_or_default(),
            data: self.user_data.clone(),
        };
        vec![
            Render::input(InputState::Hidden).into(),
            Render::typing(true).into(),
            Step::Request(Request::Submit(submission)),
        ]
    }

    fn show_return_menu(&mut self, options: Vec<String>) -> Vec<Step> {
        self.transition(FlowState::ReturnMenuDisplayed);
        let set = self.offer(ChoicePurpose::ReturnMenu, options);
        vec![Render::bot(NEXT_PROMPT).into(), Render::Choices(set).into()]
    }

    fn return_to(&mut self, label: &str) -> Vec<Step> {
        if label == MAIN_MENU_LABEL {
            return self.reset();
        }
        match self.config.as_ref().and_then(|c| c.position_of(label)) {
            Some(index) => self.enter_menu(index),
            None => {
                warn!(error = %FlowError::UnknownOption { label: label.to_string() }, "Return menu option does not resolve");
                self.apologize(UNKNOWN_OPTION)
            }
        }
    }

    fn apologize(&mut self, message: &str) -> Vec<Step> {
        self.clear_traversal();
        self.transition(FlowState::Acknowledged);
        vec![
            Render::bot(message).into(),
            Step::Pause(self.pacing.acknowledgement_reset),
            Step::Then(Continuation::Reset),
        ]
    }

    /// Create the active choice set.
    fn offer(&mut self, purpose: ChoicePurpose, labels: impl IntoIterator<Item = String>) -> ChoiceSet {
        self.next_choice_id += 1;
        let set = ChoiceSet {
            id: self.next_choice_id,
            purpose,
            options: labels.into_iter().map(Choice::labelled).collect(),
        };
        self.choices = Some(set.clone());
        set
    }
}

fn products_html(products: &[Product]) -> String {
    let mut html = String::from("<ul class=\"chatbot-products\">");
    for p in products {
        html.push_str("<li>");
        match &p.url {
            Some(url) => html.push_str(&format!("<a href=\"{}\">{}</a>", escape(url), escape(&p.name))),
            None => html.push_str(&escape(&p.name)),
        }
        if let Some(price) = p.price {
            html.push_str(&format!(" - {price:.2}"));
        }
        if let Some(desc) = &p.description {
            html.push_str(&format!("<br>{}", escape(desc)));
        }
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
