//! Rendering contract between the conversation engine and the UI.
//!
//! The engine never touches a DOM or terminal; it emits [`Render`] updates
//! and a [`RenderSink`] draws them.

use serde::Serialize;

/// A bot chat bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotMessage {
    pub text: String,
    /// Render as HTML rather than plain text.
    pub is_html: bool,
}

impl BotMessage {
    /// Text containing both `<` and `>` is treated as HTML.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let is_html = text.contains('<') && text.contains('>');
        Self { text, is_html }
    }
}

/// What a set of choice buttons is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoicePurpose {
    MainMenu,
    /// A button-style instruction answer.
    Answer,
    Skip,
    ReturnMenu,
    ExitSearch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub text: String,
    pub value: String,
}

impl Choice {
    pub fn labelled(label: impl Into<String>) -> Self {
        let text = label.into();
        Self {
            value: text.clone(),
            text,
        }
    }
}

/// A group of buttons rendered together. Selections name the set by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceSet {
    pub id: u64,
    pub purpose: ChoicePurpose,
    pub options: Vec<Choice>,
}

impl ChoiceSet {
    pub fn labels(&self) -> Vec<&str> {
        self.options.iter().map(|c| c.text.as_str()).collect()
    }
}

/// State of the free-text input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    Enabled,
    Disabled,
    /// Disabled and visually hidden.
    Hidden,
}

/// One UI update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Render {
    Bot(BotMessage),
    User { text: String },
    Choices(ChoiceSet),
    ClearChoices,
    Input { state: InputState },
    Typing { on: bool },
    Loading { on: bool },
}

impl Render {
    pub fn bot(text: impl Into<String>) -> Self {
        Self::Bot(BotMessage::new(text))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn input(state: InputState) -> Self {
        Self::Input { state }
    }

    pub fn typing(on: bool) -> Self {
        Self::Typing { on }
    }
}

/// Draws updates. Implemented by the UI layer.
pub trait RenderSink: Send {
    fn render(&mut self, update: &Render);
}

/// Sink that records every update in order.
#[derive(Debug, Default)]
pub struct Transcript {
    items: Vec<Render>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Render] {
        &self.items
    }

    pub fn bot_texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|r| match r {
                Render::Bot(msg) => Some(msg.text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn user_texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|r| match r {
                Render::User { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn choice_sets(&self) -> Vec<&ChoiceSet> {
        self.items
            .iter()
            .filter_map(|r| match r {
                Render::Choices(set) => Some(set),
                _ => None,
            })
            .collect()
    }

    pub fn last_choices(&self) -> Option<&ChoiceSet> {
        self.choice_sets().pop()
    }

    pub fn last_bot(&self) -> Option<&str> {
        self.bot_texts().pop()
    }
}

impl RenderSink for Transcript {
    fn render(&mut self, update: &Render) {
        self.items.push(update.clone());
    }
}
