//! Terminal front-end: prints the conversation to stdout and turns stdin
//! lines into widget events.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use crate::render::{ChoiceSet, InputState, Render, RenderSink};
use crate::widget::UiEvent;

/// Choice set currently on screen, shared with the stdin reader so a typed
/// number can be mapped to a selection.
pub type ActiveChoices = Arc<Mutex<Option<ChoiceSet>>>;

/// Draws updates as timestamped lines.
pub struct TerminalSink {
    choices: ActiveChoices,
    title: String,
}

impl TerminalSink {
    pub fn new(choices: ActiveChoices, title: impl Into<String>) -> Self {
        Self {
            choices,
            title: title.into(),
        }
    }

    fn set_choices(&self, set: Option<ChoiceSet>) {
        *self.choices.lock().unwrap_or_else(PoisonError::into_inner) = set;
    }
}

impl RenderSink for TerminalSink {
    fn render(&mut self, update: &Render) {
        let time = Local::now().format("%H:%M");
        match update {
            Render::Bot(msg) => {
                let text = if msg.is_html {
                    strip_tags(&msg.text)
                } else {
                    msg.text.clone()
                };
                println!("[{time}] {}: {text}", self.title);
            }
            Render::User { text } => println!("[{time}] You: {text}"),
            Render::Choices(set) => {
                for (i, choice) in set.options.iter().enumerate() {
                    println!("    {}) {}", i + 1, choice.text);
                }
                self.set_choices(Some(set.clone()));
            }
            Render::ClearChoices => self.set_choices(None),
            Render::Input { state: InputState::Enabled } => {
                eprint!("> ");
                let _ = std::io::stderr().flush();
            }
            Render::Input { .. } => {}
            Render::Typing { on: true } => eprintln!("   {} is typing...", self.title),
            Render::Typing { on: false } => {}
            Render::Loading { on: true } => eprintln!("   Initializing chat..."),
            Render::Loading { on: false } => {}
        }
    }
}

/// Map one input line to an event. `None` means quit.
pub fn parse_line(line: &str, choices: Option<&ChoiceSet>) -> Option<UiEvent> {
    let line = line.trim();
    match line {
        "/quit" | "/exit" => return None,
        "/open" => return Some(UiEvent::Open),
        "/close" => return Some(UiEvent::Close),
        _ => {}
    }
    if let (Some(set), Ok(n)) = (choices, line.parse::<usize>())
        && (1..=set.options.len()).contains(&n)
    {
        return Some(UiEvent::Select {
            set_id: set.id,
            index: n - 1,
        });
    }
    Some(UiEvent::Submit(line.to_string()))
}

/// Read stdin lines into `events` until EOF or `/quit`.
pub fn spawn_stdin_reader(choices: ActiveChoices, events: UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let active = choices.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    let Some(event) = parse_line(&line, active.as_ref()) else {
                        break;
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });
}

/// Plain-text rendering of an HTML bot message.
fn strip_tags(html: &str) -> String {
    let html = html.replace("<li>", "\n  - ").replace("<br>", " / ");
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Choice, ChoicePurpose};

    fn menu() -> ChoiceSet {
        ChoiceSet {
            id: 7,
            purpose: ChoicePurpose::MainMenu,
            options: vec![Choice::labelled("Support"), Choice::labelled("Sales")],
        }
    }

    #[test]
    fn numbers_select_visible_choices() {
        let set = menu();
        assert_eq!(
            parse_line("2", Some(&set)),
            Some(UiEvent::Select { set_id: 7, index: 1 })
        );
        assert_eq!(parse_line("3", Some(&set)), Some(UiEvent::Submit("3".into())));
        assert_eq!(parse_line("0", Some(&set)), Some(UiEvent::Submit("0".into())));
        assert_eq!(parse_line("1", None), Some(UiEvent::Submit("1".into())));
    }

    #[test]
    fn commands() {
        assert_eq!(parse_line("/quit", None), None);
        assert_eq!(parse_line(" /open ", None), Some(UiEvent::Open));
        assert_eq!(parse_line("/close", None), Some(UiEvent::Close));
        assert_eq!(parse_line("hello", None), Some(UiEvent::Submit("hello".into())));
    }

    #[test]
    fn html_is_flattened() {
        let html = "<ul><li><a href=\"x\">Red &lt;Chair&gt;</a> - 49.00</li><li>Desk</li></ul>";
        assert_eq!(strip_tags(html), "\n  - Red <Chair> - 49.00\n  - Desk");
    }

    #[test]
    fn sink_tracks_active_choices() {
        let shared = ActiveChoices::default();
        let mut sink = TerminalSink::new(shared.clone(), "Bot");
        sink.render(&Render::Choices(menu()));
        assert_eq!(shared.lock().unwrap().as_ref().map(|s| s.id), Some(7));
        sink.render(&Render::ClearChoices);
        assert!(shared.lock().unwrap().is_none());
    }
}
