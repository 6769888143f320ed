//! Display-step queue.
//!
//! Conversation pacing is a queue of steps consumed in order by one owner.
//! A pause holds back only the steps behind it, and a continuation expands
//! in place, so a multi-part reveal always finishes before anything that was
//! scheduled after it.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::flow::model::Submission;
use crate::render::Render;

/// Flow logic to run once the steps ahead of it have played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Move to the next instruction.
    Advance,
    /// Show the prompt of the instruction under the cursor.
    Reveal,
    /// Back to the main menu.
    Reset,
    ShowReturnMenu(Vec<String>),
}

/// Network work to start when reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartSession,
    FetchConfig,
    SendMessage(String),
    Submit(Submission),
    SearchProducts(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Render(Render),
    Pause(Duration),
    Then(Continuation),
    Request(Request),
}

impl From<Render> for Step {
    fn from(render: Render) -> Self {
        Self::Render(render)
    }
}

#[derive(Debug, Default)]
pub struct DisplayQueue {
    steps: VecDeque<Step>,
    resume_at: Option<Instant>,
}

impl DisplayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule steps after everything already queued.
    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }

    /// Schedule steps ahead of everything already queued, keeping their order.
    pub fn prepend(&mut self, steps: Vec<Step>) {
        for step in steps.into_iter().rev() {
            self.steps.push_front(step);
        }
    }

    /// Next step that may run at `now`. Pauses are consumed here and arm the
    /// queue's resume time.
    pub fn pop_ready(&mut self, now: Instant) -> Option<Step> {
        loop {
            if let Some(at) = self.resume_at {
                if at > now {
                    return None;
                }
                self.resume_at = None;
            }
            match self.steps.pop_front()? {
                Step::Pause(delay) => self.resume_at = Some(now + delay),
                step => return Some(step),
            }
        }
    }

    /// When the queue has steps waiting behind a pause, the instant it resumes.
    pub fn wake_at(&self) -> Option<Instant> {
        if self.steps.is_empty() {
            None
        } else {
            self.resume_at
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(text: &str) -> Step {
        Step::Render(Render::bot(text))
    }

    #[test]
    fn runs_in_order_until_a_pause() {
        let mut q = DisplayQueue::new();
        q.extend([bot("a"), Step::Pause(Duration::from_secs(1)), bot("b")]);

        let now = Instant::now();
        assert_eq!(q.pop_ready(now), Some(bot("a")));
        assert_eq!(q.pop_ready(now), None);
        assert_eq!(q.wake_at(), Some(now + Duration::from_secs(1)));

        assert_eq!(q.pop_ready(now + Duration::from_millis(999)), None);
        assert_eq!(q.pop_ready(now + Duration::from_secs(1)), Some(bot("b")));
        assert!(q.is_empty());
        assert_eq!(q.wake_at(), None);
    }

    #[test]
    fn zero_pause_does_not_block() {
        let mut q = DisplayQueue::new();
        q.extend([Step::Pause(Duration::ZERO), bot("a")]);
        assert_eq!(q.pop_ready(Instant::now()), Some(bot("a")));
    }

    #[test]
    fn prepend_runs_before_later_steps() {
        let mut q = DisplayQueue::new();
        q.extend([bot("later")]);
        q.prepend(vec![bot("first"), bot("second")]);
        let now = Instant::now();
        assert_eq!(q.pop_ready(now), Some(bot("first")));
        assert_eq!(q.pop_ready(now), Some(bot("second")));
        assert_eq!(q.pop_ready(now), Some(bot("later")));
    }

    #[test]
    fn trailing_pause_leaves_nothing_to_wake_for() {
        let mut q = DisplayQueue::new();
        q.extend([Step::Pause(Duration::from_secs(5))]);
        assert_eq!(q.pop_ready(Instant::now()), None);
        assert_eq!(q.wake_at(), None);
        assert_eq!(q.len(), 0);
    }
}
