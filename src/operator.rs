// THEORY:
// The operator is the human in the loop. A comparison session stops and
// waits for them at two checkpoints: before the first run of every condition
// (so the scene can be physically set up) and after every run (to record a
// verdict). Both checkpoints block the whole session indefinitely.
//
// The orchestrator never reads stdin itself. It goes through the `Prompt`
// trait, which is implemented by the console for real sessions and by a
// scripted list of answers in tests. A closed input stream is reported as
// `None` and treated as the operator walking away: cancel at the gate, quit
// at review.

use crate::errors::BenchResult;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use tracing::warn;

/// Blocking line-oriented operator input.
pub trait Prompt {
    /// Shows `message` and blocks until the operator answers. `Ok(None)` means
    /// the input is closed and no answer will ever come.
    fn ask(&mut self, message: &str) -> BenchResult<Option<String>>;

    /// Shows an informational line without waiting for input.
    fn say(&mut self, message: &str);
}

/// Prompts on stdout, answers from stdin.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn ask(&mut self, message: &str) -> BenchResult<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{message}")?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Answers from a fixed script, then reports closed input.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Every question asked so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, message: &str) -> BenchResult<Option<String>> {
        self.asked.push(message.to_string());
        Ok(self.answers.pop_front())
    }

    fn say(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
    Uncertain,
    Quit,
}

impl Verdict {
    /// Accepts the full word or its first letter, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "c" | "correct" => Some(Verdict::Correct),
            "i" | "incorrect" => Some(Verdict::Incorrect),
            "u" | "uncertain" => Some(Verdict::Uncertain),
            "q" | "quit" => Some(Verdict::Quit),
            _ => None,
        }
    }
}

/// The reviewer's judgement of one run. Both fields are `None` when review
/// is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReview {
    pub verdict: Option<Verdict>,
    pub notes: Option<String>,
}

impl RunReview {
    pub fn wants_quit(&self) -> bool {
        self.verdict == Some(Verdict::Quit)
    }
}

/// Blocks for a verdict, re-asking until the answer is valid, then for
/// optional notes. Quit skips the notes.
pub fn review_run(prompt: &mut dyn Prompt) -> BenchResult<RunReview> {
    prompt.say("[REVIEW] Enter verdict: [c]orrect, [i]ncorrect, [u]ncertain, [q]uit");
    let verdict = loop {
        let Some(answer) = prompt.ask("[REVIEW] Verdict: ")? else {
            warn!("operator input closed during review; quitting session");
            break Verdict::Quit;
        };
        match Verdict::parse(&answer) {
            Some(verdict) => break verdict,
            None => prompt.say("[REVIEW] Invalid input. Use c / i / u / q."),
        }
    };

    if verdict == Verdict::Quit {
        return Ok(RunReview {
            verdict: Some(verdict),
            notes: None,
        });
    }

    let notes = prompt
        .ask("[REVIEW] Optional notes (Enter to skip): ")?
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    Ok(RunReview {
        verdict: Some(verdict),
        notes,
    })
}

/// Text form of the condition gate. `true` means start, `false` cancel.
pub fn confirm_condition(prompt: &mut dyn Prompt) -> BenchResult<bool> {
    match prompt.ask("[SETUP] Press Enter to start, or type 'q' to stop: ")? {
        Some(answer) => Ok(!answer.trim().eq_ignore_ascii_case("q")),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_accepts_letters_and_words() {
        assert_eq!(Verdict::parse("c"), Some(Verdict::Correct));
        assert_eq!(Verdict::parse(" Incorrect "), Some(Verdict::Incorrect));
        assert_eq!(Verdict::parse("U"), Some(Verdict::Uncertain));
        assert_eq!(Verdict::parse("quit"), Some(Verdict::Quit));
        assert_eq!(Verdict::parse("maybe"), None);
        assert_eq!(Verdict::parse(""), None);
    }

    #[test]
    fn review_reprompts_until_valid() {
        let mut prompt = ScriptedPrompt::new(["x", "", "i", "  blurry text  "]);
        let review = review_run(&mut prompt).unwrap();
        assert_eq!(review.verdict, Some(Verdict::Incorrect));
        assert_eq!(review.notes.as_deref(), Some("blurry text"));
        assert_eq!(prompt.asked().len(), 4);
    }

    #[test]
    fn blank_notes_become_none() {
        let mut prompt = ScriptedPrompt::new(["c", "   "]);
        let review = review_run(&mut prompt).unwrap();
        assert_eq!(review.verdict, Some(Verdict::Correct));
        assert_eq!(review.notes, None);
    }

    #[test]
    fn quit_skips_notes() {
        let mut prompt = ScriptedPrompt::new(["q", "never read"]);
        let review = review_run(&mut prompt).unwrap();
        assert!(review.wants_quit());
        assert_eq!(review.notes, None);
        assert_eq!(prompt.remaining(), 1);
    }

    #[test]
    fn closed_input_quits_review() {
        let review = review_run(&mut ScriptedPrompt::default()).unwrap();
        assert!(review.wants_quit());
    }

    #[test]
    fn condition_gate_answers() {
        assert!(confirm_condition(&mut ScriptedPrompt::new([""])).unwrap());
        assert!(confirm_condition(&mut ScriptedPrompt::new(["go"])).unwrap());
        assert!(!confirm_condition(&mut ScriptedPrompt::new(["Q"])).unwrap());
        assert!(!confirm_condition(&mut ScriptedPrompt::default()).unwrap());
    }

    #[test]
    fn verdict_serializes_lowercase() {
        let review = RunReview {
            verdict: Some(Verdict::Uncertain),
            notes: None,
        };
        assert_eq!(
            serde_json::to_string(&review).unwrap(),
            r#"{"verdict":"uncertain","notes":null}"#
        );
    }
}
