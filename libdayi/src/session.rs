//! Sentence input session.
//!
//! Holds the code buffer of the sentence being typed, the alternatives the
//! engine offered for it, and which one (possibly hand-edited) is on screen.
//! Committing feeds the difference between the engine's first choice and the
//! committed text back into learning.
use libdayi_core::{Error, Prediction, Result};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::parser::is_valid_code;

pub struct SentenceSession<'e> {
    engine: &'e Engine,
    codes: Vec<String>,
    predictions: Vec<Prediction>,
    cursor: usize,
    /// Characters currently shown, one per code.
    shown: Vec<String>,
}

impl<'e> SentenceSession<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            codes: Vec::new(),
            predictions: Vec::new(),
            cursor: 0,
            shown: Vec::new(),
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Append a code. The code must be well formed, known to the index, and
    /// fit in the buffer. Any shown prediction is discarded.
    pub fn push_code(&mut self, code: &str) -> Result<()> {
        let code = code.trim().to_lowercase();
        if !is_valid_code(&code) {
            return Err(Error::input(format!("`{}` is not a Dàyì code", code)));
        }
        if self.engine.candidates(&code).is_empty() {
            return Err(Error::lookup(code));
        }
        let limit = self.engine.parser().max_codes();
        if self.codes.len() >= limit {
            return Err(Error::input(format!("code buffer is full ({} codes)", limit)));
        }
        self.codes.push(code);
        self.reset_predictions();
        Ok(())
    }

    /// Remove the last code.
    pub fn pop_code(&mut self) -> Option<String> {
        let code = self.codes.pop();
        if code.is_some() {
            self.reset_predictions();
        }
        code
    }

    /// Decode the buffer and show the best alternative.
    pub fn predict(&mut self) -> Result<&[Prediction]> {
        let k = self.engine.config().top_k.max(1);
        self.predictions = self.engine.decode_top_k(&self.codes, k)?;
        self.cursor = 0;
        self.shown = self
            .predictions
            .first()
            .map(|p| p.characters())
            .unwrap_or_default();
        Ok(self.predictions.as_slice())
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    /// Index of the alternative currently shown.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The sentence currently shown, including manual replacements.
    pub fn current(&self) -> String {
        self.shown.concat()
    }

    /// Show the next alternative, wrapping around.
    pub fn next_alternative(&mut self) -> Option<String> {
        if self.predictions.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.predictions.len();
        self.shown = self.predictions[self.cursor].characters();
        Some(self.current())
    }

    /// Show the previous alternative, wrapping around.
    pub fn previous_alternative(&mut self) -> Option<String> {
        if self.predictions.is_empty() {
            return None;
        }
        let len = self.predictions.len();
        self.cursor = (self.cursor + len - 1) % len;
        self.shown = self.predictions[self.cursor].characters();
        Some(self.current())
    }

    /// Replace the character at `position` with another candidate of the
    /// same code.
    pub fn replace_at(&mut self, position: usize, character: &str) -> Result<()> {
        if self.shown.is_empty() {
            return Err(Error::input("nothing predicted yet"));
        }
        let code = self.codes.get(position).ok_or_else(|| {
            Error::input(format!(
                "position {} is outside a {}-code sentence",
                position,
                self.codes.len()
            ))
        })?;
        if !self
            .engine
            .candidates(code)
            .iter()
            .any(|c| c.character == character)
        {
            return Err(Error::input(format!(
                "`{}` is not a candidate of code `{}`",
                character, code
            )));
        }
        self.shown[position] = character.to_string();
        Ok(())
    }

    /// Commit the shown sentence and learn from how it differs from the
    /// engine's first choice. Every position where the user picked another
    /// character also updates that code's selection order. The session is
    /// empty afterwards.
    pub fn commit(&mut self) -> Result<String> {
        if self.shown.is_empty() {
            self.predict()?;
        }
        let sentence = self.current();
        if let Some(best) = self.predictions.first() {
            let best = best.characters();
            let events = self.engine.record_correction(&best, &self.shown);
            for ((code, chosen), predicted) in self.codes.iter().zip(&self.shown).zip(&best) {
                if chosen == predicted {
                    continue;
                }
                if let Err(e) = self.engine.record_selection(code, chosen) {
                    warn!(code = %code, error = %e, "selection not recorded");
                }
            }
            debug!(events = events.len(), sentence = %sentence, "sentence committed");
        }
        self.cancel();
        Ok(sentence)
    }

    /// Drop the buffer and everything predicted for it.
    pub fn cancel(&mut self) {
        self.codes.clear();
        self.reset_predictions();
    }

    fn reset_predictions(&mut self) {
        self.predictions.clear();
        self.shown.clear();
        self.cursor = 0;
    }
}
