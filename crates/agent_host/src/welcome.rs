//! Typewriter frames for the welcome banner.

use shared::transcript::CURSOR_GLYPH;

/// Yields the banner one character longer per frame. Every frame but the
/// last carries a trailing cursor glyph.
#[derive(Debug, Clone)]
pub struct WelcomeAnimation {
    chars: Vec<char>,
    shown: usize,
}

impl WelcomeAnimation {
    pub fn new(banner: &str) -> Self {
        Self {
            chars: banner.chars().collect(),
            shown: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shown >= self.chars.len()
    }

    /// The full banner, as shown by the final frame.
    pub fn banner(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn next_frame(&mut self) -> Option<String> {
        if self.is_finished() {
            return None;
        }
        self.shown += 1;
        let mut frame: String = self.chars[..self.shown].iter().collect();
        if !self.is_finished() {
            frame.push(CURSOR_GLYPH);
        }
        Some(frame)
    }
}
