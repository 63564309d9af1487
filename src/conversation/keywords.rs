//! Interruption keyword matching.

/// Strip punctuation that STT inserts (commas, periods, etc.) so that
/// phrase matching is resilient to transcription formatting differences.
/// For example, "Hold on, please." → "hold on please".
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive whole-word matcher over a fixed keyword set.
#[derive(Debug, Clone, Default)]
pub struct InterruptionKeywords {
    phrases: Vec<String>,
}

impl InterruptionKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = keywords
            .into_iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { phrases }
    }

    /// The first keyword found in `text`, if any. "stop" matches "please stop"
    /// but not "stopwatch".
    pub fn find(&self, text: &str) -> Option<&str> {
        let padded = format!(" {} ", normalize(text));
        self.phrases
            .iter()
            .find(|phrase| padded.contains(&format!(" {phrase} ")))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}
