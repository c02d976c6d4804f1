//! Conversation summarization boundary
//!
//! After enough completed turns the session compresses its transcript log
//! to bound context growth. The compression itself is delegated through
//! `Summarizer`; the shipped `TranscriptCondenser` condenses locally so the
//! default build has no second network dependency.

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Caller => "Caller",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// One finished utterance.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
}

/// Compresses a transcript log into a short running summary.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, previous_summary: &str, turns: &[TurnRecord]) -> String;
}

/// Local fallback summarizer: clips each turn and keeps the tail of the
/// combined text within a fixed budget.
pub struct TranscriptCondenser {
    /// Longest excerpt kept per turn, in characters.
    pub per_turn_chars: usize,
    /// Upper bound on the produced summary, in characters.
    pub max_chars: usize,
}

impl Default for TranscriptCondenser {
    fn default() -> Self {
        Self {
            per_turn_chars: 120,
            max_chars: 1500,
        }
    }
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl Summarizer for TranscriptCondenser {
    fn summarize(&self, previous_summary: &str, turns: &[TurnRecord]) -> String {
        let mut lines: Vec<String> = Vec::new();
        if !previous_summary.is_empty() {
            lines.push(previous_summary.to_string());
        }
        for turn in turns {
            let text = turn.text.trim();
            if text.is_empty() {
                continue;
            }
            lines.push(format!("{}: {}", turn.speaker.label(), clip(text, self.per_turn_chars)));
        }

        let mut summary = lines.join("\n");
        if summary.chars().count() > self.max_chars {
            // Keep the most recent part of the conversation.
            let start = summary
                .char_indices()
                .rev()
                .nth(self.max_chars - 1)
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            summary = summary[start..].to_string();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(speaker: Speaker, text: &str) -> TurnRecord {
        TurnRecord {
            speaker,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_condenses_turns_with_speakers() {
        let condenser = TranscriptCondenser::default();
        let turns = vec![
            turn(Speaker::Caller, "Mujhe knee pain hai"),
            turn(Speaker::Assistant, "Orthopedics department best rahega ji"),
        ];
        let summary = condenser.summarize("", &turns);
        assert!(summary.contains("Caller: Mujhe knee pain hai"));
        assert!(summary.contains("Assistant: Orthopedics"));
    }

    #[test]
    fn test_previous_summary_is_retained() {
        let condenser = TranscriptCondenser::default();
        let summary = condenser.summarize(
            "Caller asked about visiting hours.",
            &[turn(Speaker::Caller, "Aur doctor kaun hai?")],
        );
        assert!(summary.starts_with("Caller asked about visiting hours."));
        assert!(summary.contains("Aur doctor"));
    }

    #[test]
    fn test_output_is_bounded() {
        let condenser = TranscriptCondenser {
            per_turn_chars: 50,
            max_chars: 200,
        };
        let turns: Vec<TurnRecord> = (0..40)
            .map(|i| turn(Speaker::Caller, &format!("turn number {} with some padding text", i)))
            .collect();
        let summary = condenser.summarize("", &turns);
        assert!(summary.chars().count() <= 200);
        // The tail survives, the head is dropped.
        assert!(summary.contains("39"));
    }

    #[test]
    fn test_empty_turns_are_skipped() {
        let condenser = TranscriptCondenser::default();
        let summary = condenser.summarize("", &[turn(Speaker::Caller, "   ")]);
        assert!(summary.is_empty());
    }
}
