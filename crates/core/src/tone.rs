use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Professional,
    Arrogant,
    Rude,
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static ARROGANT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bobviously\b",
        r"\beveryone knows\b",
        r"\bchild'?s play\b",
        r"\bthat'?s easy\b",
        r"\btrivial\b",
        r"\bwaste of time\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RUDE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\byou don'?t understand\b",
        r"\bthat'?s stupid\b",
        r"\bdumb question\b",
        r"\bare you serious\b",
        r"\bthis is ridiculous\b",
        r"\bwho cares\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Arrogance is checked before rudeness.
pub fn detect_tone(text: &str) -> Tone {
    let normalized = WHITESPACE
        .replace_all(text.trim(), " ")
        .to_lowercase();
    if normalized.is_empty() {
        return Tone::Professional;
    }
    if ARROGANT.iter().any(|re| re.is_match(&normalized)) {
        return Tone::Arrogant;
    }
    if RUDE.iter().any(|re| re.is_match(&normalized)) {
        return Tone::Rude;
    }
    Tone::Professional
}

pub const PROFESSIONAL_TONE_REMINDER: &str = "I appreciate your participation, but let's maintain a professional tone throughout our conversation.";

const ARROGANT_REDIRECTS: &[&str] = &[
    "I appreciate your confidence! Let's channel that into demonstrating your technical knowledge.",
    "Great confidence! Now let's see how you apply that expertise to solve problems.",
];

const RUDE_REDIRECTS: &[&str] = &[
    "I understand technical interviews can be stressful. Let's take a moment and continue professionally.",
    "No worries, let's refocus on showcasing your technical abilities.",
];

/// What to say after the `warnings`-th tone violation of the session.
pub fn tone_response(tone: Tone, warnings: u32, limit: u32) -> Option<&'static str> {
    if warnings >= limit {
        return Some(PROFESSIONAL_TONE_REMINDER);
    }
    let options = match tone {
        Tone::Arrogant => ARROGANT_REDIRECTS,
        Tone::Rude => RUDE_REDIRECTS,
        Tone::Professional => return None,
    };
    options.choose(&mut rand::thread_rng()).copied()
}
