//! Simple keyword-based sentiment analysis.
//!
//! Used as the fallback when the LLM intent call fails, and by the pattern
//! tracker to tag the mood of a message.

const POSITIVE: &[&str] = &[
    "happy", "glad", "love", "great", "awesome", "amazing", "thanks", "thank you", "haha", "lol",
    "excited", "proud", "yay", "😊", "❤️", "👍",
];

const NEGATIVE: &[&str] = &[
    "sad", "upset", "hate", "awful", "terrible", "stressed", "anxious", "tired", "angry",
    "lonely", "depressed", "worried", "ugh", "😢", "😡", "💔",
];

const INTENSE: &[&str] = &["so ", "really", "very", "extremely", "super", "!", "?!"];

/// Analyze text for emotional valence and intensity.
///
/// Returns `(valence, intensity)` where:
/// - `valence` is in `[-1.0, 1.0]` (negative to positive)
/// - `intensity` is in `[0.1, 1.0]`
pub fn analyze_sentiment(text: &str) -> (f32, f32) {
    let lower = text.to_lowercase();
    let pos = POSITIVE.iter().filter(|w| lower.contains(*w)).count() as f32;
    let neg = NEGATIVE.iter().filter(|w| lower.contains(*w)).count() as f32;
    let int = INTENSE.iter().filter(|w| lower.contains(*w)).count() as f32;

    let valence = (pos - neg) / (pos + neg + 1.0);
    let intensity = ((pos + neg + int) / 5.0).clamp(0.1, 1.0);

    (valence, intensity)
}
