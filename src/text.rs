//! Text-processing toolkit shared by the agents, the phase tracker and the
//! cognitive mapper.
//!
//! Everything here is pure and allocation-light; none of it calls the LLM.

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Rough token estimate (about four characters per token), never zero for
/// non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        0
    } else {
        chars.div_ceil(4)
    }
}

/// Lowercased alphanumeric words, punctuation stripped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Marker lists are matched on whole words, case-insensitively:
///
/// - `"hall"` matches "hall" and "halls" but not "shall" or "hallway"
/// - a trailing `*` marks a stem, so `"integrat*"` matches "integration"
/// - multi-word markers match consecutive words ("not sure")
/// - markers carrying other symbols (`"100%"`, `"?"`) match literally
fn marker_matches(lower: &str, tokens: &[String], marker: &str) -> bool {
    let (body, stem) = match marker.strip_suffix('*') {
        Some(body) => (body, true),
        None => (marker, false),
    };
    let literal = body
        .chars()
        .any(|c| !(c.is_alphanumeric() || c.is_whitespace() || c == '\'' || c == '-'));
    if literal {
        return lower.contains(body);
    }

    let parts = tokenize(body);
    let Some((last, head)) = parts.split_last() else {
        return false;
    };
    tokens.windows(parts.len()).any(|window| {
        window[..head.len()] == *head && word_matches(&window[head.len()], last, stem)
    })
}

fn word_matches(word: &str, marker: &str, stem: bool) -> bool {
    if stem {
        return word.starts_with(marker);
    }
    word == marker || matches!(word.strip_prefix(marker), Some("s") | Some("es"))
}

/// Markers from the list that occur in the text, in list order.
pub fn matched_markers<'a>(text: &str, markers: &[&'a str]) -> Vec<&'a str> {
    let lower = text.to_lowercase();
    let tokens = tokenize(&lower);
    markers
        .iter()
        .copied()
        .filter(|m| marker_matches(&lower, &tokens, m))
        .collect()
}

/// Whether any of the markers occurs in the text.
pub fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    let tokens = tokenize(&lower);
    markers.iter().any(|m| marker_matches(&lower, &tokens, m))
}

/// Number of distinct markers from the list that occur in the text.
pub fn keyword_hits(text: &str, markers: &[&str]) -> usize {
    matched_markers(text, markers).len()
}

/// Split text into sentences, keeping the terminating punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            // Keep "1.5" or "e.g." style dots inside the sentence.
            let boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        } else if c == '\n' && chars.peek() == Some(&'\n') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Number of sentences ending with a question mark.
pub fn question_count(text: &str) -> usize {
    split_sentences(text)
        .iter()
        .filter(|s| s.trim_end().ends_with('?'))
        .count()
}

/// Whether the trimmed text ends with a question mark.
pub fn ends_with_question(text: &str) -> bool {
    text.trim_end().ends_with('?')
}

/// Keep at most `max_words` words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove every question sentence, keeping statements in order.
pub fn strip_questions(text: &str) -> String {
    split_sentences(text)
        .into_iter()
        .filter(|s| !s.ends_with('?'))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove question sentences line by line, keeping the line structure of
/// bulleted text. Lines left empty are dropped.
pub fn strip_question_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.contains('?') {
                strip_questions(line)
            } else {
                line.trim_end().to_string()
            }
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First sentence ending with a question mark.
pub fn first_question(text: &str) -> Option<String> {
    split_sentences(text)
        .into_iter()
        .find(|s| s.ends_with('?'))
}

/// Extract bullet-style lines ("- ", "* ", "1. ") as key points.
pub fn bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let stripped = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))
                .or_else(|| {
                    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
                    if digits > 0 {
                        line[digits..]
                            .strip_prefix(". ")
                            .or_else(|| line[digits..].strip_prefix(") "))
                    } else {
                        None
                    }
                })?;
            let point = stripped.trim();
            (!point.is_empty()).then(|| point.to_string())
        })
        .collect()
}

/// Content words (length > 3, not a stop word) used to anchor questions in
/// the project context.
pub fn content_words(text: &str) -> Vec<String> {
    const STOP: &[&str] = &[
        "this", "that", "with", "from", "have", "what", "your", "about", "would", "there",
        "their", "which", "should", "could", "these", "those", "into", "been", "were", "will",
        "they", "them", "then", "than", "when", "where", "while", "also", "just", "some",
        "very", "more", "most", "such", "only", "over", "design", "project",
    ];
    let mut seen = Vec::new();
    for word in tokenize(text) {
        if word.len() > 3 && !STOP.contains(&word.as_str()) && !seen.contains(&word) {
            seen.push(word);
        }
    }
    seen
}

/// Phrases a learner uses when revising an earlier claim.
pub const SELF_CORRECTION_MARKERS: &[&str] = &[
    "actually",
    "i was wrong",
    "on second thought",
    "let me reconsider",
    "i need to revise",
    "i realize now",
    "i realise now",
    "correction:",
    "instead, i",
    "i take that back",
];

/// Count self-correction markers in a text.
pub fn self_corrections(text: &str) -> usize {
    keyword_hits(text, SELF_CORRECTION_MARKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_word_and_token_counts() {
        assert_eq!(word_count("one two  three"), 3);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Hello, World! It's fine."),
            vec!["hello", "world", "it's", "fine"]
        );
    }

    #[test]
    fn test_split_sentences_keeps_decimals() {
        let sentences = split_sentences("Use a 1:12 slope. Rise is 0.5 m? Yes!");
        assert_eq!(sentences, vec!["Use a 1:12 slope.", "Rise is 0.5 m?", "Yes!"]);
    }

    #[test]
    fn test_question_helpers() {
        let text = "Consider the entry. Where does light enter? Think about it.";
        assert_eq!(question_count(text), 1);
        assert!(!ends_with_question(text));
        assert_eq!(strip_questions(text), "Consider the entry. Think about it.");
    }

    #[test]
    fn test_strip_question_lines_keeps_bullets() {
        let text = "Key points:\n- Slope 1:12.\n- Landings 60 in. Does that help?\nWhat next?";
        assert_eq!(
            strip_question_lines(text),
            "Key points:\n- Slope 1:12.\n- Landings 60 in."
        );
        assert_eq!(
            first_question("Zone by noise. Which zone first? Why?").as_deref(),
            Some("Which zone first?")
        );
        assert_eq!(first_question("No questions here."), None);
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("a b c d", 2), "a b");
        assert_eq!(truncate_words("a", 5), "a");
    }

    #[test]
    fn test_bullet_points() {
        let text = "Intro\n- first point\n* second\n3. third\nnot a bullet";
        assert_eq!(bullet_points(text), vec!["first point", "second", "third"]);
    }

    #[test]
    fn test_content_words_skip_stop_words() {
        let words = content_words("A community centre with a courtyard and a courtyard");
        assert_eq!(words, vec!["community", "centre", "courtyard"]);
    }

    #[test]
    fn test_self_corrections() {
        assert_eq!(
            self_corrections("Actually, I was wrong about the stair."),
            2
        );
        assert_eq!(self_corrections("The stair is fine."), 0);
    }

    #[test]
    fn test_markers_match_whole_words() {
        assert!(!contains_any("The plan is imperfect", &["perfect"]));
        assert!(!contains_any("We shall see", &["hall"]));
        assert!(!contains_any("A fire-proof swallow nest", &["roof", "wall"]));
        assert!(contains_any("Two halls and a roof", &["hall"]));
        assert!(contains_any("Sketches of the entry", &["sketch"]));
        assert!(!contains_any("The hallway is long", &["hall"]));
    }

    #[test]
    fn test_stems_phrases_and_literal_markers() {
        assert!(contains_any("Better integration of the yard", &["integrat*"]));
        assert!(!contains_any("Disintegration", &["integrat*"]));
        assert!(contains_any("I'm NOT sure, honestly", &["not sure"]));
        assert!(!contains_any("I am not quite sure", &["not sure"]));
        assert!(contains_any("I'm 100% certain", &["100%"]));
        assert!(contains_any("site?", &["?"]));
        assert!(contains_any("a trade-off", &["trade-off"]));
        assert_eq!(
            matched_markers("Stair, ramp and a roof", &["roof", "door", "ramp", "stair"]),
            vec!["roof", "ramp", "stair"]
        );
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        assert!(contains_any("Not SURE about this", &["not sure"]));
        assert_eq!(keyword_hits("ramp slope ramp", &["ramp", "slope", "door"]), 2);
    }
}
