//! Text Chunker - Split long text into pieces a TTS model accepts
//!
//! Text is first cut at sentence endings and sentences are packed greedily
//! into chunks. A sentence that alone exceeds the budget is bisected at the
//! most balanced clause or word boundary, recursively, until every piece fits.
//! Words are never broken unless a single word is longer than the budget.

use serde::Deserialize;

/// Sentence-ending punctuation (English and CJK)
const SENTENCE_ENDINGS: [char; 7] = ['.', '!', '?', '…', '。', '！', '？'];

/// Clause punctuation tried before falling back to plain word boundaries
const CLAUSE_ENDINGS: [char; 8] = [',', ';', ':', '—', '，', '；', '：', '、'];

/// Trailing characters allowed after a sentence ending (closing quotes etc.)
const CLOSERS: [char; 6] = ['"', '\'', ')', ']', '”', '’'];

/// Smallest byte budget that fits any single UTF-8 character
pub const MIN_BYTE_BUDGET: usize = 4;

// ============================================================================
// DATA MODELS
// ============================================================================

/// Unit in which a chunk budget is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Chars,
    Bytes,
    Words,
}

/// Maximum input size an engine accepts per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkPolicy {
    pub max_units: usize,
    pub unit: LengthUnit,
}

impl ChunkPolicy {
    pub fn chars(max_units: usize) -> Self {
        Self {
            max_units,
            unit: LengthUnit::Chars,
        }
    }

    pub fn bytes(max_units: usize) -> Self {
        Self {
            max_units,
            unit: LengthUnit::Bytes,
        }
    }

    pub fn words(max_units: usize) -> Self {
        Self {
            max_units,
            unit: LengthUnit::Words,
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        match self.unit {
            LengthUnit::Chars => text.chars().count(),
            LengthUnit::Bytes => text.len(),
            LengthUnit::Words => text.split_whitespace().count(),
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self::chars(400)
    }
}

/// A piece of text sized for one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Length in the policy's unit
    pub length: usize,
}

// ============================================================================
// CHUNKER
// ============================================================================

pub struct TextChunker {
    policy: ChunkPolicy,
}

impl TextChunker {
    /// Budgets below what one character needs are raised to that minimum
    pub fn new(policy: ChunkPolicy) -> Self {
        let floor = match policy.unit {
            LengthUnit::Bytes => MIN_BYTE_BUDGET,
            LengthUnit::Chars | LengthUnit::Words => 1,
        };
        if policy.max_units < floor {
            ::log::warn!(
                "Chunk budget of {} {:?} cannot hold one character, using {}",
                policy.max_units,
                policy.unit,
                floor
            );
        }
        let policy = ChunkPolicy {
            max_units: policy.max_units.max(floor),
            ..policy
        };
        Self { policy }
    }

    pub fn policy(&self) -> ChunkPolicy {
        self.policy
    }

    /// Split `text` into chunks that each fit the policy
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_sentences(text) {
            let candidate = join(&current, &sentence);
            if self.fits(&candidate) {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }

            if self.fits(&sentence) {
                current = sentence;
            } else {
                self.bisect(&sentence, &mut chunks);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|text| TextChunk {
                length: self.policy.measure(&text),
                text,
            })
            .collect()
    }

    fn fits(&self, text: &str) -> bool {
        self.policy.measure(text) <= self.policy.max_units
    }

    /// Recursively halve an oversized piece at its most balanced boundary
    fn bisect(&self, text: &str, out: &mut Vec<String>) {
        if self.fits(text) {
            out.push(text.to_string());
            return;
        }

        let clauses = split_clauses(text);
        let parts: Vec<&str> = if clauses.len() > 1 {
            clauses.iter().map(String::as_str).collect()
        } else {
            text.split_whitespace().collect()
        };

        if parts.len() < 2 {
            self.hard_split(text, out);
            return;
        }

        let (left, right) = resplit_strings(&parts);
        self.bisect(&left, out);
        self.bisect(&right, out);
    }

    /// Last resort for a single word longer than the budget
    ///
    /// Cuts between characters, so every piece fits as long as the budget
    /// holds one character, which `new` guarantees.
    fn hard_split(&self, word: &str, out: &mut Vec<String>) {
        let mut piece = String::new();
        for c in word.chars() {
            piece.push(c);
            if !self.fits(&piece) {
                piece.pop();
                if !piece.is_empty() {
                    out.push(std::mem::take(&mut piece));
                }
                piece.push(c);
            }
        }
        if !piece.is_empty() {
            out.push(piece);
        }
    }
}

/// Split `parts` into two joined halves whose lengths differ the least
///
/// Lengths count the single spaces used to join parts. The first split point
/// with the minimal difference wins. Both halves are non-empty whenever there
/// are at least two parts.
pub fn resplit_strings(parts: &[&str]) -> (String, String) {
    match parts.len() {
        0 => return (String::new(), String::new()),
        1 => return (parts[0].to_string(), String::new()),
        _ => {}
    }

    let lengths: Vec<usize> = parts.iter().map(|p| p.chars().count()).collect();
    let total = lengths.iter().sum::<usize>() + lengths.len() - 1;

    let mut left_len = 0usize;
    let mut best_split = 1;
    let mut best_diff = usize::MAX;

    for i in 1..parts.len() {
        left_len += lengths[i - 1] + usize::from(i > 1);
        let right_len = total - left_len - 1;
        let diff = left_len.abs_diff(right_len);
        if diff < best_diff {
            best_diff = diff;
            best_split = i;
        }
    }

    (parts[..best_split].join(" "), parts[best_split..].join(" "))
}

/// Clean text for speech: strip markdown and normalize typography
pub fn normalize_for_speech(text: &str) -> String {
    let mut lines = Vec::new();

    for line in text.lines() {
        let mut line = line.trim();

        // Headers: ## text → text
        if line.starts_with('#') {
            line = line.trim_start_matches('#').trim_start();
        }

        // List markers: "- ", "* ", "+ "
        for marker in ["- ", "* ", "+ "] {
            if let Some(rest) = line.strip_prefix(marker) {
                line = rest;
            }
        }

        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    let mut result = lines.join("\n");

    result = result.replace("**", "").replace("__", "").replace('`', "");
    result = strip_links(&result);

    result
        .replace(['“', '”', '„'], "\"")
        .replace(['‘', '’'], "'")
        .replace(" — ", ", ")
        .replace(['–', '—'], ", ")
        .replace('\u{a0}', " ")
}

/// Links: [text](url) → text
fn strip_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('[') {
        let after = &rest[start..];
        let link = after
            .find("](")
            .and_then(|middle| after[middle..].find(')').map(|end| (middle, middle + end)));

        match link {
            Some((middle, end)) => {
                result.push_str(&rest[..start]);
                result.push_str(&after[1..middle]);
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[..start + 1]);
                rest = &rest[start + 1..];
            }
        }
    }

    result.push_str(rest);
    result
}

// ============================================================================
// BOUNDARIES
// ============================================================================

fn join(current: &str, next: &str) -> String {
    if current.is_empty() {
        next.to_string()
    } else {
        format!("{} {}", current, next)
    }
}

/// Words ending a sentence, allowing trailing quotes or brackets
fn ends_with_any(word: &str, marks: &[char]) -> bool {
    word.trim_end_matches(|c| CLOSERS.contains(&c))
        .chars()
        .last()
        .map_or(false, |c| marks.contains(&c))
}

/// Group whitespace-separated words into runs that end at a boundary mark
fn group_words(text: &str, marks: &[char]) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        current.push(word);
        if ends_with_any(word, marks) {
            groups.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        groups.push(current.join(" "));
    }

    groups
}

fn split_sentences(text: &str) -> Vec<String> {
    group_words(text, &SENTENCE_ENDINGS)
}

fn split_clauses(text: &str) -> Vec<String> {
    group_words(text, &CLAUSE_ENDINGS)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const VOCABULARY: &[&str] = &[
        "the", "queue", "is", "drained,", "slowly;", "Grüße", "München.", "naïve", "日本語", "café!", "über",
        "(quoted)", "\"done.\"", "why?", "ok", "Straße:", "a", "supercalifragilistic", "résumé…", "東京。",
    ];

    fn random_text(rng: &mut StdRng) -> String {
        let words = rng.gen_range(0..60);
        let mut text = String::new();
        for _ in 0..words {
            text.push_str(VOCABULARY[rng.gen_range(0..VOCABULARY.len())]);
            text.push_str(if rng.gen_bool(0.1) { "\n  " } else { " " });
        }
        text
    }

    fn words_of(chunks: &[TextChunk]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_short_sentences_are_not_split() {
        let chunks = TextChunker::new(ChunkPolicy::chars(4)).chunk("A. B. C.");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A.", "B.", "C."]);
        assert!(chunks.iter().all(|c| c.length <= 4));
    }

    #[test]
    fn test_sentences_are_packed_greedily() {
        let chunks = TextChunker::new(ChunkPolicy::chars(30)).chunk("One two. Three four. Five six seven eight.");

        assert_eq!(chunks[0].text, "One two. Three four.");
        assert_eq!(chunks[1].text, "Five six seven eight.");
    }

    #[test]
    fn test_chunks_cover_input_and_fit_budget() {
        let text = "The queue is drained on a background thread, one task at a time; each task \
                    is acknowledged once handled. Long sentences without much punctuation keep going \
                    and going until the chunker has to bisect them at a balanced word boundary. Short one!";

        for budget in [15, 40, 120, 1000] {
            for policy in [ChunkPolicy::chars(budget), ChunkPolicy::bytes(budget)] {
                let chunks = TextChunker::new(policy).chunk(text);

                assert!(chunks.iter().all(|c| c.length <= budget), "budget {}", budget);
                assert_eq!(
                    words_of(&chunks),
                    text.split_whitespace().map(str::to_string).collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn test_random_text_round_trips_within_budget() {
        let mut rng = StdRng::seed_from_u64(42);

        for case in 0..300 {
            let text = random_text(&mut rng);
            let budget = rng.gen_range(1..50);
            let policy = match case % 3 {
                0 => ChunkPolicy::chars(budget),
                1 => ChunkPolicy::bytes(budget),
                _ => ChunkPolicy::words(budget),
            };
            let chunker = TextChunker::new(policy);
            let max = chunker.policy().max_units;
            let chunks = chunker.chunk(&text);

            for chunk in &chunks {
                assert!(!chunk.text.is_empty(), "case {}", case);
                assert_eq!(chunk.length, policy.measure(&chunk.text));
                assert!(chunk.length <= max, "case {}: {:?} over {:?}", case, chunk.text, chunker.policy());
            }

            let squeezed = |s: &str| s.split_whitespace().collect::<String>();
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(squeezed(&joined), squeezed(&text), "case {}", case);

            // Without hard splits, chunks are runs of whole words
            if text.split_whitespace().all(|w| policy.measure(w) <= max) {
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                let rejoined = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
                assert_eq!(rejoined, normalized, "case {}", case);
            }
        }
    }

    #[test]
    fn test_byte_budget_below_one_character_is_raised() {
        let chunker = TextChunker::new(ChunkPolicy::bytes(2));
        assert_eq!(chunker.policy().max_units, MIN_BYTE_BUDGET);

        let chunks = chunker.chunk("日本語𝄞");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["日", "本", "語", "𝄞"]);
        assert!(chunks.iter().all(|c| c.text.len() <= MIN_BYTE_BUDGET));
    }

    #[test]
    fn test_word_budget() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = TextChunker::new(ChunkPolicy::words(3)).chunk(text);

        assert!(chunks.iter().all(|c| c.length <= 3));
        assert_eq!(words_of(&chunks).len(), 8);
    }

    #[test]
    fn test_clause_boundaries_preferred() {
        let chunks = TextChunker::new(ChunkPolicy::chars(25)).chunk("first part here, second part there");

        assert_eq!(chunks[0].text, "first part here,");
        assert_eq!(chunks[1].text, "second part there");
    }

    #[test]
    fn test_overlong_word_is_hard_split() {
        let chunks = TextChunker::new(ChunkPolicy::chars(4)).chunk("abcdefghij");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_multibyte_text_respects_byte_budget() {
        let text = "Grüße aus München. Schöne Tage überall, sagt man.";
        let chunks = TextChunker::new(ChunkPolicy::bytes(20)).chunk(text);

        assert!(chunks.iter().all(|c| c.text.len() <= 20));
        assert_eq!(words_of(&chunks).join(" "), text);
    }

    #[test]
    fn test_empty_input() {
        assert!(TextChunker::new(ChunkPolicy::default()).chunk("   \n ").is_empty());
    }

    #[test]
    fn test_resplit_strings_is_balanced() {
        let (left, right) = resplit_strings(&["aa", "b", "ccc", "dd"]);
        assert_eq!(left, "aa b");
        assert_eq!(right, "ccc dd");

        let all = ["aa", "b", "ccc", "dd"];
        let best = (1..all.len())
            .map(|i| all[..i].join(" ").len().abs_diff(all[i..].join(" ").len()))
            .min()
            .unwrap();
        assert_eq!(left.len().abs_diff(right.len()), best);
    }

    #[test]
    fn test_resplit_strings_edges() {
        assert_eq!(resplit_strings(&[]), (String::new(), String::new()));
        assert_eq!(resplit_strings(&["solo"]), ("solo".to_string(), String::new()));

        let (left, right) = resplit_strings(&["x", "y"]);
        assert_eq!((left.as_str(), right.as_str()), ("x", "y"));
    }

    #[test]
    fn test_normalize_for_speech() {
        let text = "## Title\n- **Bold** point with `code`\nSee [the docs](https://x.y) — now “quoted”.";
        let cleaned = normalize_for_speech(text);

        assert_eq!(cleaned, "Title\nBold point with code\nSee the docs, now \"quoted\".");
    }
}
