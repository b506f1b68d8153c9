//! Track similarity scoring.
//!
//! Everything here is pure: the same inputs always produce the same score, and
//! every score is clamped to `[0, 1]`.

use regex::Regex;
use shared::Track;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Score given when one normalized title contains the other.
const SUBSTRING_TITLE_SCORE: f64 = 0.9;
/// Shortest normalized title eligible for the substring rule.
const MIN_SUBSTRING_LEN: usize = 5;
/// Bonus per consecutive positional word pair shared by both titles.
const CONSECUTIVE_PAIR_BONUS: f64 = 0.1;
/// Weight of an artist matched by substring.
const ARTIST_SUBSTRING_WEIGHT: f64 = 0.8;
/// Shortest artist name eligible for the substring rule.
const MIN_ARTIST_SUBSTRING_LEN: usize = 4;
/// Weight of an artist matched by word overlap.
const ARTIST_WORD_OVERLAP_WEIGHT: f64 = 0.7;
const TITLE_WEIGHT: f64 = 0.5;
const ARTIST_WEIGHT: f64 = 0.5;
const REMIX_BONUS: f64 = 0.05;

static RE_TITLE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[()\[\]{}\-:&+/_.,!?"']"#).unwrap());
static RE_TITLE_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:feat|ft|featuring|presents|pres|original|mix|remix|rmx|rework|refix|extended|ext|radio|edit|version|vocal|instrumental|club|dub|official|audio|music|video)\b",
    )
    .unwrap()
});
static RE_ARTIST_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(?:&|and|x|\+|vs\.?|with|feat\.?|ft\.?|featuring)\s+|\s*[,;]\s*").unwrap()
});
static RE_ARTIST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:dj|mc|the|mr|ms|dr|sir)\s+").unwrap());
static RE_NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn collapse(s: &str) -> String {
    RE_SPACES.replace_all(s.trim(), " ").to_string()
}

/// Lowercase, strip brackets/punctuation and version noise words.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let no_punct = RE_TITLE_PUNCT.replace_all(&lower, " ");
    let no_noise = RE_TITLE_NOISE.replace_all(&no_punct, " ");
    collapse(&no_noise)
}

/// Similarity of two titles in `[0, 1]`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let mut t1 = normalize_title(a);
    let mut t2 = normalize_title(b);
    if t1.is_empty() || t2.is_empty() {
        t1 = collapse(&a.to_lowercase());
        t2 = collapse(&b.to_lowercase());
    }
    if t1.is_empty() || t2.is_empty() {
        return 0.0;
    }
    // identical titles take this branch too; below the length floor they
    // fall through to Jaccard, which gives them 1.0
    if (t1.chars().count() >= MIN_SUBSTRING_LEN && t2.contains(&t1))
        || (t2.chars().count() >= MIN_SUBSTRING_LEN && t1.contains(&t2))
    {
        return SUBSTRING_TITLE_SCORE;
    }

    let seq1: Vec<&str> = t1.split_whitespace().collect();
    let seq2: Vec<&str> = t2.split_whitespace().collect();
    let words1: HashSet<&str> = seq1.iter().copied().collect();
    let words2: HashSet<&str> = seq2.iter().copied().collect();

    let intersection = words1.intersection(&words2).count();
    let union = words1.union(&words2).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };

    let consecutive = seq1
        .windows(2)
        .zip(seq2.windows(2))
        .filter(|(p1, p2)| p1 == p2)
        .count();

    (jaccard + CONSECUTIVE_PAIR_BONUS * consecutive as f64).min(1.0)
}

/// Split an artist credit into normalized individual names.
pub fn split_artists(artist: &str) -> Vec<String> {
    let lower = artist.to_lowercase();
    RE_ARTIST_SEPARATORS
        .split(&lower)
        .map(|name| {
            let name = collapse(name);
            let name = RE_ARTIST_PREFIX.replace(&name, "");
            collapse(&RE_NON_WORD.replace_all(&name, ""))
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Similarity of two artist credits, averaged over the source credit's artists.
pub fn artist_similarity(source: &str, candidate: &str) -> f64 {
    let source_artists = split_artists(source);
    let candidate_artists = split_artists(candidate);

    if source_artists.is_empty() || candidate_artists.is_empty() {
        let a = collapse(&source.to_lowercase());
        let b = collapse(&candidate.to_lowercase());
        return if !a.is_empty() && a == b { 1.0 } else { 0.0 };
    }

    let total: f64 = source_artists
        .iter()
        .map(|artist| single_artist_score(artist, &candidate_artists))
        .sum();

    (total / source_artists.len() as f64).min(1.0)
}

fn single_artist_score(artist: &str, candidates: &[String]) -> f64 {
    if candidates.iter().any(|c| c == artist) {
        return 1.0;
    }

    for candidate in candidates {
        if (artist.chars().count() >= MIN_ARTIST_SUBSTRING_LEN && candidate.contains(artist))
            || (candidate.chars().count() >= MIN_ARTIST_SUBSTRING_LEN
                && artist.contains(candidate.as_str()))
        {
            return ARTIST_SUBSTRING_WEIGHT;
        }

        let words1: HashSet<&str> = artist.split_whitespace().collect();
        let words2: HashSet<&str> = candidate.split_whitespace().collect();
        let overlap = words1.intersection(&words2).count();
        if overlap > 0 {
            let ratio = overlap as f64 / words1.len().max(words2.len()) as f64;
            return ratio * ARTIST_WORD_OVERLAP_WEIGHT;
        }
    }

    0.0
}

/// Combined match score between a source track and a destination search hit.
pub fn score(track: &Track, candidate_title: &str, candidate_artist: &str) -> f64 {
    let title_score = title_similarity(&track.title, candidate_title);
    let artist_score = artist_similarity(&track.artist, candidate_artist);
    let weighted = TITLE_WEIGHT * title_score + ARTIST_WEIGHT * artist_score;

    let remix_bonus = match &track.remix {
        Some(remix)
            if !remix.trim().is_empty()
                && candidate_title
                    .to_lowercase()
                    .contains(&remix.trim().to_lowercase()) =>
        {
            REMIX_BONUS
        }
        _ => 0.0,
    };

    (weighted + remix_bonus).clamp(0.0, 1.0)
}

pub fn is_match(score: f64, min_match_score: f64) -> bool {
    score >= min_match_score
}
