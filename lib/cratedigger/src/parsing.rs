//! Title parsing shared by every source adapter.
//!
//! Provider listings arrive as a single free-form string ("Artist - Title
//! (Extended Mix) [Label]", "Title by Artist", ...). [`parse_title`] runs an
//! ordered list of matchers and falls back to a delimiter split, then to the
//! whole string as the title.

use regex::Regex;
use shared::track::UNKNOWN_ARTIST;
use std::sync::LazyLock;

/// Phrases marking uploads that are not single tracks.
const DENYLIST: &[&str] = &[
    "mix compilation",
    "dj set",
    "live set",
    "mixtape",
    "megamix",
    "year mix",
    "monthly selection",
    "best of",
    "top 10",
    "top tracks",
    "mix show",
    "radio show",
    "special mix",
    "mixed by",
    "album mix",
    "tracklist",
    "interview",
    "behind the scenes",
    "vlog",
    "tutorial",
    "mashup",
    "yearmix",
    "classics",
    "throwback",
    "back to back",
];

/// Terms that keep an upload even when a denylisted phrase is present.
const ALLOWLIST: &[&str] = &[
    "extended mix",
    "club mix",
    "radio edit",
    "original mix",
    "remix",
];

const FALLBACK_DELIMITERS: &[&str] = &[" - ", " | ", ": ", " _ "];

static RE_VERSION_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*[\(\[]([^\)\]]*\b(?:remix|mix|edit|dub|version|rework|refix|vip|bootleg)\b[^\)\]]*)[\)\]]",
    )
    .unwrap()
});
static RE_NOISE_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*[\(\[][^\)\]]*\b(?:official|video|audio|lyrics?|visuali[sz]er|hd|hq|4k|out now|premiere|free download)\b[^\)\]]*[\)\]]",
    )
    .unwrap()
});
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy)]
enum Order {
    ArtistFirst,
    TitleFirst,
}

struct TitlePattern {
    regex: Regex,
    order: Order,
}

impl TitlePattern {
    fn new(pattern: &str, order: Order) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            order,
        }
    }
}

static TITLE_PATTERNS: LazyLock<Vec<TitlePattern>> = LazyLock::new(|| {
    vec![
        // Artist - Title (Remix)
        TitlePattern::new(
            r"^(?P<first>.+?)\s+[-–—]\s+(?P<second>.+)$",
            Order::ArtistFirst,
        ),
        // Artist "Title" (Remix)
        TitlePattern::new(
            r#"^(?P<first>[^"“”]+?)\s*["“](?P<second>[^"“”]+)["”](?P<rest>.*)$"#,
            Order::ArtistFirst,
        ),
        // Artist 'Title' (Remix)
        TitlePattern::new(
            r"^(?P<first>[^']+?)\s+'(?P<second>[^']+)'(?P<rest>.*)$",
            Order::ArtistFirst,
        ),
        // Artist | Title
        TitlePattern::new(
            r"^(?P<first>[^|]+?)\s*\|\s*(?P<second>.+)$",
            Order::ArtistFirst,
        ),
        // Title by Artist
        TitlePattern::new(
            r"^(?P<first>.+?)\s+(?i:by)\s+(?P<second>.+)$",
            Order::TitleFirst,
        ),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub artist: String,
    pub title: String,
    pub remix: Option<String>,
}

impl ParsedTitle {
    fn build(artist: &str, title: &str) -> Option<Self> {
        let artist = collapse(artist);
        let (title, remix) = split_remix(&strip_noise(title));
        if artist.is_empty() || title.is_empty() {
            return None;
        }
        Some(Self {
            artist,
            title,
            remix,
        })
    }
}

/// Split a provider title into artist, title and remix.
pub fn parse_title(raw: &str) -> ParsedTitle {
    let raw = collapse(raw);

    for pattern in TITLE_PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(&raw) else {
            continue;
        };
        let first = caps.name("first").map_or("", |m| m.as_str());
        let mut second = caps.name("second").map_or("", |m| m.as_str()).to_string();
        if let Some(rest) = caps.name("rest") {
            second.push_str(rest.as_str());
        }
        let parsed = match pattern.order {
            Order::ArtistFirst => ParsedTitle::build(first, &second),
            Order::TitleFirst => ParsedTitle::build(&second, first),
        };
        if let Some(parsed) = parsed {
            return parsed;
        }
    }

    for delimiter in FALLBACK_DELIMITERS {
        if let Some((artist, title)) = raw.split_once(delimiter) {
            if let Some(parsed) = ParsedTitle::build(artist, title) {
                return parsed;
            }
        }
    }

    let (title, remix) = split_remix(&strip_noise(&raw));
    ParsedTitle {
        artist: UNKNOWN_ARTIST.to_string(),
        title: if title.is_empty() { raw } else { title },
        remix,
    }
}

/// Lift the first bracketed version tag ("(Extended Mix)", "[Dub]") out of a title.
pub fn split_remix(title: &str) -> (String, Option<String>) {
    match RE_VERSION_BRACKET.captures(title) {
        Some(caps) => {
            let remix = caps.get(1).map(|m| collapse(m.as_str()));
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let mut base = String::with_capacity(title.len());
            base.push_str(&title[..whole.start]);
            base.push(' ');
            base.push_str(&title[whole.end..]);
            (collapse(&base), remix.filter(|r| !r.is_empty()))
        }
        None => (collapse(title), None),
    }
}

/// True for uploads that look like sets, compilations or talk content.
pub fn is_excluded_upload(title: &str) -> bool {
    let lower = title.to_lowercase();
    DENYLIST.iter().any(|k| lower.contains(k)) && !ALLOWLIST.iter().any(|k| lower.contains(k))
}

fn strip_noise(title: &str) -> String {
    let without_brackets = RE_NOISE_BRACKET.replace_all(title, "");
    let head = without_brackets
        .split(" | ")
        .next()
        .unwrap_or(&without_brackets);
    collapse(head)
}

fn collapse(s: &str) -> String {
    RE_SPACES.replace_all(s.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_dash_title_with_remix() {
        let parsed = parse_title("Nova - Deep Blue (Extended Mix)");
        assert_eq!(parsed.artist, "Nova");
        assert_eq!(parsed.title, "Deep Blue");
        assert_eq!(parsed.remix.as_deref(), Some("Extended Mix"));
    }

    #[test]
    fn packaging_noise_is_dropped() {
        let parsed = parse_title("Kerri Chandler - Rain (Official Video) [HD] | Defected");
        assert_eq!(parsed.artist, "Kerri Chandler");
        assert_eq!(parsed.title, "Rain");
        assert_eq!(parsed.remix, None);
    }

    #[test]
    fn quoted_title() {
        let parsed = parse_title(r#"Honey Dijon "Not About You" (Purple Disco Machine Remix)"#);
        assert_eq!(parsed.artist, "Honey Dijon");
        assert_eq!(parsed.title, "Not About You");
        assert_eq!(parsed.remix.as_deref(), Some("Purple Disco Machine Remix"));
    }

    #[test]
    fn pipe_separated() {
        let parsed = parse_title("Jamie Jones | My Paradise");
        assert_eq!(parsed.artist, "Jamie Jones");
        assert_eq!(parsed.title, "My Paradise");
    }

    #[test]
    fn title_by_artist_puts_artist_second() {
        let parsed = parse_title("Midnight City by M83");
        assert_eq!(parsed.artist, "M83");
        assert_eq!(parsed.title, "Midnight City");
    }

    #[test]
    fn colon_delimiter_fallback() {
        let parsed = parse_title("Solomun: Customer Is King");
        assert_eq!(parsed.artist, "Solomun");
        assert_eq!(parsed.title, "Customer Is King");
    }

    #[test]
    fn unparseable_title_keeps_whole_string() {
        let parsed = parse_title("Untitled Groove");
        assert_eq!(parsed.artist, UNKNOWN_ARTIST);
        assert_eq!(parsed.title, "Untitled Groove");
    }

    #[test]
    fn split_remix_ignores_words_inside_other_words() {
        let (title, remix) = split_remix("Bass Face (Dubstep Anthem)");
        assert_eq!(title, "Bass Face (Dubstep Anthem)");
        assert_eq!(remix, None);

        let (title, remix) = split_remix("Let It Go [Dub]");
        assert_eq!(title, "Let It Go");
        assert_eq!(remix.as_deref(), Some("Dub"));
    }

    #[test]
    fn denylist_filters_sets() {
        assert!(is_excluded_upload("Glitterbox Radio Show 301"));
        assert!(is_excluded_upload("Best Of Defected 2024 (DJ Set)"));
        assert!(!is_excluded_upload("Nova - Deep Blue (Extended Mix)"));
    }

    #[test]
    fn allowlist_overrides_denylist() {
        assert!(!is_excluded_upload("Throwback Anthem (Extended Mix)"));
        assert!(!is_excluded_upload("Mashup Kid - Lights (Remix)"));
    }
}
