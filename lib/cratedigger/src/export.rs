use shared::{MatchResult, Track};

const TRACK_HEADER: &[&str] = &["Title", "Artist", "Remix", "Source", "URL"];
const MATCH_HEADER: &[&str] = &[
    "Title",
    "Artist",
    "Remix",
    "Source",
    "URL",
    "Matched",
    "Match Title",
    "Match Artist",
    "Match URL",
    "Score",
];

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let row = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push_str("\r\n");
}

fn track_fields(track: &Track) -> [String; 5] {
    [
        track.title.clone(),
        track.artist.clone(),
        track.remix.clone().unwrap_or_default(),
        track.source.clone(),
        track.source_url.clone(),
    ]
}

/// `Title,Artist,Remix,Source,URL`, one row per aggregated track.
pub fn tracks_to_csv(tracks: &[Track]) -> String {
    let mut out = String::new();
    write_row(&mut out, TRACK_HEADER);
    for track in tracks {
        write_row(&mut out, &track_fields(track));
    }
    out
}

/// Matched rows first, then unmatched ones, each carrying the best candidate.
pub fn matches_to_csv(added: &[MatchResult], unmatched: &[MatchResult]) -> String {
    let mut out = String::new();
    write_row(&mut out, MATCH_HEADER);
    for result in added.iter().chain(unmatched) {
        let [title, artist, remix, source, url] = track_fields(&result.track);
        write_row(
            &mut out,
            &[
                title,
                artist,
                remix,
                source,
                url,
                if result.matched { "yes" } else { "no" }.to_string(),
                result.match_name.clone(),
                result.match_artist.clone(),
                result.match_url.clone(),
                format!("{:.2}", result.score),
            ],
        );
    }
    out
}
