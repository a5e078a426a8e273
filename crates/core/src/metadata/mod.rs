//! Track metadata carried in per-segment playlist tags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<f64>,
}

impl TrackMetadata {
    /// Builds a record from `(name, value)` tag pairs. Unknown names are
    /// skipped; `None` when no recognized tag is present.
    pub fn from_tag_list(tags: &[(String, String)]) -> Option<Self> {
        let mut metadata = TrackMetadata::default();
        let mut recognized = false;

        for (raw_name, raw_value) in tags {
            if raw_name.is_empty() {
                continue;
            }
            let value = raw_value.trim();
            match normalize_tag_name(raw_name).as_str() {
                "X-TITLE" => metadata.title = Some(value.to_owned()),
                "X-ARTIST" => metadata.artist = Some(value.to_owned()),
                "X-ARTWORK" => metadata.artwork = Some(value.to_owned()),
                "X-DURATION" => metadata.duration = parse_number(value),
                "X-START-TS" => metadata.start_ts = parse_number(value),
                "X-END-TS" => metadata.end_ts = parse_number(value),
                _ => continue,
            }
            recognized = true;
        }

        recognized.then_some(metadata)
    }

    /// Signature used to tell whether two records describe the same airing.
    pub fn identity(&self) -> String {
        fn num(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }
        format!(
            "{}-{}-{}-{}-{}",
            num(self.start_ts),
            num(self.end_ts),
            self.title.as_deref().unwrap_or_default(),
            self.artist.as_deref().unwrap_or_default(),
            self.artwork.as_deref().unwrap_or_default(),
        )
    }

    fn window_ms(&self) -> (Option<f64>, Option<f64>) {
        let start = self.start_ts.map(|s| s * 1_000.0);
        let end = match (self.end_ts, start, self.duration) {
            (Some(end), _, _) => Some(end * 1_000.0),
            (None, Some(start), Some(duration)) if duration != 0.0 => Some(start + duration * 1_000.0),
            _ => None,
        };
        (start, end)
    }
}

fn normalize_tag_name(name: &str) -> String {
    name.strip_prefix('#').unwrap_or(name).to_ascii_uppercase()
}

/// Longest leading number in `value`, so `"180s"` reads as 180.
fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim_start();
    value
        .char_indices()
        .map(|(at, ch)| at + ch.len_utf8())
        .filter_map(|end| value[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .last()
}

/// Splits `#X-TITLE:Some Song` into its name and value. Lines that are not
/// tags yield `None`.
pub fn parse_tag_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if !line.starts_with('#') {
        return None;
    }
    let (name, value) = line.split_once(':').unwrap_or((line, ""));
    Some((name.to_owned(), value.to_owned()))
}

/// Groups the tags preceding each segment of a media playlist and parses one
/// record per segment that carries recognized tags.
pub fn parse_playlist(text: &str) -> Vec<TrackMetadata> {
    let mut records = Vec::new();
    let mut pending = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_tag_line(line) {
            Some(tag) => pending.push(tag),
            None => {
                records.extend(TrackMetadata::from_tag_list(&pending));
                pending.clear();
            }
        }
    }
    records.extend(TrackMetadata::from_tag_list(&pending));
    records
}

/// Keeps the last record per identity, ordered by start time (missing = 0).
pub fn dedupe(entries: Vec<TrackMetadata>) -> Vec<TrackMetadata> {
    let mut unique: Vec<(String, TrackMetadata)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let identity = entry.identity();
        match unique.iter_mut().find(|(id, _)| *id == identity) {
            Some(slot) => slot.1 = entry,
            None => unique.push((identity, entry)),
        }
    }
    let mut deduped: Vec<TrackMetadata> = unique.into_iter().map(|(_, entry)| entry).collect();
    deduped.sort_by(|a, b| {
        a.start_ts
            .unwrap_or(0.0)
            .total_cmp(&b.start_ts.unwrap_or(0.0))
    });
    deduped
}

/// Record airing at `now_ms` once corrected by the server clock offset.
///
/// Scans from the newest entry. The newest entry stays current after its end
/// until a successor arrives; when nothing matches the newest entry wins.
pub fn active_track(entries: &[TrackMetadata], now_ms: f64, server_offset_ms: f64) -> Option<&TrackMetadata> {
    let now = now_ms - server_offset_ms;
    let newest = entries.len().checked_sub(1)?;

    for (index, entry) in entries.iter().enumerate().rev() {
        match entry.window_ms() {
            (Some(start), Some(end)) => {
                if (start..=end).contains(&now) || (now > end && index == newest) {
                    return Some(entry);
                }
            }
            (Some(start), None) if now >= start => return Some(entry),
            _ => {}
        }
    }
    entries.last()
}

/// Display-ready track derived from a metadata record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub duration: f64,
}

impl NowPlaying {
    pub fn from_metadata(metadata: &TrackMetadata, station_name: &str) -> Self {
        let mut duration = metadata.duration.unwrap_or(0.0);
        if duration == 0.0 {
            if let (Some(start), Some(end)) = (metadata.start_ts, metadata.end_ts) {
                duration = end - start;
            }
        }
        Self {
            title: non_empty(&metadata.title).unwrap_or("Live stream").to_owned(),
            artist: non_empty(&metadata.artist).unwrap_or(station_name).to_owned(),
            artwork: non_empty(&metadata.artwork).unwrap_or_default().to_owned(),
            duration,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
