//! Response normalization for the upstream drama API.
//!
//! The upstream API returns the same conceptual list under different keys
//! depending on the endpoint (`searchList` for search, `rankList` for the
//! trending rank, `list` for generic listings), and loosely types several
//! fields (ids as strings or numbers, flags as `0`/`1`, play counts as numbers
//! or numeric strings). Everything is resolved once here so that downstream
//! code only ever sees typed records.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::Value;
use tracing::debug;

use crate::constants::constants;

// --- Loose field decoding ---

/// Ids arrive as strings on some endpoints and as bare numbers on others.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(value_to_id(&Value::deserialize(d)?).unwrap_or_default())
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  Ok(value_to_id(&Value::deserialize(d)?))
}

fn value_to_id(v: &Value) -> Option<String> {
  match v {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Flags are `0`/`1` integers on most endpoints, booleans on a few.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Bool(b) => b,
    Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
    Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
    _ => false,
  })
}

/// Text fields that may arrive as `null` or as a bare number.
fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    _ => String::new(),
  })
}

/// Indexes and quality levels: integers, or integers sent as strings.
fn index<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
  let v = Value::deserialize(d)?;
  value_to_u32(&v).ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {v}")))
}

fn value_to_u32(v: &Value) -> Option<u32> {
  match v {
    Value::Number(n) => n.as_u64().and_then(|u| u32::try_from(u).ok()),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn variants<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<QualityVariant>, D::Error> {
  let raw = match Value::deserialize(d)? {
    Value::Array(items) => items,
    _ => return Ok(Vec::new()),
  };
  let parsed = raw.into_iter().filter_map(|v| serde_json::from_value::<QualityVariant>(v).ok()).collect();
  Ok(normalize_variants(parsed))
}

// --- Play count ---

/// Play count as the upstream reports it, resolved once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayCount {
  Count(u64),
  /// Present but not numeric (e.g. `"n/a"`, negative, an object).
  Malformed,
  #[default]
  Missing,
}

impl PlayCount {
  pub fn from_value(v: Option<&Value>) -> Self {
    match v {
      None | Some(Value::Null) => PlayCount::Missing,
      Some(Value::Number(n)) => {
        if let Some(u) = n.as_u64() {
          PlayCount::Count(u)
        } else {
          n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map_or(PlayCount::Malformed, |f| PlayCount::Count(f as u64))
        }
      }
      Some(Value::String(s)) => {
        let s = s.trim();
        if s.is_empty() {
          return PlayCount::Missing;
        }
        if let Ok(u) = s.parse::<u64>() {
          return PlayCount::Count(u);
        }
        s.parse::<f64>()
          .ok()
          .filter(|f| f.is_finite() && *f >= 0.0)
          .map_or(PlayCount::Malformed, |f| PlayCount::Count(f as u64))
      }
      Some(_) => PlayCount::Malformed,
    }
  }
}

impl Serialize for PlayCount {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    match self {
      PlayCount::Count(n) => s.serialize_u64(*n),
      PlayCount::Malformed | PlayCount::Missing => s.serialize_none(),
    }
  }
}

/// Render a play count as a short human-readable string: `999`, `1.2K`,
/// `3.4M`, `1B`. Unknown counts render as the configured placeholder.
pub fn format_count(count: PlayCount) -> String {
  const UNITS: [(u64, &str); 3] = [(1_000, "K"), (1_000_000, "M"), (1_000_000_000, "B")];

  let PlayCount::Count(n) = count else {
    return constants().count_placeholder.clone();
  };

  let Some(mut idx) = UNITS.iter().rposition(|(scale, _)| n >= *scale) else {
    return n.to_string();
  };
  let mut scaled = (n as f64 / UNITS[idx].0 as f64 * 10.0).round() / 10.0;
  // 999_950 rounds to 1000.0K; promote to the next unit instead.
  if scaled >= 1000.0 && idx + 1 < UNITS.len() {
    idx += 1;
    scaled = (n as f64 / UNITS[idx].0 as f64 * 10.0).round() / 10.0;
  }
  let text = format!("{:.1}", scaled);
  let text = text.strip_suffix(".0").unwrap_or(&text);
  format!("{}{}", text, UNITS[idx].1)
}

/// Format a playback position as `m:ss`. Non-finite input renders as `0:00`.
pub fn format_time(secs: f64) -> String {
  if !secs.is_finite() || secs < 0.0 {
    return "0:00".to_string();
  }
  let total = secs.floor() as u64;
  format!("{}:{:02}", total / 60, total % 60)
}

// --- List items ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListItem {
  #[serde(default, deserialize_with = "id_string")]
  book_id: String,
  #[serde(default)]
  book_name: Option<String>,
  #[serde(default)]
  cover: Option<String>,
  #[serde(default)]
  introduction: Option<String>,
  #[serde(default)]
  tags: Option<Vec<Value>>,
  #[serde(default)]
  tag_names: Option<Vec<Value>>,
  #[serde(default)]
  play_count: Option<Value>,
}

fn tag_strings(raw: Option<Vec<Value>>) -> Vec<String> {
  raw
    .unwrap_or_default()
    .into_iter()
    .filter_map(|v| match v {
      Value::String(s) => Some(s),
      Value::Object(map) => {
        map.get("tagName").or_else(|| map.get("name")).and_then(Value::as_str).map(str::to_string)
      }
      _ => None,
    })
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect()
}

impl From<RawListItem> for ListItem {
  fn from(raw: RawListItem) -> Self {
    let tag_names = tag_strings(raw.tag_names);
    let tags = if tag_names.is_empty() { tag_strings(raw.tags) } else { tag_names };
    ListItem {
      book_id: raw.book_id,
      book_name: raw.book_name.unwrap_or_default(),
      cover: raw.cover.unwrap_or_default(),
      introduction: raw.introduction.filter(|s| !s.trim().is_empty()),
      tags,
      play_count: PlayCount::from_value(raw.play_count.as_ref()),
    }
  }
}

/// A search, trending or listing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawListItem", rename_all = "camelCase")]
pub struct ListItem {
  pub book_id: String,
  pub book_name: String,
  pub cover: String,
  pub introduction: Option<String>,
  /// Display tag names when the upstream sent any, raw tags otherwise.
  pub tags: Vec<String>,
  pub play_count: PlayCount,
}

fn parse_items(items: &[Value]) -> Vec<ListItem> {
  items
    .iter()
    .filter_map(|v| match serde_json::from_value::<ListItem>(v.clone()) {
      Ok(item) if !item.book_id.is_empty() => Some(item),
      Ok(_) => {
        debug!("normalize: dropping list item without bookId");
        None
      }
      Err(e) => {
        debug!(err = %e, "normalize: dropping undecodable list item");
        None
      }
    })
    .collect()
}

/// Container keys checked on a non-sequence payload, highest priority first.
const LIST_KEYS: [&str; 3] = ["searchList", "rankList", "list"];

/// Locate the result sequence inside a payload without decoding it.
fn find_sequence<'a>(payload: Option<&'a Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
  match payload? {
    Value::Array(items) => Some(items),
    Value::Object(map) => keys.iter().find_map(|k| map.get(*k).and_then(Value::as_array)),
    _ => None,
  }
}

/// Extract the ordered result list from any upstream listing payload.
///
/// - absent payload: empty
/// - payload is a sequence: that sequence
/// - otherwise `searchList`, then `rankList`, then `list`; the first one
///   that is a sequence wins
/// - nothing matched: empty
pub fn extract_list(payload: Option<&Value>) -> Vec<ListItem> {
  find_sequence(payload, &LIST_KEYS).map(|items| parse_items(items)).unwrap_or_default()
}

/// First tag of an item, or the default label when it has none.
pub fn primary_tag(item: &ListItem) -> &str {
  item.tags.first().map_or(constants().default_tag.as_str(), String::as_str)
}

// --- Chapters ---

/// One entry of a title's chapter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  #[serde(default, deserialize_with = "opt_id_string")]
  pub chapter_id: Option<String>,
  #[serde(deserialize_with = "index")]
  pub chapter_index: u32,
  #[serde(default)]
  pub chapter_name: Option<String>,
  /// Paid or locked chapter.
  #[serde(default, deserialize_with = "flag")]
  pub is_charge: bool,
}

/// Chapter lists come back under `list` or `chapterList` depending on the title.
pub fn extract_chapters(payload: Option<&Value>) -> Vec<Chapter> {
  find_sequence(payload, &["list", "chapterList"])
    .map(|items| items.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect())
    .unwrap_or_default()
}

// --- Chapter video ---

/// One playable rendition of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityVariant {
  #[serde(deserialize_with = "index")]
  pub quality: u32,
  #[serde(default, deserialize_with = "text")]
  pub video_path: String,
  #[serde(default, deserialize_with = "flag")]
  pub is_default: bool,
  #[serde(default, deserialize_with = "flag")]
  pub is_entry: bool,
  #[serde(default, rename = "isVipEquity", deserialize_with = "flag")]
  pub is_vip: bool,
}

/// Enforce the per-chapter variant invariants: quality levels are unique
/// (first occurrence wins) and at most one variant is flagged default.
pub fn normalize_variants(raw: Vec<QualityVariant>) -> Vec<QualityVariant> {
  let mut out: Vec<QualityVariant> = Vec::with_capacity(raw.len());
  let mut seen_default = false;
  for mut v in raw {
    if out.iter().any(|o| o.quality == v.quality) {
      continue;
    }
    if v.is_default {
      if seen_default {
        v.is_default = false;
      }
      seen_default = true;
    }
    out.push(v);
  }
  out
}

/// Video and metadata for a single chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterVideo {
  #[serde(default, deserialize_with = "id_string")]
  pub book_id: String,
  #[serde(default, deserialize_with = "index")]
  pub chapter_index: u32,
  #[serde(default, deserialize_with = "text")]
  pub video_url: String,
  #[serde(default, deserialize_with = "variants")]
  pub qualities: Vec<QualityVariant>,
  #[serde(default)]
  pub cover: Option<String>,
  #[serde(default, deserialize_with = "flag")]
  pub unlocked_now: bool,
}

impl ChapterVideo {
  /// The variant flagged default, else the first one, else none.
  pub fn initial_quality(&self) -> Option<u32> {
    self.qualities.iter().find(|q| q.is_default).or(self.qualities.first()).map(|q| q.quality)
  }

  pub fn variant(&self, quality: u32) -> Option<&QualityVariant> {
    self.qualities.iter().find(|q| q.quality == quality)
  }
}

// --- Suggestions ---

/// Suggestions are either bare keyword strings or book records; both reduce
/// to display strings.
pub fn extract_suggestions(payload: Option<&Value>) -> Vec<String> {
  let Some(items) = find_sequence(payload, &["suggestList", "searchList", "list"]) else {
    return Vec::new();
  };
  items
    .iter()
    .filter_map(|v| match v {
      Value::String(s) => Some(s.trim().to_string()),
      Value::Object(map) => {
        ["bookName", "keyword", "name"].iter().find_map(|k| map.get(*k).and_then(Value::as_str)).map(str::to_string)
      }
      _ => None,
    })
    .filter(|s| !s.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn ids(items: &[ListItem]) -> Vec<&str> {
    items.iter().map(|i| i.book_id.as_str()).collect()
  }

  // --- extract_list ---

  #[test]
  fn extract_list_absent_and_empty_payloads() {
    assert!(extract_list(None).is_empty());
    assert!(extract_list(Some(&Value::Null)).is_empty());
    assert!(extract_list(Some(&json!([]))).is_empty());
    assert!(extract_list(Some(&json!({}))).is_empty());
  }

  #[test]
  fn extract_list_bare_sequence() {
    let payload = json!([{ "bookId": "b1" }, { "bookId": "b2" }]);
    assert_eq!(ids(&extract_list(Some(&payload))), ["b1", "b2"]);
  }

  #[test]
  fn extract_list_each_container_key() {
    for key in ["searchList", "rankList", "list"] {
      let mut map = serde_json::Map::new();
      map.insert(key.to_string(), json!([{ "bookId": "x" }, { "bookId": "y" }, { "bookId": "z" }]));
      let payload = Value::Object(map);
      assert_eq!(ids(&extract_list(Some(&payload))), ["x", "y", "z"], "key {key}");
    }
  }

  #[test]
  fn extract_list_priority_search_over_rank_over_list() {
    let all = json!({
      "list": [{ "bookId": "generic" }],
      "rankList": [{ "bookId": "rank" }],
      "searchList": [{ "bookId": "search" }],
    });
    assert_eq!(ids(&extract_list(Some(&all))), ["search"]);

    let rank_and_list = json!({ "list": [{ "bookId": "generic" }], "rankList": [{ "bookId": "rank" }] });
    assert_eq!(ids(&extract_list(Some(&rank_and_list))), ["rank"]);
  }

  #[test]
  fn extract_list_skips_non_sequence_containers() {
    let payload = json!({ "searchList": null, "rankList": "nope", "list": [{ "bookId": "g" }] });
    assert_eq!(ids(&extract_list(Some(&payload))), ["g"]);
  }

  #[test]
  fn extract_list_scalar_payload_is_empty() {
    assert!(extract_list(Some(&json!("hello"))).is_empty());
    assert!(extract_list(Some(&json!(42))).is_empty());
  }

  #[test]
  fn extract_list_numeric_ids_and_missing_ids() {
    let payload =
      json!({ "list": [{ "bookId": 41000 }, { "bookName": "no id" }, { "bookId": "  " }, { "bookId": "ok" }] });
    assert_eq!(ids(&extract_list(Some(&payload))), ["41000", "ok"]);
  }

  #[test]
  fn list_item_fields_decode() {
    let payload = json!([{
      "bookId": "b1",
      "bookName": "Lost Heiress",
      "cover": "https://img/c.jpg",
      "introduction": "A story.",
      "tagNames": ["Romance", "CEO"],
      "tags": ["raw"],
      "playCount": "12500",
    }]);
    let items = extract_list(Some(&payload));
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.book_name, "Lost Heiress");
    assert_eq!(item.cover, "https://img/c.jpg");
    assert_eq!(item.introduction.as_deref(), Some("A story."));
    assert_eq!(item.tags, ["Romance", "CEO"]);
    assert_eq!(item.play_count, PlayCount::Count(12500));
  }

  // --- primary_tag ---

  fn item(v: Value) -> ListItem {
    serde_json::from_value(v).unwrap()
  }

  #[test]
  fn primary_tag_prefers_tag_names() {
    assert_eq!(primary_tag(&item(json!({ "bookId": "a", "tagNames": ["Revenge"], "tags": ["x"] }))), "Revenge");
  }

  #[test]
  fn primary_tag_falls_back_to_tags() {
    assert_eq!(primary_tag(&item(json!({ "bookId": "a", "tags": ["Family", "Drama"] }))), "Family");
    assert_eq!(primary_tag(&item(json!({ "bookId": "a", "tagNames": [], "tags": ["Family"] }))), "Family");
  }

  #[test]
  fn primary_tag_default_label() {
    assert_eq!(primary_tag(&item(json!({ "bookId": "a" }))), "Drama");
    assert_eq!(primary_tag(&item(json!({ "bookId": "a", "tagNames": [], "tags": [] }))), "Drama");
  }

  #[test]
  fn tags_accept_tag_objects() {
    let it = item(json!({ "bookId": "a", "tags": [{ "tagName": "Mystery" }, 7] }));
    assert_eq!(it.tags, ["Mystery"]);
  }

  // --- play count ---

  #[test]
  fn play_count_union() {
    assert_eq!(PlayCount::from_value(None), PlayCount::Missing);
    assert_eq!(PlayCount::from_value(Some(&json!(null))), PlayCount::Missing);
    assert_eq!(PlayCount::from_value(Some(&json!(1200))), PlayCount::Count(1200));
    assert_eq!(PlayCount::from_value(Some(&json!(1200.7))), PlayCount::Count(1200));
    assert_eq!(PlayCount::from_value(Some(&json!(" 3400 "))), PlayCount::Count(3400));
    assert_eq!(PlayCount::from_value(Some(&json!("abc"))), PlayCount::Malformed);
    assert_eq!(PlayCount::from_value(Some(&json!(-5))), PlayCount::Malformed);
    assert_eq!(PlayCount::from_value(Some(&json!({ "n": 1 }))), PlayCount::Malformed);
  }

  #[test]
  fn format_count_suffixes() {
    assert_eq!(format_count(PlayCount::Count(0)), "0");
    assert_eq!(format_count(PlayCount::Count(999)), "999");
    assert_eq!(format_count(PlayCount::Count(1000)), "1K");
    assert_eq!(format_count(PlayCount::Count(1250)), "1.3K");
    assert_eq!(format_count(PlayCount::Count(3_400_000)), "3.4M");
    assert_eq!(format_count(PlayCount::Count(999_960)), "1M");
    assert_eq!(format_count(PlayCount::Count(2_000_000_000)), "2B");
  }

  #[test]
  fn format_count_placeholder() {
    assert_eq!(format_count(PlayCount::Missing), "-");
    assert_eq!(format_count(PlayCount::Malformed), "-");
  }

  #[test]
  fn format_time_minutes_seconds() {
    assert_eq!(format_time(0.0), "0:00");
    assert_eq!(format_time(65.9), "1:05");
    assert_eq!(format_time(f64::NAN), "0:00");
    assert_eq!(format_time(f64::INFINITY), "0:00");
  }

  // --- chapters ---

  #[test]
  fn extract_chapters_either_key() {
    let a = json!({ "list": [{ "chapterId": 9, "chapterIndex": 0, "isCharge": 0 }] });
    let b = json!({ "chapterList": [{ "chapterIndex": 1, "isCharge": 1 }] });
    assert_eq!(extract_chapters(Some(&a))[0].chapter_id.as_deref(), Some("9"));
    let locked = extract_chapters(Some(&b));
    assert_eq!(locked[0].chapter_index, 1);
    assert!(locked[0].is_charge);
    assert!(extract_chapters(Some(&json!({ "other": [] }))).is_empty());
  }

  // --- chapter video ---

  #[test]
  fn chapter_video_variants_are_normalized() {
    let data = json!({
      "bookId": 77,
      "chapterIndex": 3,
      "videoUrl": "https://v/3.mp4",
      "qualities": [
        { "quality": 720, "videoPath": "https://v/720.mp4", "isDefault": 1 },
        { "quality": 480, "videoPath": "https://v/480.mp4", "isDefault": 1, "isVipEquity": 0 },
        { "quality": 720, "videoPath": "https://v/dup.mp4" },
        { "quality": 1080, "videoPath": "https://v/1080.mp4", "isVipEquity": 1 },
        { "broken": true },
      ],
      "unlockedNow": true,
    });
    let video: ChapterVideo = serde_json::from_value(data).unwrap();
    assert_eq!(video.book_id, "77");
    assert_eq!(video.qualities.iter().map(|q| q.quality).collect::<Vec<_>>(), [720, 480, 1080]);
    assert_eq!(video.qualities.iter().filter(|q| q.is_default).count(), 1);
    assert_eq!(video.initial_quality(), Some(720));
    assert!(video.variant(1080).unwrap().is_vip);
    assert!(video.unlocked_now);
  }

  #[test]
  fn initial_quality_without_default_is_first() {
    let video: ChapterVideo = serde_json::from_value(json!({
      "videoUrl": "u",
      "qualities": [{ "quality": 540, "videoPath": "a" }, { "quality": 1080, "videoPath": "b" }],
    }))
    .unwrap();
    assert_eq!(video.initial_quality(), Some(540));

    let bare: ChapterVideo = serde_json::from_value(json!({ "videoUrl": "u" })).unwrap();
    assert_eq!(bare.initial_quality(), None);
  }

  #[test]
  fn null_video_url_falls_through_to_empty() {
    let video: ChapterVideo = serde_json::from_value(json!({
      "chapterIndex": "2",
      "videoUrl": null,
      "qualities": [{ "quality": "720", "videoPath": "https://v/720.mp4", "isDefault": 1 }],
    }))
    .unwrap();
    assert_eq!(video.chapter_index, 2);
    assert_eq!(video.video_url, "");
    assert_eq!(video.initial_quality(), Some(720));
    assert_eq!(video.variant(720).unwrap().video_path, "https://v/720.mp4");
  }

  #[test]
  fn quality_levels_accept_numeric_strings() {
    let video: ChapterVideo = serde_json::from_value(json!({
      "qualities": [
        { "quality": " 1080 ", "videoPath": "a" },
        { "quality": 540, "videoPath": "b" },
        { "quality": "hd", "videoPath": "c" },
        { "quality": null, "videoPath": "d" },
      ],
    }))
    .unwrap();
    assert_eq!(video.qualities.iter().map(|q| q.quality).collect::<Vec<_>>(), [1080, 540]);
  }

  #[test]
  fn chapter_index_accepts_numeric_strings() {
    let payload = json!({ "list": [
      { "chapterIndex": "3", "chapterName": "EP 4" },
      { "chapterIndex": 4 },
      { "chapterIndex": "four" },
      { "chapterName": "no index" },
    ] });
    let chapters = extract_chapters(Some(&payload));
    assert_eq!(chapters.iter().map(|c| c.chapter_index).collect::<Vec<_>>(), [3, 4]);
  }

  // --- suggestions ---

  #[test]
  fn suggestions_from_strings_or_books() {
    assert_eq!(extract_suggestions(Some(&json!(["ceo", " ", "bride"]))), ["ceo", "bride"]);
    let books = json!({ "suggestList": [{ "bookName": "The CEO" }, { "keyword": "ceo wife" }] });
    assert_eq!(extract_suggestions(Some(&books)), ["The CEO", "ceo wife"]);
    assert!(extract_suggestions(None).is_empty());
  }
}
