//! Transport-level decoding of inbound request bodies.
//!
//! Decoding is chosen by `Content-Type`:
//! - `application/json` and `*+json` decode to the JSON value; the top level
//!   must be an object or array
//! - `text/*` decodes to a JSON string
//! - `application/x-www-form-urlencoded` decodes to an object of strings.
//!   Bracketed keys nest (`a[b]=1`, `a[]=1`, `a[0]=1`) and repeated keys
//!   collect into an array
//! - anything else, or an empty body, yields `{}`

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::{RelayError, Result};

/// A request body exactly as it came off the wire.
#[derive(Clone, Copy, Debug)]
pub struct RawBody<'a> {
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<&'a str>,
    /// Body bytes.
    pub bytes: &'a [u8],
}

impl<'a> RawBody<'a> {
    /// Wrap a body and its `Content-Type` header value.
    pub fn new(content_type: Option<&'a str>, bytes: &'a [u8]) -> Self {
        Self {
            content_type,
            bytes,
        }
    }

    /// Decode into a JSON value.
    pub fn decode(&self) -> Result<Value> {
        if self.bytes.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        match BodyKind::from_content_type(self.content_type) {
            BodyKind::Json => decode_json(self.bytes),
            BodyKind::Text => std::str::from_utf8(self.bytes)
                .map(|s| Value::String(s.to_owned()))
                .map_err(|e| RelayError::MalformedPayload(format!("invalid UTF-8 text: {e}"))),
            BodyKind::Form => Ok(decode_form(self.bytes)),
            BodyKind::Other => Ok(Value::Object(Map::new())),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Json,
    Text,
    Form,
    Other,
}

impl BodyKind {
    fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return Self::Other;
        };
        let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence.starts_with("text/") {
            Self::Text
        } else if essence == "application/x-www-form-urlencoded" {
            Self::Form
        } else {
            Self::Other
        }
    }
}

fn decode_json(bytes: &[u8]) -> Result<Value> {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{' | b'[') => serde_json::from_slice(bytes)
            .map_err(|e| RelayError::MalformedPayload(format!("invalid JSON: {e}"))),
        _ => Err(RelayError::MalformedPayload(
            "JSON body must be an object or array".into(),
        )),
    }
}

/// Bracket nesting honoured in form keys; anything deeper stays one literal key.
const FORM_MAX_DEPTH: usize = 5;
/// Largest `a[N]` index kept as an array slot; larger ones become object keys.
const FORM_ARRAY_LIMIT: usize = 20;

fn decode_form(bytes: &[u8]) -> Value {
    let mut root = FormNode::default();
    for (key, value) in form_urlencoded::parse(bytes) {
        let (head, rest) = split_form_key(&key);
        let mut node = root.named(head);
        for segment in rest {
            node = match segment {
                Segment::Push => node.push(),
                Segment::Index(i) => node.indexed.entry(i).or_default(),
                Segment::Name(name) => node.named(name),
            };
        }
        node.leaves.push(value.into_owned());
    }
    let mut map = Map::new();
    for (name, node) in root.names {
        let _ = map.insert(name, node.into_value());
    }
    Value::Object(map)
}

enum Segment {
    Push,
    Index(usize),
    Name(String),
}

impl Segment {
    fn parse(inner: &str) -> Self {
        if inner.is_empty() {
            return Self::Push;
        }
        match inner.parse::<usize>() {
            Ok(i) if i <= FORM_ARRAY_LIMIT && inner.bytes().all(|b| b.is_ascii_digit()) => {
                Self::Index(i)
            }
            _ => Self::Name(inner.to_owned()),
        }
    }
}

/// `a[b][]` -> (`a`, [Name(b), Push]). A key whose first bracket never
/// closes stays literal; a malformed or too-deep tail becomes one name.
fn split_form_key(key: &str) -> (String, Vec<Segment>) {
    let Some(open) = key.find('[') else {
        return (key.to_owned(), Vec::new());
    };
    let (head, mut tail) = key.split_at(open);
    let mut inners: Vec<&str> = Vec::new();
    let mut leftover = None;
    while !tail.is_empty() {
        let closed = tail
            .strip_prefix('[')
            .and_then(|t| t.find(']').map(|end| (&t[..end], &t[end + 1..])))
            .filter(|(inner, _)| !inner.contains('['));
        match closed {
            Some((inner, next)) if inners.len() < FORM_MAX_DEPTH => {
                inners.push(inner);
                tail = next;
            }
            _ if inners.is_empty() => return (key.to_owned(), Vec::new()),
            _ => {
                leftover = Some(tail);
                break;
            }
        }
    }

    let mut inners = inners.into_iter();
    let head = if head.is_empty() {
        inners.next().unwrap_or_default().to_owned()
    } else {
        head.to_owned()
    };
    let mut segments: Vec<Segment> = inners.map(Segment::parse).collect();
    if let Some(rest) = leftover {
        segments.push(Segment::Name(rest.to_owned()));
    }
    (head, segments)
}

/// Intermediate tree for form keys, converted to JSON once all pairs are in.
#[derive(Default)]
struct FormNode {
    leaves: Vec<String>,
    indexed: BTreeMap<usize, FormNode>,
    pushed: Vec<FormNode>,
    names: Vec<(String, FormNode)>,
}

impl FormNode {
    fn named(&mut self, name: String) -> &mut FormNode {
        let pos = match self.names.iter().position(|(n, _)| *n == name) {
            Some(pos) => pos,
            None => {
                self.names.push((name, FormNode::default()));
                self.names.len() - 1
            }
        };
        &mut self.names[pos].1
    }

    fn push(&mut self) -> &mut FormNode {
        self.pushed.push(FormNode::default());
        let last = self.pushed.len() - 1;
        &mut self.pushed[last]
    }

    fn has_children(&self) -> bool {
        !(self.indexed.is_empty() && self.pushed.is_empty() && self.names.is_empty())
    }

    fn into_value(self) -> Value {
        let has_children = self.has_children();
        let mut leaves: Vec<Value> = self.leaves.into_iter().map(Value::String).collect();
        if !has_children {
            return match leaves.len() {
                1 => leaves.pop().unwrap_or(Value::Null),
                _ => Value::Array(leaves),
            };
        }

        let slots = self.indexed.into_iter().map(|(i, n)| (i, n.into_value()));
        let container = if self.names.is_empty() {
            let mut items: Vec<Value> = slots.map(|(_, v)| v).collect();
            items.extend(self.pushed.into_iter().map(FormNode::into_value));
            Value::Array(items)
        } else {
            let mut map = Map::new();
            let mut next = 0;
            for (i, v) in slots {
                let _ = map.insert(i.to_string(), v);
                next = i + 1;
            }
            for (offset, n) in self.pushed.into_iter().enumerate() {
                let _ = map.insert((next + offset).to_string(), n.into_value());
            }
            for (name, n) in self.names {
                let _ = map.insert(name, n.into_value());
            }
            Value::Object(map)
        };

        if leaves.is_empty() {
            container
        } else {
            leaves.push(container);
            Value::Array(leaves)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(content_type: Option<&str>, body: &str) -> Result<Value> {
        RawBody::new(content_type, body.as_bytes()).decode()
    }

    #[test]
    fn json_object() {
        let v = decode(Some("application/json"), r#"{"temp":72}"#).unwrap();
        assert_eq!(v, json!({"temp": 72}));
    }

    #[test]
    fn json_with_charset_parameter() {
        let v = decode(Some("application/json; charset=utf-8"), "[1,2]").unwrap();
        assert_eq!(v, json!([1, 2]));
    }

    #[test]
    fn vendor_json_suffix() {
        let v = decode(Some("application/vnd.notehub+json"), r#"{"a":true}"#).unwrap();
        assert_eq!(v["a"], true);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = decode(Some("application/json"), "{not json").unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
    }

    #[test]
    fn plain_text_becomes_string() {
        let v = decode(Some("text/plain"), "hello sensors").unwrap();
        assert_eq!(v, json!("hello sensors"));
    }

    #[test]
    fn invalid_utf8_text_is_malformed() {
        let err = RawBody::new(Some("text/plain"), &[0xff, 0xfe, 0xfd]).decode().unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
    }

    #[test]
    fn form_pairs_become_object() {
        let v = decode(
            Some("application/x-www-form-urlencoded"),
            "device=dev%3A123&temp=72.5",
        )
        .unwrap();
        assert_eq!(v, json!({"device": "dev:123", "temp": "72.5"}));
    }

    #[test]
    fn form_repeated_keys_collect() {
        let v = decode(Some("application/x-www-form-urlencoded"), "t=1&t=2&t=3").unwrap();
        assert_eq!(v, json!({"t": ["1", "2", "3"]}));
    }

    #[test]
    fn form_bracket_keys_nest() {
        let v = decode(
            Some("application/x-www-form-urlencoded"),
            "sensor[temp]=72&sensor[hum]=40&device=dev%3A1",
        )
        .unwrap();
        assert_eq!(
            v,
            json!({"sensor": {"temp": "72", "hum": "40"}, "device": "dev:1"})
        );
    }

    #[test]
    fn form_deep_nesting() {
        let v = decode(Some("application/x-www-form-urlencoded"), "a[b][c]=1&a[b][d]=2").unwrap();
        assert_eq!(v, json!({"a": {"b": {"c": "1", "d": "2"}}}));
    }

    #[test]
    fn form_push_and_indexed_arrays() {
        let form = Some("application/x-www-form-urlencoded");
        assert_eq!(decode(form, "t[]=1&t[]=2").unwrap(), json!({"t": ["1", "2"]}));
        assert_eq!(decode(form, "t[1]=b&t[0]=a").unwrap(), json!({"t": ["a", "b"]}));
        assert_eq!(
            decode(form, "r[0][id]=x&r[1][id]=y").unwrap(),
            json!({"r": [{"id": "x"}, {"id": "y"}]})
        );
    }

    #[test]
    fn form_large_index_becomes_key() {
        let v = decode(Some("application/x-www-form-urlencoded"), "t[100]=x").unwrap();
        assert_eq!(v, json!({"t": {"100": "x"}}));
    }

    #[test]
    fn form_mixed_index_and_name_is_object() {
        let v = decode(Some("application/x-www-form-urlencoded"), "t[0]=x&t[k]=y").unwrap();
        assert_eq!(v, json!({"t": {"0": "x", "k": "y"}}));
    }

    #[test]
    fn form_malformed_brackets_stay_literal() {
        let form = Some("application/x-www-form-urlencoded");
        assert_eq!(decode(form, "a[b=1").unwrap(), json!({"a[b": "1"}));
        assert_eq!(decode(form, "[x]=1").unwrap(), json!({"x": "1"}));
    }

    #[test]
    fn form_without_pairs_is_empty_object() {
        assert_eq!(decode(Some("application/x-www-form-urlencoded"), "&").unwrap(), json!({}));
    }

    #[test]
    fn form_depth_is_limited() {
        let v = decode(
            Some("application/x-www-form-urlencoded"),
            "a[1][2][3][4][5][6]=deep",
        )
        .unwrap();
        assert_eq!(v, json!({"a": [[[[[{"[6]": "deep"}]]]]]}));
    }

    #[test]
    fn json_top_level_scalar_is_malformed() {
        for body in ["42", r#""x""#, "true", "null", "   "] {
            let err = decode(Some("application/json"), body).unwrap_err();
            assert!(matches!(err, RelayError::MalformedPayload(_)), "{body}");
        }
    }

    #[test]
    fn json_leading_whitespace_allowed() {
        assert_eq!(decode(Some("application/json"), "\n  {\"a\":1}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn empty_body_is_empty_object() {
        assert_eq!(decode(Some("application/json"), "").unwrap(), json!({}));
        assert_eq!(decode(None, "").unwrap(), json!({}));
    }

    #[test]
    fn unknown_content_type_is_empty_object() {
        assert_eq!(decode(Some("application/octet-stream"), "abc").unwrap(), json!({}));
        assert_eq!(decode(None, r#"{"a":1}"#).unwrap(), json!({}));
    }

    #[test]
    fn content_type_is_case_insensitive() {
        let v = decode(Some("Application/JSON"), r#"{"x":1}"#).unwrap();
        assert_eq!(v["x"], 1);
    }
}
