//! Decoding of semi-structured cells: the `promotionitems` / `groups`
//! documents embedded in single CSV fields, and the `clubs` document that
//! drives the club-only flag.
//!
//! Chains emit these cells either as JSON or as Python-literal mappings
//! (single quotes, `True`/`False`/`None`, occasionally unquoted barewords).
//! Parsing is two-stage: strict JSON first, then a permissive normalization
//! pass. A cell that survives neither is reported as `Undecodable` so skip
//! counters come from an explicit outcome rather than swallowed errors.

use serde_json::Value;

use super::format::PromoFormat;

/// Placeholder some chains emit for an empty item slot.
const NO_BODY: &str = "NO_BODY";

/// Accepted spellings of the item-code field across format generations.
const CODE_KEYS: &[&str] = &["itemcode", "ItemCode", "barcode"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDecode {
    /// Ordered candidate barcodes; may be empty, duplicates permitted
    /// (deduplicated downstream).
    Decoded(Vec<String>),
    /// Neither parse stage produced a document.
    Undecodable,
}

/// Decode one cell into candidate barcodes per the detected dialect.
pub fn decode_items(format: PromoFormat, cell: &str) -> ItemDecode {
    let cell = cell.trim();
    match format {
        PromoFormat::ItemsAsRows => {
            // The row's own item-code column is the single-element result.
            if cell.is_empty() {
                ItemDecode::Decoded(Vec::new())
            } else {
                ItemDecode::Decoded(vec![cell.to_string()])
            }
        }
        PromoFormat::ItemsAsDocument => {
            if cell.is_empty() || cell == "{}" {
                return ItemDecode::Decoded(Vec::new());
            }
            match parse_document(cell) {
                Some(doc) => ItemDecode::Decoded(codes_from_item_list(doc.get("item"))),
                None => ItemDecode::Undecodable,
            }
        }
        PromoFormat::ItemsAsGroups => {
            if cell.is_empty() || cell == "{}" || cell == "[]" {
                return ItemDecode::Decoded(Vec::new());
            }
            match parse_document(cell) {
                Some(doc) => ItemDecode::Decoded(codes_from_groups(&doc)),
                None => ItemDecode::Undecodable,
            }
        }
    }
}

/// True when the `clubs` cell marks the promotion as members-only
/// (a non-zero `clubid`). Absent or undecodable cells default to false.
pub fn club_only(cell: &str) -> bool {
    let cell = cell.trim();
    if cell.is_empty() {
        return false;
    }
    let Some(doc) = parse_document(cell) else {
        return false;
    };
    for key in ["clubid", "ClubId", "ClubID"] {
        if let Some(v) = doc.get(key) {
            let id = scalar_to_string(v);
            return !id.is_empty() && id != "0";
        }
    }
    false
}

/// Two-stage parse: strict JSON, then the Python-literal normalization.
fn parse_document(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }
    serde_json::from_str(&pythonish_to_json(raw)).ok()
}

/// Extract item codes from an `item` value that is either a list of objects
/// or a single object (promoted to a one-element list).
fn codes_from_item_list(items: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    let items = match items {
        Some(Value::Array(a)) => a.as_slice(),
        Some(obj @ Value::Object(_)) => std::slice::from_ref(obj),
        _ => return out,
    };
    for item in items {
        if let Some(code) = item_code(item) {
            out.push(code);
        }
    }
    out
}

/// Groups dialect: a list under `groups` (or `group`), each group carrying
/// a nested items document under a `promotionitems`-spelled key. The nested
/// document is frequently re-encoded as a string and must go through the
/// same two-stage parse.
fn codes_from_groups(doc: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let groups = match doc.get("groups").or_else(|| doc.get("group")) {
        Some(Value::Array(a)) => a.as_slice(),
        Some(obj @ Value::Object(_)) => std::slice::from_ref(obj),
        _ => return out,
    };
    for group in groups {
        let Some(obj) = group.as_object() else {
            continue;
        };
        let nested = obj
            .iter()
            .find(|(k, _)| normalize_key(k) == "promotionitems")
            .map(|(_, v)| v);
        let Some(nested) = nested else { continue };
        // String-within-string: decode the re-encoded sub-document first.
        let parsed;
        let nested = match nested {
            Value::String(s) => match parse_document(s) {
                Some(v) => {
                    parsed = v;
                    &parsed
                }
                None => continue,
            },
            other => other,
        };
        out.extend(codes_from_item_list(nested.get("item").or(Some(nested))));
    }
    out
}

fn item_code(item: &Value) -> Option<String> {
    let obj = item.as_object()?;
    for key in CODE_KEYS {
        if let Some(v) = obj.get(*key) {
            let code = scalar_to_string(v);
            if !code.is_empty() && code != NO_BODY {
                return Some(code);
            }
        }
    }
    None
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn normalize_key(k: &str) -> String {
    k.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Rewrite a Python-literal document into JSON: single-quoted strings become
/// double-quoted, `True`/`False`/`None` become JSON literals, and stray
/// barewords are quoted. Numbers pass through untouched.
fn pythonish_to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                while let Some(&n) = chars.peek() {
                    chars.next();
                    if n == '\\' {
                        if let Some(&esc) = chars.peek() {
                            chars.next();
                            // \' has no meaning in JSON; every other escape
                            // pair passes through as-is.
                            if esc == '\'' {
                                out.push('\'');
                            } else {
                                out.push('\\');
                                out.push(esc);
                            }
                        }
                    } else if n == quote {
                        break;
                    } else if n == '"' {
                        // Bare double quote inside a single-quoted string.
                        out.push_str("\\\"");
                    } else {
                        out.push(n);
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '+' => {
                let mut word = String::new();
                word.push(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' || n == '-' || n == '.' || n == '+' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    "true" | "false" | "null" => out.push_str(&word),
                    _ if looks_numeric(&word) => out.push_str(&word),
                    _ => {
                        out.push('"');
                        out.push_str(&word);
                        out.push('"');
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn looks_numeric(word: &str) -> bool {
    word.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(codes: &[&str]) -> ItemDecode {
        ItemDecode::Decoded(codes.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn decodes_json_item_list() {
        let cell = r#"{"item": [{"itemcode": "7290000000001"}, {"itemcode": "7290000000002"}]}"#;
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, cell),
            decoded(&["7290000000001", "7290000000002"])
        );
    }

    #[test]
    fn promotes_single_object_to_list() {
        let cell = r#"{"item": {"itemcode": "7290000000003"}}"#;
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, cell),
            decoded(&["7290000000003"])
        );
    }

    #[test]
    fn decodes_python_literal_document() {
        let cell = "{'item': [{'itemcode': '7290000000004'}, {'ItemCode': '7290000000005'}]}";
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, cell),
            decoded(&["7290000000004", "7290000000005"])
        );
    }

    #[test]
    fn tolerates_unquoted_barewords_and_python_literals() {
        let cell = "{'item': [{'itemcode': 7290000000006, 'instore': True, 'note': None}]}";
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, cell),
            decoded(&["7290000000006"])
        );
    }

    #[test]
    fn garbage_is_undecodable_not_a_panic() {
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, "item: [[[oops"),
            ItemDecode::Undecodable
        );
    }

    #[test]
    fn empty_and_empty_document_cells_decode_to_nothing() {
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, ""),
            decoded(&[])
        );
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, "{}"),
            decoded(&[])
        );
    }

    #[test]
    fn rows_format_is_the_cell_itself() {
        assert_eq!(
            decode_items(PromoFormat::ItemsAsRows, " 7290011111111 "),
            decoded(&["7290011111111"])
        );
        assert_eq!(decode_items(PromoFormat::ItemsAsRows, ""), decoded(&[]));
    }

    #[test]
    fn decodes_groups_with_string_reencoded_subdocument() {
        let cell = r#"{"groups": [{"promotionitems": "{\"item\": [{\"itemcode\": \"7290000000007\"}]}"}, {"promotionitems": {"item": {"itemcode": "7290000000008"}}}]}"#;
        assert_eq!(
            decode_items(PromoFormat::ItemsAsGroups, cell),
            decoded(&["7290000000007", "7290000000008"])
        );
    }

    #[test]
    fn groups_accepts_spaced_and_cased_key_spellings() {
        let cell = r#"{"group": [{"Promotion Items": {"item": [{"barcode": "7290000000009"}]}}]}"#;
        assert_eq!(
            decode_items(PromoFormat::ItemsAsGroups, cell),
            decoded(&["7290000000009"])
        );
    }

    #[test]
    fn no_body_sentinel_is_filtered() {
        let cell = r#"{"item": [{"itemcode": "NO_BODY"}, {"itemcode": "7290000000010"}]}"#;
        assert_eq!(
            decode_items(PromoFormat::ItemsAsDocument, cell),
            decoded(&["7290000000010"])
        );
    }

    #[test]
    fn club_only_from_nonzero_clubid() {
        assert!(club_only("{'clubid': '1'}"));
        assert!(club_only(r#"{"clubid": 2}"#));
        assert!(!club_only("{'clubid': '0'}"));
        assert!(!club_only(""));
        assert!(!club_only("not a document"));
    }
}
