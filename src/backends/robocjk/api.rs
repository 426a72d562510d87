use crate::StoreError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

/// The three kinds of glyph a deep-component database stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlyphCategory {
    /// Basic strokes and shapes
    #[serde(rename = "AE")]
    AtomicElement,
    /// Reusable assemblies of atomic elements
    #[serde(rename = "DC")]
    DeepComponent,
    /// Encoded glyphs built from deep components
    #[serde(rename = "CG")]
    CharacterGlyph,
}

impl GlyphCategory {
    /// Every category, in the order glyph lists are fetched
    pub const ALL: [GlyphCategory; 3] = [
        GlyphCategory::AtomicElement,
        GlyphCategory::DeepComponent,
        GlyphCategory::CharacterGlyph,
    ];

    /// The two-letter code the database uses
    pub fn type_code(self) -> &'static str {
        match self {
            GlyphCategory::AtomicElement => "AE",
            GlyphCategory::DeepComponent => "DC",
            GlyphCategory::CharacterGlyph => "CG",
        }
    }

    /// The API view listing glyphs of this category
    pub fn list_view(self) -> &'static str {
        match self {
            GlyphCategory::AtomicElement => "atomic_element_list",
            GlyphCategory::DeepComponent => "deep_component_list",
            GlyphCategory::CharacterGlyph => "character_glyph_list",
        }
    }

    /// The API view fetching one glyph of this category
    pub fn get_view(self) -> &'static str {
        match self {
            GlyphCategory::AtomicElement => "atomic_element_get",
            GlyphCategory::DeepComponent => "deep_component_get",
            GlyphCategory::CharacterGlyph => "character_glyph_get",
        }
    }
}

/// Access to a deep-component database's HTTP API
///
/// Implementations own the transport: connection handling, the auth token
/// and the single retry after a token refresh. Any non-success response
/// should come back as [`StoreError::RemoteTransport`].
#[allow(async_fn_in_trait)]
pub trait RoboCjkApi {
    /// Call an API view; the response is the full `{"data": ...}` envelope
    async fn call(&self, view: &str, params: Value) -> Result<Value, StoreError>;
}

/// A glyph as it appears in a category listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlyphInfo {
    /// Database identifier, unique within a category
    pub id: i64,
    /// Glyph name
    pub name: String,
    /// Codepoint in hex, if the glyph is encoded
    #[serde(default)]
    pub unicode_hex: Option<String>,
}

impl GlyphInfo {
    pub(crate) fn codepoints(&self) -> Result<Vec<u32>, StoreError> {
        match self.unicode_hex.as_deref().filter(|s| !s.is_empty()) {
            Some(hex) => u32::from_str_radix(hex, 16).map(|u| vec![u]).map_err(|e| {
                StoreError::RemoteTransport(format!(
                    "bad unicode_hex {hex:?} for {}: {e}",
                    self.name
                ))
            }),
            None => Ok(vec![]),
        }
    }
}

/// One extra outline layer of a glyph
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerRecord {
    /// Layer name
    pub group_name: String,
    /// GLIF data
    pub data: String,
}

/// A glyph as returned by a `*_get` view
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlyphRecord {
    /// Database identifier
    pub id: i64,
    /// Glyph name
    pub name: String,
    /// Category, present on related glyphs
    #[serde(default)]
    pub type_code: Option<GlyphCategory>,
    /// GLIF data of the default layer
    pub data: String,
    /// Extra layers
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
    /// Glyphs this one is built from, each with its own `made_of`
    #[serde(default)]
    pub made_of: Vec<GlyphRecord>,
}

fn unwrap_envelope<T: DeserializeOwned>(view: &str, mut response: Value) -> Result<T, StoreError> {
    let data = response
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| StoreError::RemoteTransport(format!("{view} returned no data")))?;
    serde_json::from_value(data)
        .map_err(|e| StoreError::RemoteTransport(format!("{view} returned unexpected data: {e}")))
}

pub(crate) async fn list_glyphs(
    api: &impl RoboCjkApi,
    font_uid: &str,
    category: GlyphCategory,
) -> Result<Vec<GlyphInfo>, StoreError> {
    let view = category.list_view();
    let response = api.call(view, json!({ "font_uid": font_uid })).await?;
    unwrap_envelope(view, response)
}

pub(crate) async fn get_glyph(
    api: &impl RoboCjkApi,
    font_uid: &str,
    category: GlyphCategory,
    id: i64,
) -> Result<GlyphRecord, StoreError> {
    let view = category.get_view();
    let params = json!({
        "font_uid": font_uid,
        "id": id,
        "return_layers": true,
        "return_related": true,
    });
    let response = api.call(view, params).await?;
    unwrap_envelope(view, response)
}

pub(crate) async fn get_font(api: &impl RoboCjkApi, font_uid: &str) -> Result<Value, StoreError> {
    let response = api.call("font_get", json!({ "font_uid": font_uid })).await?;
    unwrap_envelope("font_get", response)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(GlyphCategory::AtomicElement, "AE", "atomic_element_list", "atomic_element_get")]
    #[case(GlyphCategory::DeepComponent, "DC", "deep_component_list", "deep_component_get")]
    #[case(GlyphCategory::CharacterGlyph, "CG", "character_glyph_list", "character_glyph_get")]
    fn test_dispatch_table(
        #[case] category: GlyphCategory,
        #[case] code: &str,
        #[case] list: &str,
        #[case] get: &str,
    ) {
        assert_eq!(category.type_code(), code);
        assert_eq!(category.list_view(), list);
        assert_eq!(category.get_view(), get);
        assert_eq!(
            serde_json::from_value::<GlyphCategory>(json!(code)).unwrap(),
            category
        );
    }

    #[test]
    fn test_codepoints() {
        let info: GlyphInfo =
            serde_json::from_value(json!({"id": 1, "name": "uni4E00", "unicode_hex": "4e00"}))
                .unwrap();
        assert_eq!(info.codepoints().unwrap(), vec![0x4E00]);
        let info: GlyphInfo =
            serde_json::from_value(json!({"id": 2, "name": "DC_x", "unicode_hex": ""})).unwrap();
        assert_eq!(info.codepoints().unwrap(), Vec::<u32>::new());
        let info: GlyphInfo =
            serde_json::from_value(json!({"id": 3, "name": "bad", "unicode_hex": "zz"})).unwrap();
        assert!(info.codepoints().is_err());
    }

    #[test]
    fn test_envelope() {
        let list: Vec<GlyphInfo> =
            unwrap_envelope("x", json!({"data": [{"id": 1, "name": "a"}]})).unwrap();
        assert_eq!(list.len(), 1);
        assert!(matches!(
            unwrap_envelope::<Vec<GlyphInfo>>("x", json!({"error": "nope"})),
            Err(StoreError::RemoteTransport(_))
        ));
    }
}
