//! Product extraction: schema-guided structured extraction of product pages.
//!
//! The extraction backend is a capability: it takes raw content plus the
//! per-site schema and returns a partial field mapping. Fields beyond the
//! schema are preserved, not discarded, which is why `ProductRecord` is an
//! open record with a flattened extras map.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProcessError;

/// One named field of the per-site product schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    /// Required fields are expected in every extracted product
    #[serde(default)]
    pub required: bool,
}

/// Per-site product extraction schema; fixed for the whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSchema {
    pub fields: Vec<FieldDef>,
}

impl ProductSchema {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

/// Capability for schema-guided structured extraction
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a partial field mapping from raw page content. Fields are
    /// optional and non-exhaustive; anything beyond the schema is kept.
    async fn extract(
        &self,
        raw_html: &str,
        schema: &ProductSchema,
    ) -> Result<BTreeMap<String, Value>, ProcessError>;
}

/// Structured product output: a fixed set of named optional fields plus
/// whatever else the extraction backend returned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProductRecord {
    /// Fold an extracted field mapping into the open record. Known scalar
    /// fields land in the named slots; everything else stays in `extra`.
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        let mut record = ProductRecord::default();
        for (name, value) in fields {
            let scalar = scalar_to_string(&value);
            match (name.as_str(), scalar) {
                ("title", Some(s)) => record.title = Some(s),
                ("price", Some(s)) => record.price = Some(s),
                ("description", Some(s)) => record.description = Some(s),
                ("sku", Some(s)) => record.sku = Some(s),
                ("brand", Some(s)) => record.brand = Some(s),
                _ => {
                    record.extra.insert(name, value);
                }
            }
        }
        record
    }

    /// Deterministic text rendering used as indexing input
    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        for (name, value) in [
            ("title", &self.title),
            ("brand", &self.brand),
            ("price", &self.price),
            ("sku", &self.sku),
            ("description", &self.description),
        ] {
            if let Some(value) = value {
                lines.push(format!("{}: {}", name, value));
            }
        }
        for (name, value) in &self.extra {
            let rendered = scalar_to_string(value).unwrap_or_else(|| value.to_string());
            lines.push(format!("{}: {}", name, rendered));
        }
        lines.join("\n")
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deterministic extractor reading standard commerce meta tags.
///
/// The default backend for runs without an external extraction service; an
/// LLM-backed implementation plugs in through the same trait.
#[derive(Debug, Default)]
pub struct MetaTagExtractor;

impl MetaTagExtractor {
    fn meta_content(doc: &Html, selector: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        doc.select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl Extractor for MetaTagExtractor {
    async fn extract(
        &self,
        raw_html: &str,
        _schema: &ProductSchema,
    ) -> Result<BTreeMap<String, Value>, ProcessError> {
        let doc = Html::parse_document(raw_html);
        let mut fields = BTreeMap::new();

        let title = Self::meta_content(&doc, r#"meta[property="og:title"]"#).or_else(|| {
            let selector = Selector::parse("title").ok()?;
            let text: String = doc.select(&selector).next()?.text().collect();
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        });
        if let Some(title) = title {
            fields.insert("title".to_string(), Value::String(title));
        }

        if let Some(price) = Self::meta_content(&doc, r#"meta[property="og:price:amount"]"#)
            .or_else(|| Self::meta_content(&doc, r#"meta[property="product:price:amount"]"#))
        {
            fields.insert("price".to_string(), Value::String(price));
        }

        if let Some(description) = Self::meta_content(&doc, r#"meta[property="og:description"]"#)
            .or_else(|| Self::meta_content(&doc, r#"meta[name="description"]"#))
        {
            fields.insert("description".to_string(), Value::String(description));
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_fields_splits_named_and_extra() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), json!("Sugoi Chair"));
        fields.insert("price".to_string(), json!(129.99));
        fields.insert("weight_capacity".to_string(), json!("300 lbs"));
        fields.insert("colors".to_string(), json!(["tan", "olive"]));

        let record = ProductRecord::from_fields(fields);
        assert_eq!(record.title.as_deref(), Some("Sugoi Chair"));
        assert_eq!(record.price.as_deref(), Some("129.99"));
        assert_eq!(record.extra["weight_capacity"], json!("300 lbs"));
        assert_eq!(record.extra["colors"], json!(["tan", "olive"]));
    }

    #[test]
    fn test_extra_fields_survive_serialization() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), json!("Chair"));
        fields.insert("material".to_string(), json!("aluminum"));
        let record = ProductRecord::from_fields(fields);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Chair");
        assert_eq!(json["material"], "aluminum");

        let back: ProductRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra["material"], json!("aluminum"));
    }

    #[test]
    fn test_render_text_is_deterministic() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), json!("Chair"));
        fields.insert("zeta".to_string(), json!("z"));
        fields.insert("alpha".to_string(), json!("a"));
        let record = ProductRecord::from_fields(fields.clone());

        let text = record.render_text();
        assert_eq!(text, "title: Chair\nalpha: a\nzeta: z");
        assert_eq!(ProductRecord::from_fields(fields).render_text(), text);
    }

    #[tokio::test]
    async fn test_meta_tag_extractor() {
        let html = r#"<html><head>
            <title>Fallback Title</title>
            <meta property="og:title" content="Sugoi Chair" />
            <meta property="og:price:amount" content="129.99" />
            <meta name="description" content="A very comfortable chair." />
        </head><body></body></html>"#;

        let fields = MetaTagExtractor
            .extract(html, &ProductSchema::default())
            .await
            .unwrap();
        assert_eq!(fields["title"], "Sugoi Chair");
        assert_eq!(fields["price"], "129.99");
        assert_eq!(fields["description"], "A very comfortable chair.");
    }
}
