use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown";

/// One NDJSON line of the catalog export. Unknown fields are ignored so the
/// feed can grow columns without breaking the importer; a present but
/// wrong-typed field fails the whole line.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    #[serde(default, deserialize_with = "barcode_from_value")]
    pub code: Option<i64>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub labels_tags: Vec<String>,

    #[serde(default)]
    pub categories_tags: Vec<String>,

    #[serde(default)]
    pub allergens_tags: Vec<String>,

    #[serde(default)]
    pub countries_tags: Vec<String>,

    #[serde(default)]
    pub additives_tags: Vec<String>,

    #[serde(default)]
    pub nutriments: Option<NutrientFacts>,
}

impl ProductRecord {
    pub fn display_name(&self) -> String {
        match self.product_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => UNKNOWN_PRODUCT_NAME.to_string(),
        }
    }

    pub fn raw_tags(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::Tag => &self.labels_tags,
            Dimension::Category => &self.categories_tags,
            Dimension::Allergen => &self.allergens_tags,
            Dimension::Country => &self.countries_tags,
            Dimension::Additive => &self.additives_tags,
        }
    }
}

// The feed serializes barcodes either as a JSON number or as a string of
// digits depending on export vintage.
fn barcode_from_value<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_i64()),
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| DeError::custom(format!("barcode is not numeric: {trimmed}")))
        }
        Some(other) => Err(DeError::custom(format!(
            "barcode has unsupported type: {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NutrientFacts {
    #[serde(default)]
    pub energy: Option<f64>,

    #[serde(default)]
    pub energy_100g: Option<f64>,

    #[serde(default)]
    pub carbohydrates: Option<f64>,

    #[serde(default)]
    pub carbohydrates_100g: Option<f64>,

    #[serde(default)]
    pub sugars: Option<f64>,

    #[serde(default)]
    pub sugars_100g: Option<f64>,

    #[serde(default)]
    pub fat: Option<f64>,

    #[serde(default)]
    pub fat_100g: Option<f64>,

    #[serde(default, rename = "saturated-fat")]
    pub saturated_fat: Option<f64>,

    #[serde(default, rename = "saturated-fat_100g")]
    pub saturated_fat_100g: Option<f64>,

    #[serde(default)]
    pub proteins: Option<f64>,

    #[serde(default)]
    pub proteins_100g: Option<f64>,

    #[serde(default)]
    pub salt: Option<f64>,

    #[serde(default)]
    pub salt_100g: Option<f64>,

    #[serde(default)]
    pub sodium: Option<f64>,

    #[serde(default)]
    pub sodium_100g: Option<f64>,

    #[serde(default)]
    pub fiber: Option<f64>,

    #[serde(default)]
    pub fiber_100g: Option<f64>,
}

/// The five dimension kinds, each mapped to its table, junction table and
/// junction column. A single resolver works across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Tag,
    Category,
    Allergen,
    Country,
    Additive,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Tag,
        Dimension::Category,
        Dimension::Allergen,
        Dimension::Country,
        Dimension::Additive,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Category => "category",
            Self::Allergen => "allergen",
            Self::Country => "country",
            Self::Additive => "additive",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            Self::Tag => "product_tag",
            Self::Category => "product_category",
            Self::Allergen => "product_allergen",
            Self::Country => "product_country",
            Self::Additive => "product_additive",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            Self::Tag => "tag_id",
            Self::Category => "category_id",
            Self::Allergen => "allergen_id",
            Self::Country => "country_id",
            Self::Additive => "additive_id",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub bucket: String,
    pub key: String,
    pub line_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProduceCounts {
    pub lines_read: usize,
    pub lines_accepted: usize,
    pub lines_filtered: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProduceRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub source_url: String,
    pub bucket: String,
    pub chunk_capacity: usize,
    pub watermark: Option<String>,
    pub next_watermark: String,
    pub counts: ProduceCounts,
    pub chunks: Vec<ChunkDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeReport {
    pub bucket: String,
    pub key: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub lines_read: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batches_committed: usize,
    pub message: String,
}
