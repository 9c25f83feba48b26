//! MCP tool parameter types.
//!
//! Defines the input schemas for the tool catalogue using `schemars` for
//! automatic JSON Schema generation required by the MCP protocol. Numeric
//! fields accept numbers or numeric strings (clients are loose about
//! quoting), normalized by the lenient deserializers below.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Parameters for the `list_table_schemas` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSchemasParams {
    /// Schema (namespace) whose tables and columns to list.
    pub schema: String,
}

/// Parameters for the `run_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunQueryParams {
    /// Read-only SQL statement to execute.
    pub sql: String,
}

/// Parameters for the `apply_update` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApplyUpdateParams {
    /// Mutating SQL statement to execute.
    pub sql: String,
}

/// Parameters for the `similar_products` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SimilarProductsParams {
    /// Natural-language description of the products to find.
    pub search_text: String,

    /// Minimum stock level filter (0 = no filter).
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    #[schemars(with = "Option<i64>")]
    pub min_stock: Option<i64>,

    /// Maximum number of results to return.
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    #[schemars(with = "Option<u32>")]
    pub top_n: Option<u32>,

    /// Similarity threshold in [0, 1]; higher is stricter.
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    #[schemars(with = "Option<f64>")]
    pub min_similarity: Option<f64>,
}

/// Accepts a JSON number or a numeric string.
fn lenient_number<'de, D>(deserializer: D, what: &'static str) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("{what} out of range"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("expected {what}, got '{s}'"))),
        other => Err(D::Error::custom(format!("expected {what}, got {other}"))),
    }
}

/// Lenient `Option<i64>`: number, numeric string, or absent.
fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let n = lenient_number(deserializer, "an integer")?;
    if n.fract() != 0.0 {
        return Err(D::Error::custom(format!("expected an integer, got {n}")));
    }
    #[allow(clippy::cast_possible_truncation)]
    let value = n as i64;
    Ok(Some(value))
}

/// Lenient `Option<u32>`: non-negative number, numeric string, or absent.
fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let n = lenient_number(deserializer, "a non-negative integer")?;
    if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
        return Err(D::Error::custom(format!(
            "expected a non-negative integer, got {n}"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = n as u32;
    Ok(Some(value))
}

/// Lenient `Option<f64>`: number, numeric string, or absent.
fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer, "a number").map(Some)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_similar_products_accepts_numbers() {
        let params: SimilarProductsParams = serde_json::from_value(json!({
            "search_text": "road bike",
            "min_stock": 100,
            "top_n": 5,
            "min_similarity": 0.6
        }))
        .unwrap_or_else(|e| panic!("deserialize failed: {e}"));
        assert_eq!(params.min_stock, Some(100));
        assert_eq!(params.top_n, Some(5));
        assert_eq!(params.min_similarity, Some(0.6));
    }

    #[test]
    fn test_similar_products_coerces_numeric_strings() {
        let params: SimilarProductsParams = serde_json::from_value(json!({
            "search_text": "water bottle",
            "min_stock": "500",
            "top_n": "10",
            "min_similarity": "0.5"
        }))
        .unwrap_or_else(|e| panic!("deserialize failed: {e}"));
        assert_eq!(params.min_stock, Some(500));
        assert_eq!(params.top_n, Some(10));
        assert_eq!(params.min_similarity, Some(0.5));
    }

    #[test]
    fn test_similar_products_defaults_absent_fields() {
        let params: SimilarProductsParams =
            serde_json::from_value(json!({ "search_text": "gloves" }))
                .unwrap_or_else(|e| panic!("deserialize failed: {e}"));
        assert_eq!(params.min_stock, None);
        assert_eq!(params.top_n, None);
        assert_eq!(params.min_similarity, None);
    }

    #[test]
    fn test_rejects_non_numeric_string() {
        let result: Result<SimilarProductsParams, _> = serde_json::from_value(json!({
            "search_text": "gloves",
            "top_n": "lots"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_fractional_integer() {
        let result: Result<SimilarProductsParams, _> = serde_json::from_value(json!({
            "search_text": "gloves",
            "min_stock": 1.5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let result: Result<RunQueryParams, _> = serde_json::from_value(json!({}));
        let err = match result {
            Ok(_) => panic!("expected missing-field error"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("sql"));
    }
}
