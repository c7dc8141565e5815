//! Product side extraction.
//!
//! Catalog search results carry structured product data the caller renders as
//! cards. Extraction is best effort: anything unexpected is logged and yields
//! no products, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A caller-facing product card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Upper end of the price range, shown struck through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<String>,
    /// Availability of the first variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Which tools to mine and how many products to keep per result.
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    tools: Vec<String>,
    max_products: usize,
}

impl ProductExtractor {
    pub fn new(tools: Vec<String>, max_products: usize) -> Self {
        Self { tools, max_products }
    }

    pub fn handles(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t == tool_name)
    }

    /// Products from a raw tool payload, or none if `tool_name` is not a
    /// catalog tool or the payload does not parse.
    pub fn extract(&self, tool_name: &str, payload: &Value) -> Vec<ProductSummary> {
        if !self.handles(tool_name) || self.max_products == 0 {
            return Vec::new();
        }
        match parse_products(payload, self.max_products) {
            Ok(products) => products,
            Err(reason) => {
                warn!(tool = tool_name, reason = %reason, "Product extraction skipped");
                Vec::new()
            }
        }
    }
}

/// Find the object carrying `products`: the payload itself, a JSON string, or
/// the first text block whose text is such an object.
fn locate_products(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Object(map) => {
            if let Some(Value::Array(products)) = map.get("products") {
                return Some(products.clone());
            }
            map.get("content")
                .and_then(|c| c.as_array())
                .and_then(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                        .find_map(|text| {
                            serde_json::from_str::<Value>(text)
                                .ok()
                                .and_then(|v| locate_products(&v))
                        })
                })
        }
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| locate_products(&v)),
        _ => None,
    }
}

fn parse_products(payload: &Value, max: usize) -> Result<Vec<ProductSummary>, String> {
    let products = locate_products(payload).ok_or("payload has no products sequence")?;

    let mut out = Vec::new();
    for product in products.iter().take(max) {
        match summarize(product) {
            Some(summary) => out.push(summary),
            None => warn!("Skipping product entry that is not an object"),
        }
    }
    Ok(out)
}

fn str_field(product: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match product.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `"<CUR> <amount>"` with two decimals, `"$<amount>"` when no currency is known.
pub fn format_price(amount: f64, currency: Option<&str>) -> String {
    match currency.filter(|c| !c.is_empty()) {
        Some(cur) => format!("{cur} {amount:.2}"),
        None => format!("${amount:.2}"),
    }
}

fn summarize(product: &Value) -> Option<ProductSummary> {
    if !product.is_object() {
        return None;
    }

    let first_variant = product
        .get("variants")
        .and_then(|v| v.as_array())
        .and_then(|v| v.first());
    let variant_id = first_variant.and_then(|v| str_field(v, &["variant_id", "id"]));
    let id = str_field(product, &["product_id", "id"])
        .or(variant_id)
        .unwrap_or_default();

    let title = str_field(product, &["title", "name"]).unwrap_or_else(|| "Product".into());

    // (low, high, currency)
    let (low, high, currency) = match product.get("price_range") {
        Some(range) => (
            range.get("min").and_then(number),
            range.get("max").and_then(number),
            range.get("currency").and_then(|c| c.as_str()),
        ),
        None => (
            product.get("price").and_then(number),
            product.get("price_max").and_then(number),
            product.get("currency").and_then(|c| c.as_str()),
        ),
    };
    let price = low.map(|p| format_price(p, currency));
    let compare_at_price = match (low, high) {
        (Some(low), Some(high)) if high > low => Some(format_price(high, currency)),
        (None, Some(high)) => Some(format_price(high, currency)),
        _ => None,
    };
    let available = first_variant
        .and_then(|v| v.get("available"))
        .and_then(|a| a.as_bool());

    Some(ProductSummary {
        id,
        title,
        price,
        image: str_field(product, &["image_url", "image"]),
        description: str_field(product, &["description"]),
        link: str_field(product, &["url", "link"]),
        compare_at_price,
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ProductExtractor {
        ProductExtractor::new(vec!["search_shop_catalog".into()], 3)
    }

    fn shopify_payload(count: usize) -> Value {
        let products: Vec<Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "product_id": format!("gid://shopify/Product/{i}"),
                    "title": format!("Red Shoe {i}"),
                    "price_range": { "min": "49.5", "max": "59.00", "currency": "USD" },
                    "image_url": format!("https://cdn.example.com/{i}.jpg"),
                    "description": "Comfortable",
                    "url": format!("https://shop.example.com/products/{i}"),
                    "variants": [{ "variant_id": format!("gid://shopify/ProductVariant/{i}") }]
                })
            })
            .collect();
        serde_json::json!({
            "content": [{
                "type": "text",
                "text": serde_json::json!({ "products": products }).to_string()
            }]
        })
    }

    #[test]
    fn extracts_from_text_block_and_caps() {
        let products = extractor().extract("search_shop_catalog", &shopify_payload(5));
        assert_eq!(products.len(), 3);
        assert_eq!(products[0].id, "gid://shopify/Product/0");
        assert_eq!(products[0].title, "Red Shoe 0");
        assert_eq!(products[0].price.as_deref(), Some("USD 49.50"));
        assert_eq!(products[2].link.as_deref(), Some("https://shop.example.com/products/2"));
    }

    #[test]
    fn carries_compare_price_and_availability() {
        let products = extractor().extract("search_shop_catalog", &shopify_payload(1));
        assert_eq!(products[0].compare_at_price.as_deref(), Some("USD 59.00"));
        assert_eq!(products[0].available, None);

        let flat = serde_json::json!({ "products": [
            { "id": "p1", "title": "Sale Boot", "price": 40, "price_max": 55,
              "variants": [{ "id": "v1", "available": false }] },
            { "id": "p2", "title": "Flat Boot", "price": 40, "price_max": 40 }
        ]});
        let products = extractor().extract("search_shop_catalog", &flat);
        assert_eq!(products[0].price.as_deref(), Some("$40.00"));
        assert_eq!(products[0].compare_at_price.as_deref(), Some("$55.00"));
        assert_eq!(products[0].available, Some(false));
        assert_eq!(products[1].compare_at_price, None);
    }

    #[test]
    fn ignores_other_tools() {
        assert!(extractor().extract("get_cart", &shopify_payload(2)).is_empty());
    }

    #[test]
    fn unparseable_payload_is_swallowed() {
        let payload = serde_json::json!({ "content": [{ "type": "text", "text": "no products here" }] });
        assert!(extractor().extract("search_shop_catalog", &payload).is_empty());
        assert!(extractor()
            .extract("search_shop_catalog", &serde_json::json!({ "products": "nope" }))
            .is_empty());
    }

    #[test]
    fn falls_back_to_variant_id_and_defaults() {
        let payload = serde_json::json!({
            "products": [
                { "variants": [{ "id": "v-1" }], "price": 12 },
                42
            ]
        });
        let products = extractor().extract("search_shop_catalog", &payload);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "v-1");
        assert_eq!(products[0].title, "Product");
        assert_eq!(products[0].price.as_deref(), Some("$12.00"));
        assert!(products[0].image.is_none());
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(29.999, Some("EUR")), "EUR 30.00");
        assert_eq!(format_price(5.0, None), "$5.00");
        assert_eq!(format_price(5.0, Some("")), "$5.00");
    }
}
