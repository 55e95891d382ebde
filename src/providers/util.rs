use crate::core::CurrencyPair;
use crate::core::config::{MAX_RATE_PATH_INDEX, RatePathSegment};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Substitutes `{source}` and `{target}` in `template` with the pair's codes.
pub fn render_template(template: &str, pair: &CurrencyPair) -> String {
    template
        .replace("{source}", pair.source())
        .replace("{target}", pair.target())
}

/// Renders every request parameter template for `pair`.
pub fn render_params(
    params_template: &BTreeMap<String, String>,
    pair: &CurrencyPair,
) -> BTreeMap<String, String> {
    params_template
        .iter()
        .map(|(name, template)| (name.clone(), render_template(template, pair)))
        .collect()
}

/// Builds a response document that holds `rate` at `path`, shaped the way the
/// provider's API would answer. Returns `None` when an index in `path` is past
/// [`MAX_RATE_PATH_INDEX`].
pub fn simulated_response(
    path: &[RatePathSegment],
    pair: &CurrencyPair,
    rate: f64,
) -> Option<Value> {
    path.iter()
        .rev()
        .try_fold(Value::from(rate), |inner, segment| match segment {
            RatePathSegment::Key(key) => {
                let mut object = Map::new();
                object.insert(render_template(key, pair), inner);
                Some(Value::Object(object))
            }
            RatePathSegment::Index(index) if *index <= MAX_RATE_PATH_INDEX => {
                let mut items = vec![Value::Null; *index];
                items.push(inner);
                Some(Value::Array(items))
            }
            RatePathSegment::Index(_) => None,
        })
}

/// Walks `path` through `response` and reads the rate at the end of it.
pub fn extract_rate(response: &Value, path: &[RatePathSegment], pair: &CurrencyPair) -> Option<f64> {
    path.iter()
        .try_fold(response, |node, segment| match segment {
            RatePathSegment::Key(key) => node.get(render_template(key, pair)),
            RatePathSegment::Index(index) => node.get(*index),
        })?
        .as_f64()
}
