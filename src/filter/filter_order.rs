use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};
use crate::resources::ResourceDef;

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `"created_at desc, name"`, `["created_at desc"]` or
    /// `{"created_at": "desc"}`. Every column must belong to the resource.
    pub fn validate_and_parse(resource: &ResourceDef, order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Self::parse_order_string(resource, s),
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(resource, s)?),
                        _ => return Err(FilterError::InvalidOperatorData("order entries must be strings".to_string())),
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| Self::info(resource, k, v.as_str().unwrap_or("asc")))
                .collect(),
            _ => Err(FilterError::InvalidOperatorData("order must be a string, array or object".to_string())),
        }
    }

    pub fn parse_order_string(resource: &ResourceDef, s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let mut it = part.split_whitespace();
            if let Some(col) = it.next() {
                out.push(Self::info(resource, col, it.next().unwrap_or("asc"))?);
            }
        }
        Ok(out)
    }

    fn info(resource: &ResourceDef, column: &str, direction: &str) -> Result<FilterOrderInfo, FilterError> {
        let column = resource
            .column(column)
            .ok_or_else(|| FilterError::InvalidColumn(column.to_string()))?;
        let sort = if direction.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        Ok(FilterOrderInfo { column: column.name, sort })
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ASSETS;
    use serde_json::json;

    #[test]
    fn parses_each_accepted_shape() {
        let from_string = FilterOrder::validate_and_parse(&ASSETS, &json!("received_date desc, asset_tag")).unwrap();
        assert_eq!(FilterOrder::generate(&from_string), "ORDER BY \"received_date\" DESC, \"asset_tag\" ASC");

        let from_object = FilterOrder::validate_and_parse(&ASSETS, &json!({"created_at": "DESC"})).unwrap();
        assert_eq!(FilterOrder::generate(&from_object), "ORDER BY \"created_at\" DESC");
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = FilterOrder::validate_and_parse(&ASSETS, &json!("1; DROP TABLE assets")).unwrap_err();
        assert!(matches!(err, FilterError::InvalidColumn(_)));
    }
}
