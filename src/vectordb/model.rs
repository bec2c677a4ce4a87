//! Wire shapes for the vector index contract.

use crate::model::Metadata;

/// Column-oriented nearest-neighbor response.
///
/// `distances` are cosine distances in `[0, 2]`; parallel vectors share
/// one index per hit.
#[derive(Debug, Clone, Default)]
pub struct VectorQueryResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

impl VectorQueryResponse {
    /// Number of hits.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the response carries no hits.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Converts a qdrant payload value into its JSON equivalent.
pub(crate) fn payload_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(payload_value_to_json).collect(),
        ),
        Some(Kind::StructValue(fields)) => serde_json::Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(k, v)| (k, payload_value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::Value;
    use qdrant_client::qdrant::value::Kind;

    #[test]
    fn test_payload_scalar_conversion() {
        let int = Value {
            kind: Some(Kind::IntegerValue(25)),
        };
        assert_eq!(payload_value_to_json(int), serde_json::json!(25));

        let text = Value {
            kind: Some(Kind::StringValue("chapitre".to_string())),
        };
        assert_eq!(payload_value_to_json(text), serde_json::json!("chapitre"));

        let null = Value { kind: None };
        assert_eq!(payload_value_to_json(null), serde_json::Value::Null);
    }

    #[test]
    fn test_response_len() {
        let response = VectorQueryResponse {
            ids: vec!["a".to_string()],
            documents: vec!["texte".to_string()],
            metadatas: vec![Metadata::new()],
            distances: vec![0.4],
        };
        assert_eq!(response.len(), 1);
        assert!(!response.is_empty());
    }
}
