//! GraphQL over HTTP POST.

use eddy_core::error::FetchError;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::retry::HttpFetcher;

/// Standard `{data, errors}` response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorEntry {
    #[serde(default)]
    pub message: String,
}

impl GraphQlResponse {
    /// The `data` object, or the joined error messages when `errors` is non-empty.
    pub fn into_data(self, url: &str) -> Result<Value, FetchError> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::GraphQl {
                url: url.to_string(),
                message,
            });
        }
        self.data.ok_or_else(|| FetchError::Decode {
            url: url.to_string(),
            reason: "response has neither data nor errors".to_string(),
        })
    }
}

impl HttpFetcher {
    /// Run a GraphQL query and return its `data` object.
    pub async fn graphql(&self, url: &str, query: &str, variables: Value) -> Result<Value, FetchError> {
        let body = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse = self.post_json(url, &body).await?;
        response.into_data(url)
    }
}

/// The array at `data.<field>`. A missing or null field reads as empty.
pub fn collection<'a>(data: &'a Value, field: &str, url: &str) -> Result<&'a [Value], FetchError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FetchError::Decode {
            url: url.to_string(),
            reason: format!("`{field}` is not a list: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(v: Value) -> GraphQlResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn data_is_returned() {
        let data = envelope(json!({"data": {"votes": []}})).into_data("u").unwrap();
        assert_eq!(data, json!({"votes": []}));
    }

    #[test]
    fn errors_take_precedence() {
        let err = envelope(json!({
            "data": null,
            "errors": [{"message": "bad field"}, {"message": "second"}]
        }))
        .into_data("u")
        .unwrap_err();
        assert_eq!(
            err,
            FetchError::GraphQl { url: "u".into(), message: "bad field; second".into() }
        );
    }

    #[test]
    fn empty_errors_list_is_ignored() {
        let data = envelope(json!({"data": {"x": 1}, "errors": []})).into_data("u").unwrap();
        assert_eq!(data["x"], 1);
    }

    #[test]
    fn missing_data_is_decode_error() {
        assert!(matches!(envelope(json!({})).into_data("u"), Err(FetchError::Decode { .. })));
    }

    #[test]
    fn collection_lookup() {
        let data = json!({"votes": [1, 2], "none": null, "bad": 3});
        assert_eq!(collection(&data, "votes", "u").unwrap().len(), 2);
        assert!(collection(&data, "none", "u").unwrap().is_empty());
        assert!(collection(&data, "missing", "u").unwrap().is_empty());
        assert!(collection(&data, "bad", "u").is_err());
    }
}
