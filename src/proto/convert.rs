// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! JSON surface for the HTTP and WebSocket gateways.
//!
//! The gRPC wire types carry `google.protobuf.Struct` parameters and tags;
//! these DTOs map them onto plain JSON objects. Binary `content` stays a
//! gRPC-only field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proto::dataplane_v1::status::StatusCode;
use crate::proto::dataplane_v1::{DataRequest, DataResponse, Document, Status};

pub fn json_to_struct(map: serde_json::Map<String, Value>) -> prost_types::Struct {
    prost_types::Struct {
        fields: map
            .into_iter()
            .map(|(k, v)| (k, json_to_prost_value(v)))
            .collect(),
    }
}

pub fn struct_to_json(s: prost_types::Struct) -> serde_json::Map<String, Value> {
    s.fields
        .into_iter()
        .map(|(k, v)| (k, prost_value_to_json(v)))
        .collect()
}

pub fn json_to_prost_value(value: Value) -> prost_types::Value {
    use prost_types::value::Kind;
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(prost_types::ListValue {
            values: items.into_iter().map(json_to_prost_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(json_to_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}

pub fn prost_value_to_json(value: prost_types::Value) -> Value {
    use prost_types::value::Kind;
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(prost_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(struct_to_json(s)),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub tags: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scores: HashMap<String, f32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub evaluations: HashMap<String, f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<DocumentJson>,
}

impl From<DocumentJson> for Document {
    fn from(json: DocumentJson) -> Self {
        Document {
            id: json.id,
            text: json.text,
            content: Vec::new(),
            tags: if json.tags.is_empty() {
                None
            } else {
                Some(json_to_struct(json.tags))
            },
            matches: json.matches.into_iter().map(Document::from).collect(),
            scores: json.scores,
            evaluations: json.evaluations,
        }
    }
}

impl From<Document> for DocumentJson {
    fn from(doc: Document) -> Self {
        DocumentJson {
            id: doc.id,
            text: doc.text,
            tags: doc.tags.map(struct_to_json).unwrap_or_default(),
            scores: doc.scores,
            evaluations: doc.evaluations,
            matches: doc.matches.into_iter().map(DocumentJson::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderJson {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub exec_endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusJson {
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl From<Status> for StatusJson {
    fn from(status: Status) -> Self {
        let code = StatusCode::try_from(status.code)
            .unwrap_or(StatusCode::Success)
            .as_str_name()
            .to_string();
        StatusJson {
            code,
            description: status.description,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteJson {
    pub pod: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusJson>,
}

/// Body of `POST /{endpoint}` and of a WebSocket request frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataRequestJson {
    #[serde(default)]
    pub header: HeaderJson,
    #[serde(default)]
    pub data: Vec<DocumentJson>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
}

impl DataRequestJson {
    /// Build the internal request. The path endpoint wins over the one in
    /// the JSON header (the HTTP surface routes by path).
    pub fn into_request(self, endpoint_override: Option<&str>) -> DataRequest {
        let endpoint = match endpoint_override {
            Some(ep) => ep.to_string(),
            None => self.header.exec_endpoint,
        };
        let mut req = DataRequest::new(
            endpoint,
            self.data.into_iter().map(Document::from).collect(),
        );
        if !self.header.request_id.is_empty() {
            if let Some(header) = req.header.as_mut() {
                header.request_id = self.header.request_id;
            }
        }
        if !self.parameters.is_empty() {
            req.parameters = Some(json_to_struct(self.parameters));
        }
        req
    }
}

/// Body of an HTTP response and of a WebSocket response frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataResponseJson {
    pub header: HeaderJson,
    pub data: Vec<DocumentJson>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub routes: Vec<RouteJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusJson>,
}

impl From<DataResponse> for DataResponseJson {
    fn from(resp: DataResponse) -> Self {
        let header = resp.header.unwrap_or_default();
        DataResponseJson {
            header: HeaderJson {
                request_id: header.request_id,
                exec_endpoint: header.exec_endpoint,
            },
            data: resp.docs.into_iter().map(DocumentJson::from).collect(),
            parameters: resp.parameters.map(struct_to_json).unwrap_or_default(),
            routes: resp
                .routes
                .into_iter()
                .map(|r| RouteJson {
                    pod: r.pod,
                    status: r.status.map(StatusJson::from),
                })
                .collect(),
            status: resp.status.map(StatusJson::from),
        }
    }
}
