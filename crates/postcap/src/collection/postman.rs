//! Postman Collection v2.1 rendering and reading.
//!
//! Rendering is deterministic: no random ids, no timestamps, child folders
//! before requests, everything else in model order. Reading turns a
//! previously written document back into flows so a session can resume by
//! replaying them through the normal pipeline.

use super::{CollectionModel, ExampleRequest, ExampleResponse, Folder, RequestEntry};
use crate::error::CaptureError;
use crate::flow::{Flow, FlowResponse, HeaderList};
use crate::normalize::content::essence;
use crate::normalize::{CapturedBody, ContentKind};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const SCHEMA_V2_1: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanCollection {
    pub info: Info,
    #[serde(default)]
    pub item: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    SCHEMA_V2_1.to_string()
}

/// A folder or a request. Folders are the ones with a nested `item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Folder(FolderItem),
    Request(RequestItem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderItem {
    pub name: String,
    pub item: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub name: String,
    pub request: PmRequest,
    #[serde(default)]
    pub response: Vec<PmResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmRequest {
    pub method: String,
    #[serde(default)]
    pub header: Vec<PmHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PmBody>,
    pub url: PmUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmHeader {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default = "text_type")]
    pub kind: String,
}

fn text_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmUrl {
    pub raw: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub host: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<PmQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmQuery {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmBody {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urlencoded: Option<Vec<PmFormParam>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PmBodyOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmFormParam {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default = "text_type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmBodyOptions {
    pub raw: PmRawOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmRawOptions {
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmResponse {
    pub name: String,
    #[serde(rename = "originalRequest")]
    pub original_request: PmRequest,
    #[serde(default)]
    pub status: String,
    pub code: u16,
    #[serde(rename = "_postman_previewlanguage", default)]
    pub preview_language: String,
    #[serde(default)]
    pub header: Vec<PmHeader>,
    #[serde(default)]
    pub body: String,
}

/// Build the Postman document for `model`.
pub fn to_document(model: &CollectionModel) -> PostmanCollection {
    PostmanCollection {
        info: Info {
            name: model.name.clone(),
            schema: default_schema(),
        },
        item: folder_items(&model.root),
    }
}

/// Render `model` as pretty JSON with a trailing newline.
pub fn serialize(model: &CollectionModel) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = serde_json::to_vec_pretty(&to_document(model))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn folder_items(folder: &Folder) -> Vec<Item> {
    let folders = folder.children.iter().map(|child| {
        Item::Folder(FolderItem {
            name: child.name.clone(),
            item: folder_items(child),
        })
    });
    let requests = folder.items.iter().map(|e| Item::Request(request_item(e)));
    folders.chain(requests).collect()
}

fn request_item(entry: &RequestEntry) -> RequestItem {
    let name = entry.name();
    let request = pm_request(entry.key.method.as_str(), &entry.request);
    RequestItem {
        response: vec![pm_response(&name, request.clone(), &entry.response)],
        name,
        request,
    }
}

fn pm_request(method: &str, example: &ExampleRequest) -> PmRequest {
    PmRequest {
        method: method.to_string(),
        header: example
            .headers
            .iter()
            .map(|(k, v)| header(k, v))
            .collect(),
        body: example.body.as_ref().map(pm_body),
        url: PmUrl {
            raw: example.url.clone(),
            protocol: example.scheme.clone(),
            host: example.host.split('.').map(str::to_string).collect(),
            port: example.port.map(|p| p.to_string()),
            path: example.segments.clone(),
            query: example
                .query
                .iter()
                .map(|(k, v)| PmQuery {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
        },
    }
}

fn header(key: &str, value: &str) -> PmHeader {
    PmHeader {
        key: key.to_string(),
        value: value.to_string(),
        kind: text_type(),
    }
}

fn pm_body(body: &CapturedBody) -> PmBody {
    match body.kind {
        ContentKind::Form => PmBody {
            mode: "urlencoded".to_string(),
            raw: None,
            urlencoded: Some(
                url::form_urlencoded::parse(&body.bytes)
                    .map(|(k, v)| PmFormParam {
                        key: k.into_owned(),
                        value: v.into_owned(),
                        kind: text_type(),
                    })
                    .collect(),
            ),
            options: None,
        },
        ContentKind::Json => PmBody {
            mode: "raw".to_string(),
            raw: Some(body.text()),
            urlencoded: None,
            options: Some(PmBodyOptions {
                raw: PmRawOptions {
                    language: "json".to_string(),
                },
            }),
        },
        ContentKind::Raw => PmBody {
            mode: "raw".to_string(),
            raw: Some(body.text()),
            urlencoded: None,
            options: None,
        },
    }
}

fn preview_language(response: &ExampleResponse) -> &'static str {
    if let Some(body) = &response.body {
        if body.kind == ContentKind::Json {
            return "json";
        }
    }
    let essence = response.content_type.as_deref().map(essence).unwrap_or_default();
    if essence.contains("html") {
        "html"
    } else if essence.contains("xml") {
        "xml"
    } else if essence.contains("javascript") {
        "javascript"
    } else {
        "text"
    }
}

fn pm_response(name: &str, original_request: PmRequest, response: &ExampleResponse) -> PmResponse {
    let status = hyper::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string();
    PmResponse {
        name: name.to_string(),
        original_request,
        status,
        code: response.status,
        preview_language: preview_language(response).to_string(),
        header: response
            .content_type
            .iter()
            .map(|ct| header("Content-Type", ct))
            .collect(),
        body: response
            .body
            .as_ref()
            .map(CapturedBody::text)
            .unwrap_or_default(),
    }
}

/// Parse a collection document into its name and the flows that rebuild it.
///
/// Flows come out in document order (depth first, child folders before a
/// folder's own requests), which is the order that recreates the same tree.
pub fn read_flows(bytes: &[u8]) -> Result<(String, Vec<Flow>), CaptureError> {
    let document: PostmanCollection = serde_json::from_slice(bytes)?;
    let mut flows = Vec::new();
    collect_flows(&document.item, &mut flows);
    Ok((document.info.name, flows))
}

fn collect_flows(items: &[Item], flows: &mut Vec<Flow>) {
    for item in items {
        match item {
            Item::Folder(folder) => collect_flows(&folder.item, flows),
            Item::Request(request) => flows.push(flow_of(request)),
        }
    }
}

fn flow_of(item: &RequestItem) -> Flow {
    let request = &item.request;
    let headers: HeaderList = request
        .header
        .iter()
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect();
    let body = request.body.as_ref().and_then(body_bytes);
    let response = item.response.first().map(|r| FlowResponse {
        status: r.code,
        headers: r
            .header
            .iter()
            .map(|h| (h.key.clone(), h.value.clone()))
            .collect(),
        body: (!r.body.is_empty()).then(|| Bytes::from(r.body.clone())),
    });
    Flow {
        method: request.method.clone(),
        url: request.url.raw.clone(),
        headers,
        body,
        response,
    }
}

fn body_bytes(body: &PmBody) -> Option<Bytes> {
    match body.mode.as_str() {
        "urlencoded" => body.urlencoded.as_ref().map(|params| {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter().map(|p| (p.key.as_str(), p.value.as_str())))
                .finish();
            Bytes::from(encoded)
        }),
        _ => body.raw.clone().map(Bytes::from),
    }
}
