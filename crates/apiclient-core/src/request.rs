//! Request type: the leaf document of a collection tree.

use serde::{Deserialize, Serialize};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(format!("unknown HTTP method '{other}'")),
        }
    }
}

/// A header, query parameter, or form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Language hint for a raw body (drives editor highlighting and content type).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawLanguage {
    Json,
    Xml,
    Html,
    Javascript,
    #[default]
    Text,
}

/// Request body, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RequestBody {
    None,
    #[serde(rename = "urlencoded")]
    UrlEncoded { fields: Vec<KeyValue> },
    Multipart { fields: Vec<KeyValue> },
    Raw {
        content: String,
        #[serde(default)]
        language: RawLanguage,
    },
}

/// Where an API key is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Authorization descriptor. Execution (token exchange, signing) happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
    None,
    /// Use whatever the enclosing folder or collection configures.
    Inherit,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        access_token_url: String,
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

/// A saved HTTP request. Its name is unique among siblings and doubles as
/// its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub name: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub params: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_response_script: Option<String>,
}

impl Request {
    /// A request with no headers, params, body, auth, or scripts.
    pub fn new(name: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
            auth: None,
            pre_request_script: None,
            post_response_script: None,
        }
    }

    /// Merge a partial update into this request. The name is never touched;
    /// renaming is a structural operation.
    pub fn apply(&mut self, patch: RequestPatch) {
        if let Some(method) = patch.method {
            self.method = method;
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(headers) = patch.headers {
            self.headers = headers;
        }
        if let Some(params) = patch.params {
            self.params = params;
        }
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(auth) = patch.auth {
            self.auth = auth;
        }
        if let Some(script) = patch.pre_request_script {
            self.pre_request_script = script;
        }
        if let Some(script) = patch.post_response_script {
            self.post_response_script = script;
        }
    }
}

/// Partial update for [`Request::apply`].
///
/// Outer `None` leaves a field alone; for optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<KeyValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<KeyValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Option<RequestBody>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Option<Auth>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request_script: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_response_script: Option<Option<String>>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        *self == RequestPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_serializes_uppercase_and_parses_any_case() {
        let json = serde_json::to_string(&HttpMethod::Delete).expect("serialize");
        assert_eq!(json, "\"DELETE\"");
        assert_eq!("post".parse::<HttpMethod>(), Ok(HttpMethod::Post));
        assert!("FETCH".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn body_is_tagged_by_mode() {
        let body = RequestBody::Raw {
            content: "{}".to_string(),
            language: RawLanguage::Json,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["mode"], "raw");
        assert_eq!(json["language"], "json");

        let form: RequestBody =
            serde_json::from_str(r#"{"mode":"urlencoded","fields":[{"key":"a","value":"1"}]}"#)
                .expect("deserialize");
        match form {
            RequestBody::UrlEncoded { fields } => assert!(fields[0].enabled),
            other => panic!("expected urlencoded body, got {other:?}"),
        }
    }

    #[test]
    fn auth_is_tagged_by_type() {
        let auth: Auth =
            serde_json::from_str(r#"{"type":"api_key","key":"X-Key","value":"s3cret"}"#)
                .expect("deserialize");
        assert_eq!(
            auth,
            Auth::ApiKey {
                key: "X-Key".to_string(),
                value: "s3cret".to_string(),
                location: ApiKeyLocation::Header,
            }
        );
        let json = serde_json::to_value(Auth::OAuth2 {
            access_token_url: "https://id/token".to_string(),
            client_id: "cli".to_string(),
            client_secret: None,
            scope: None,
        })
        .expect("serialize");
        assert_eq!(json["type"], "oauth2");
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn minimal_request_document_fills_defaults() {
        let req: Request = serde_json::from_str(r#"{"name":"Ping"}"#).expect("deserialize");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.url.is_empty());
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut req = Request::new("Create Order", HttpMethod::Post, "/orders");
        req.pre_request_script = Some("console.log(1)".to_string());
        req.headers.push(KeyValue::new("Accept", "application/json"));

        req.apply(RequestPatch {
            url: Some("/v2/orders".to_string()),
            pre_request_script: Some(None),
            ..RequestPatch::default()
        });

        assert_eq!(req.name, "Create Order");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "/v2/orders");
        assert_eq!(req.headers.len(), 1);
        assert!(req.pre_request_script.is_none());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(RequestPatch::default().is_empty());
        let patch = RequestPatch {
            method: Some(HttpMethod::Put),
            ..RequestPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
