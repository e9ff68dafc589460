//! Request and response payloads for the SharePoint REST API.

use serde::{Deserialize, Serialize};

/// Decoded payload of an OData object (the contents of the `d` envelope).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Whether a path addresses a file or a folder. SharePoint exposes the two
/// through different endpoints, and the server cannot be asked which one a
/// path is without an extra round-trip, so the caller says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Folder,
}

impl ResourceKind {
    /// The `Get...ByServerRelativeUrl` accessor for this kind.
    pub(crate) fn accessor(self) -> &'static str {
        match self {
            ResourceKind::File => "GetFileByServerRelativeUrl",
            ResourceKind::Folder => "GetFolderByServerRelativeUrl",
        }
    }
}

/// Body of a folder-creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateFolder {
    #[serde(rename = "__metadata")]
    pub metadata: TypeTag,
    #[serde(rename = "ServerRelativeUrl")]
    pub server_relative_url: String,
}

impl CreateFolder {
    pub fn new(server_relative_url: String) -> Self {
        Self {
            metadata: TypeTag {
                kind: "SP.Folder".to_string(),
            },
            server_relative_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeTag {
    #[serde(rename = "type")]
    pub kind: String,
}

/// `POST /_api/contextinfo` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextInfoEnvelope {
    pub d: ContextInfoData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextInfoData {
    #[serde(rename = "GetContextWebInformation")]
    pub web_information: ContextWebInformation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextWebInformation {
    #[serde(rename = "FormDigestValue")]
    pub form_digest_value: String,
    #[serde(rename = "FormDigestTimeoutSeconds")]
    pub form_digest_timeout_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_folder_serializes_verbose_metadata() {
        let body = serde_json::to_value(CreateFolder::new("/Shared Documents/a".to_string())).unwrap();
        assert_eq!(body["__metadata"]["type"], "SP.Folder");
        assert_eq!(body["ServerRelativeUrl"], "/Shared Documents/a");
    }

    #[test]
    fn context_info_parses_digest_fields() {
        let raw = r#"{"d":{"GetContextWebInformation":{"FormDigestValue":"0x1,02 Jan","FormDigestTimeoutSeconds":1800,"WebFullUrl":"https://farm"}}}"#;
        let info: ContextInfoEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(info.d.web_information.form_digest_value, "0x1,02 Jan");
        assert_eq!(info.d.web_information.form_digest_timeout_seconds, 1800);
    }

    #[test]
    fn resource_kind_reads_snake_case() {
        let kind: ResourceKind = serde_json::from_str(r#""folder""#).unwrap();
        assert_eq!(kind, ResourceKind::Folder);
        assert_eq!(ResourceKind::File.accessor(), "GetFileByServerRelativeUrl");
    }
}
