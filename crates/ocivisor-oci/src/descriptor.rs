use std::collections::HashMap;

/// A generic pointer to content, addressed by digest.
///
/// Defined in the OCI Image Specification:
/// <https://github.com/opencontainers/image-spec/blob/main/descriptor.md>
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The media type of the referenced content.
    pub media_type: String,
    /// The digest of the targeted content, `"algo:hex"`.
    pub digest: String,
    /// The size, in bytes, of the raw content.
    pub size: i64,
    /// URIs from which this object may be downloaded, in addition to the
    /// registry it was discovered on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    /// Arbitrary metadata for this descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    /// The platform this descriptor's content targets, when it points at an
    /// image manifest within an index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// The artifact type of the referenced content (OCI 1.1 referrers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor {
            media_type: crate::media_type::IMAGE_CONFIG_MEDIA_TYPE.to_owned(),
            digest: String::new(),
            size: 0,
            urls: None,
            annotations: None,
            platform: None,
            artifact_type: None,
        }
    }
}

/// The runtime platform that a manifest's content targets.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Decodes the `schemaVersion`/`mediaType` pair common to both indexes and
/// manifests, used to sniff which one a fetched document is before
/// committing to a concrete deserialization target.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_with_optional_fields() {
        let json = r#"{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
            "size": 2,
            "artifactType": "application/vnd.example+json"
        }"#;
        let d: Descriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.size, 2);
        assert_eq!(d.artifact_type.as_deref(), Some("application/vnd.example+json"));
        assert!(d.platform.is_none());
    }
}
