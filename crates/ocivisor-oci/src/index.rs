use crate::descriptor::Descriptor;
use std::collections::HashMap;

/// An OCI image index: a list of manifests, usually one per platform, or
/// (for the referrers API) one per object referring to a given subject.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub schema_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Index {
    /// An empty index, returned by the referrers fallback when every
    /// fallback step fails.
    pub fn empty() -> Self {
        Index {
            schema_version: 2,
            media_type: Some(crate::media_type::IMAGE_INDEX_MEDIA_TYPE.to_owned()),
            manifests: Vec::new(),
            subject: None,
            artifact_type: None,
            annotations: None,
        }
    }

    /// Keep only manifests matching `artifact_type`, if one was requested.
    pub fn filter_artifact_type(mut self, artifact_type: Option<&str>) -> Self {
        if let Some(at) = artifact_type {
            self.manifests.retain(|d| d.artifact_type.as_deref() == Some(at));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_has_schema_version_two_and_no_manifests() {
        let idx = Index::empty();
        assert_eq!(idx.schema_version, 2);
        assert!(idx.manifests.is_empty());
    }

    #[test]
    fn filter_artifact_type_drops_non_matching_entries() {
        let mut idx = Index::empty();
        idx.manifests.push(Descriptor {
            artifact_type: Some("a".to_owned()),
            ..Descriptor::default()
        });
        idx.manifests.push(Descriptor {
            artifact_type: Some("b".to_owned()),
            ..Descriptor::default()
        });
        let filtered = idx.filter_artifact_type(Some("a"));
        assert_eq!(filtered.manifests.len(), 1);
        assert_eq!(filtered.manifests[0].artifact_type.as_deref(), Some("a"));
    }
}
