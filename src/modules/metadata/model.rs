use serde::{Deserialize, Serialize};
use validator::Validate;

/// Partial update; `None` leaves the flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    pub pinned: Option<bool>,
    pub muted: Option<bool>,
    pub archived: Option<bool>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.muted.is_none() && self.archived.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_accepts_partial_body() {
        let patch: MetadataPatch = serde_json::from_str(r#"{"archived":true}"#).unwrap();
        assert_eq!(patch, MetadataPatch { archived: Some(true), ..Default::default() });
        assert!(!patch.is_empty());
        assert!(MetadataPatch::default().is_empty());
    }
}
