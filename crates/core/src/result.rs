//! Terminal output of a batch job.

use std::sync::Arc;

use serde::Serialize;

use crate::types::SessionId;

/// Where a result image can be obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRef {
    /// Fully qualified reference served by the remote service.
    Url { url: String },
    /// Image bytes held locally (the synthetic fallback reuses inputs).
    Inline {
        name: String,
        #[serde(skip)]
        bytes: Arc<[u8]>,
    },
}

impl ResourceRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url { url } => Some(url),
            Self::Inline { .. } => None,
        }
    }
}

/// Intermediate stage outputs, when the service reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageRefs {
    pub denoised: Option<ResourceRef>,
    pub enhanced: Option<ResourceRef>,
    pub segmented: Option<ResourceRef>,
}

/// Result for one input image, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerItemResult {
    /// Display name, derived from the resource path when not given.
    pub name: String,
    pub original: ResourceRef,
    pub processed: ResourceRef,
    /// Detected noise label; `"none"` when the service reports nothing.
    pub noise_type: String,
    pub stages: StageRefs,
    pub sequential_time_secs: Option<f64>,
    pub parallel_time_secs: Option<f64>,
    pub speedup: Option<f64>,
}

/// Aggregate timings for a whole batch.
///
/// `speedup` is taken as reported by the service; only the synthetic
/// fallback computes it locally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub serial_time_secs: f64,
    pub parallel_time_secs: f64,
    pub speedup: f64,
    /// Worker threads used, when known.
    pub thread_count: Option<usize>,
}

/// The final result of a job, real or synthetic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub session_id: SessionId,
    pub items: Vec<PerItemResult>,
    pub metrics: BatchMetrics,
    /// `true` when generated locally instead of fetched from the service.
    pub synthetic: bool,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_refs_serialize_without_bytes() {
        let r = ResourceRef::Inline {
            name: "cat.png".into(),
            bytes: Arc::from(vec![0u8; 1024]),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "inline", "name": "cat.png"}));
    }

    #[test]
    fn url_refs_serialize_with_url() {
        let json = serde_json::to_value(ResourceRef::url("http://h/a.png")).unwrap();
        assert_eq!(json["kind"], "url");
        assert_eq!(json["url"], "http://h/a.png");
    }

    #[test]
    fn as_url_only_for_remote_refs() {
        assert_eq!(ResourceRef::url("http://h/x").as_url(), Some("http://h/x"));
        let inline = ResourceRef::Inline {
            name: "x".into(),
            bytes: Arc::from(Vec::new()),
        };
        assert!(inline.as_url().is_none());
    }
}
