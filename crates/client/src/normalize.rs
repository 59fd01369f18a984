//! Mapping of raw `/results` payloads onto [`BatchResult`].
//!
//! Pure functions only. Relative resource paths are qualified against the
//! service base, display names are derived from the final path segment,
//! and numeric fields are passed through unchanged.

use batchvision_core::error::BatchError;
use batchvision_core::result::{BatchMetrics, BatchResult, PerItemResult, ResourceRef, StageRefs};
use serde_json::{Map, Value};

use crate::api::RawResults;

/// Name used when a path has no usable final segment.
pub const DEFAULT_DISPLAY_NAME: &str = "image.png";

/// Noise label used when the service does not report one.
pub const NO_NOISE_LABEL: &str = "none";

/// Prefixes of references that are already fully qualified.
const ABSOLUTE_PREFIXES: [&str; 4] = ["http://", "https://", "data:", "blob:"];

/// Normalize a raw results payload for `session_id`.
///
/// Fails with [`BatchError::MalformedResult`] when the record count differs
/// from `expected_items`, a record lacks its resource paths, or a required
/// (or present) numeric field is not a number.
pub fn normalize_results(
    raw: &RawResults,
    base_url: &str,
    session_id: &str,
    expected_items: usize,
) -> Result<BatchResult, BatchError> {
    let records = raw
        .results
        .as_ref()
        .ok_or_else(|| malformed("missing 'results' array"))?;

    if records.len() != expected_items {
        return Err(malformed(format!(
            "expected {expected_items} result records, got {}",
            records.len()
        )));
    }

    let items = records
        .iter()
        .enumerate()
        .map(|(i, record)| normalize_record(i, record, base_url))
        .collect::<Result<Vec<_>, _>>()?;

    let metrics = normalize_metrics(raw)?;

    Ok(BatchResult {
        session_id: session_id.to_string(),
        items,
        metrics,
        synthetic: false,
    })
}

/// Qualify a resource path against the service base location.
///
/// Absolute references (`http(s)://`, `data:`, `blob:`) are returned as-is;
/// anything else is joined to `base` with exactly one `/`.
pub fn qualify(base: &str, path: &str) -> String {
    let path = path.trim();
    if ABSOLUTE_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Stable display name from the final segment of a path or URL.
pub fn display_name(path: &str) -> String {
    if path.starts_with("data:") {
        return DEFAULT_DISPLAY_NAME.to_string();
    }
    let without_suffix = path.split(['?', '#']).next().unwrap_or_default();
    without_suffix
        .rsplit('/')
        .find(|segment| !segment.trim().is_empty())
        .filter(|segment| !segment.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}

// ---- private helpers ----

fn malformed(message: impl Into<String>) -> BatchError {
    BatchError::MalformedResult(message.into())
}

fn normalize_record(index: usize, record: &Value, base_url: &str) -> Result<PerItemResult, BatchError> {
    let obj = record
        .as_object()
        .ok_or_else(|| malformed(format!("result {index} is not an object")))?;

    let original_path = required_str(obj, index, &["original", "original_image"])?;
    let processed_path = required_str(obj, index, &["processed", "segmented_image"])?;

    let name = optional_str(obj, index, &["filename", "name"])?
        .map(str::to_string)
        .unwrap_or_else(|| display_name(original_path));

    let noise_type = optional_str(obj, index, &["noise_type"])?
        .unwrap_or(NO_NOISE_LABEL)
        .to_string();

    let stage = |keys: &[&str]| -> Result<Option<ResourceRef>, BatchError> {
        Ok(optional_str(obj, index, keys)?.map(|p| ResourceRef::url(qualify(base_url, p))))
    };

    Ok(PerItemResult {
        name,
        original: ResourceRef::url(qualify(base_url, original_path)),
        processed: ResourceRef::url(qualify(base_url, processed_path)),
        noise_type,
        stages: StageRefs {
            denoised: stage(&["denoised", "denoised_image"])?,
            enhanced: stage(&["enhanced", "enhanced_image"])?,
            segmented: stage(&["segmented", "segmented_image"])?,
        },
        sequential_time_secs: optional_number(obj, index, "processing_time_sequential")?,
        parallel_time_secs: optional_number(obj, index, "processing_time_parallel")?,
        speedup: optional_number(obj, index, "speedup")?,
    })
}

fn normalize_metrics(raw: &RawResults) -> Result<BatchMetrics, BatchError> {
    let obj = raw
        .metrics
        .as_ref()
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing 'metrics' object"))?;

    let thread_count = obj
        .get("thread_count")
        .or(raw.thread_count.as_ref())
        .and_then(Value::as_u64)
        .map(|n| n as usize);

    Ok(BatchMetrics {
        serial_time_secs: required_metric(obj, &["serial_time_sec", "total_sequential_time"])?,
        parallel_time_secs: required_metric(obj, &["parallel_time_sec", "total_parallel_time"])?,
        speedup: required_metric(obj, &["speedup", "overall_speedup"])?,
        thread_count,
    })
}

/// First non-null value among `keys`.
fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<(&'a Value, String)> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .filter(|v| !v.is_null())
            .map(|v| (v, (*k).to_string()))
    })
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    index: usize,
    keys: &[&str],
) -> Result<&'a str, BatchError> {
    optional_str(obj, index, keys)?
        .ok_or_else(|| malformed(format!("result {index} is missing '{}'", keys[0])))
}

fn optional_str<'a>(
    obj: &'a Map<String, Value>,
    index: usize,
    keys: &[&str],
) -> Result<Option<&'a str>, BatchError> {
    match lookup(obj, keys) {
        None => Ok(None),
        Some((Value::String(s), _)) if !s.trim().is_empty() => Ok(Some(s.as_str())),
        Some((Value::String(_), _)) => Ok(None),
        Some((_, key)) => Err(malformed(format!("result {index} field '{key}' is not a string"))),
    }
}

fn optional_number(
    obj: &Map<String, Value>,
    index: usize,
    key: &str,
) -> Result<Option<f64>, BatchError> {
    match lookup(obj, &[key]) {
        None => Ok(None),
        Some((v, _)) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| malformed(format!("result {index} field '{key}' is not numeric"))),
    }
}

fn required_metric(obj: &Map<String, Value>, keys: &[&str]) -> Result<f64, BatchError> {
    match lookup(obj, keys) {
        None => Err(malformed(format!("metrics are missing '{}'", keys[0]))),
        Some((v, key)) => v
            .as_f64()
            .ok_or_else(|| malformed(format!("metrics field '{key}' is not numeric"))),
    }
}
