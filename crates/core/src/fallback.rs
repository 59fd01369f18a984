//! Synthetic result generation for the degraded path.
//!
//! When polling or result retrieval fails after a session was accepted, the
//! client still renders a complete, internally consistent result built from
//! the original inputs. Every generated [`BatchResult`] has
//! `synthetic == true` so presentation code can label it.

use std::ops::Range;

use rand::Rng;

use crate::job::InputFile;
use crate::result::{BatchMetrics, BatchResult, PerItemResult, ResourceRef, StageRefs};
use crate::types::SessionId;

// ---------------------------------------------------------------------------
// Sampling ranges
// ---------------------------------------------------------------------------

/// Per-item sequential processing time, in seconds.
pub const SEQUENTIAL_TIME_RANGE: Range<f64> = 0.5..1.5;

/// Per-item parallel speedup factor.
pub const SPEEDUP_RANGE: Range<f64> = 2.0..4.0;

/// Noise labels assigned round-robin to synthetic items.
pub const NOISE_LABELS: [&str; 4] = ["salt_pepper", "gaussian", "speckle", "none"];

/// Thread count reported when the host parallelism is unknown.
const DEFAULT_THREAD_COUNT: usize = 4;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Build a synthetic result with one item per input file, using the
/// thread-local RNG.
pub fn synthesize(session_id: SessionId, files: &[InputFile]) -> BatchResult {
    synthesize_with(session_id, files, &mut rand::rng())
}

/// Build a synthetic result with one item per input file.
///
/// Each item reuses the input bytes for the original, all three stage
/// outputs and the processed image. Timings satisfy
/// `parallel = sequential / speedup` up to rounding, and the aggregate
/// metrics are the per-item sums and their ratio.
pub fn synthesize_with<R: Rng + ?Sized>(
    session_id: SessionId,
    files: &[InputFile],
    rng: &mut R,
) -> BatchResult {
    let items: Vec<PerItemResult> = files
        .iter()
        .enumerate()
        .map(|(i, file)| synthetic_item(i, file, rng))
        .collect();

    let serial_time_secs: f64 = items.iter().filter_map(|r| r.sequential_time_secs).sum();
    let parallel_time_secs: f64 = items.iter().filter_map(|r| r.parallel_time_secs).sum();
    let speedup = if parallel_time_secs > 0.0 {
        serial_time_secs / parallel_time_secs
    } else {
        0.0
    };

    let thread_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_THREAD_COUNT);

    BatchResult {
        session_id,
        items,
        metrics: BatchMetrics {
            serial_time_secs,
            parallel_time_secs,
            speedup,
            thread_count: Some(thread_count),
        },
        synthetic: true,
    }
}

fn synthetic_item<R: Rng + ?Sized>(index: usize, file: &InputFile, rng: &mut R) -> PerItemResult {
    let sequential = rng.random_range(SEQUENTIAL_TIME_RANGE);
    let factor = rng.random_range(SPEEDUP_RANGE);
    let parallel = sequential / factor;

    let stand_in = || ResourceRef::Inline {
        name: file.name.clone(),
        bytes: file.bytes.clone(),
    };

    PerItemResult {
        name: file.name.clone(),
        original: stand_in(),
        processed: stand_in(),
        noise_type: NOISE_LABELS[index % NOISE_LABELS.len()].to_string(),
        stages: StageRefs {
            denoised: Some(stand_in()),
            enhanced: Some(stand_in()),
            segmented: Some(stand_in()),
        },
        sequential_time_secs: Some(round_to(sequential, 4)),
        parallel_time_secs: Some(round_to(parallel, 4)),
        speedup: Some(round_to(factor, 2)),
    }
}

/// Round to a fixed number of decimal places.
fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn files(n: usize) -> Vec<InputFile> {
        (0..n)
            .map(|i| InputFile::new(format!("img_{i}.png"), vec![i as u8; 8]))
            .collect()
    }

    #[test]
    fn one_item_per_input_in_order() {
        let inputs = files(5);
        let result = synthesize_with("s1".into(), &inputs, &mut StdRng::seed_from_u64(7));
        assert!(result.synthetic);
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.len(), 5);
        for (item, input) in result.items.iter().zip(&inputs) {
            assert_eq!(item.name, input.name);
        }
    }

    #[test]
    fn stand_ins_reuse_original_bytes() {
        let inputs = files(1);
        let result = synthesize_with("s".into(), &inputs, &mut StdRng::seed_from_u64(1));
        let item = &result.items[0];
        for r in [
            &item.original,
            &item.processed,
            item.stages.denoised.as_ref().unwrap(),
            item.stages.enhanced.as_ref().unwrap(),
            item.stages.segmented.as_ref().unwrap(),
        ] {
            match r {
                ResourceRef::Inline { bytes, .. } => assert_eq!(bytes, &inputs[0].bytes),
                other => panic!("Expected inline stand-in, got {other:?}"),
            }
        }
    }

    #[test]
    fn timings_are_within_ranges_and_consistent() {
        let result = synthesize_with("s".into(), &files(50), &mut StdRng::seed_from_u64(42));
        for item in &result.items {
            let seq = item.sequential_time_secs.unwrap();
            let par = item.parallel_time_secs.unwrap();
            let speedup = item.speedup.unwrap();
            assert!((0.5..=1.5).contains(&seq), "seq {seq}");
            assert!((2.0..=4.0).contains(&speedup), "speedup {speedup}");
            // Rounding to 4 and 2 places bounds the mismatch.
            assert!((par - seq / speedup).abs() < 0.01, "par {par} seq {seq} x{speedup}");
        }
    }

    #[test]
    fn aggregate_metrics_are_sums_and_ratio() {
        let result = synthesize_with("s".into(), &files(3), &mut StdRng::seed_from_u64(3));
        let seq: f64 = result.items.iter().map(|r| r.sequential_time_secs.unwrap()).sum();
        let par: f64 = result.items.iter().map(|r| r.parallel_time_secs.unwrap()).sum();
        assert!((result.metrics.serial_time_secs - seq).abs() < 1e-9);
        assert!((result.metrics.parallel_time_secs - par).abs() < 1e-9);
        assert!((result.metrics.speedup - seq / par).abs() < 1e-9);
        assert!(result.metrics.speedup > 1.0);
        assert!(result.metrics.thread_count.unwrap() >= 1);
    }

    #[test]
    fn noise_labels_cycle() {
        let result = synthesize_with("s".into(), &files(6), &mut StdRng::seed_from_u64(0));
        let labels: Vec<&str> = result.items.iter().map(|r| r.noise_type.as_str()).collect();
        assert_eq!(
            labels,
            vec!["salt_pepper", "gaussian", "speckle", "none", "salt_pepper", "gaussian"]
        );
    }

    #[test]
    fn empty_input_yields_zero_speedup() {
        let result = synthesize_with("s".into(), &[], &mut StdRng::seed_from_u64(0));
        assert!(result.is_empty());
        assert_eq!(result.metrics.speedup, 0.0);
    }

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(2.346, 2), 2.35);
    }
}
