//! Processing options sent with a batch submission.
//!
//! The service runs three stages per image (denoise, enhance, segment).
//! In `auto` mode it picks the algorithm for each stage itself; in
//! `advanced` mode the caller selects one per stage.

use std::fmt;
use std::str::FromStr;

use crate::error::BatchError;

// ---------------------------------------------------------------------------
// Form field names
// ---------------------------------------------------------------------------

/// Multipart field carrying the [`Mode`].
pub const FIELD_MODE: &str = "mode";
/// Multipart field carrying the [`NoiseMode`] (advanced only).
pub const FIELD_NOISE_MODE: &str = "noise_mode";
/// Multipart field carrying the [`EnhanceMode`] (advanced only).
pub const FIELD_ENHANCE_MODE: &str = "enhance_mode";
/// Multipart field carrying the [`SegmentMode`] (advanced only).
pub const FIELD_SEGMENT_MODE: &str = "segment_mode";

// ---------------------------------------------------------------------------
// Selector enums
// ---------------------------------------------------------------------------

/// Generates `as_str`, `Display` and `FromStr` for a wire-level selector.
macro_rules! wire_enum {
    ($name:ident, $what:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// All accepted values, in wire order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The value sent on the wire.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = BatchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($wire => Ok($name::$variant),)+
                    other => Err(BatchError::Validation(format!(
                        "unknown {} '{other}'",
                        $what
                    ))),
                }
            }
        }
    };
}

/// Whether the service chooses per-stage algorithms itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Auto,
    Advanced,
}

wire_enum!(Mode, "mode", { Auto => "auto", Advanced => "advanced" });

/// Denoising algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    None,
    #[default]
    Auto,
    Median,
    Gaussian,
    Bilateral,
    Nlm,
}

wire_enum!(NoiseMode, "noise mode", {
    None => "none",
    Auto => "auto",
    Median => "median",
    Gaussian => "gaussian",
    Bilateral => "bilateral",
    Nlm => "nlm",
});

/// Enhancement algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceMode {
    None,
    #[default]
    Auto,
    Clahe,
    Gamma,
    Unsharp,
    Hist,
}

wire_enum!(EnhanceMode, "enhance mode", {
    None => "none",
    Auto => "auto",
    Clahe => "clahe",
    Gamma => "gamma",
    Unsharp => "unsharp",
    Hist => "hist",
});

/// Segmentation algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    None,
    #[default]
    Auto,
    Grabcut,
}

wire_enum!(SegmentMode, "segment mode", {
    None => "none",
    Auto => "auto",
    Grabcut => "grabcut",
});

// ---------------------------------------------------------------------------
// ProcessOptions
// ---------------------------------------------------------------------------

/// Full processing configuration for one submission.
///
/// The per-stage selectors are carried regardless of mode but only sent
/// when `mode` is [`Mode::Advanced`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessOptions {
    pub mode: Mode,
    pub noise_mode: NoiseMode,
    pub enhance_mode: EnhanceMode,
    pub segment_mode: SegmentMode,
}

impl ProcessOptions {
    /// Options for advanced mode with explicit per-stage selectors.
    pub fn advanced(noise: NoiseMode, enhance: EnhanceMode, segment: SegmentMode) -> Self {
        Self {
            mode: Mode::Advanced,
            noise_mode: noise,
            enhance_mode: enhance,
            segment_mode: segment,
        }
    }

    /// The non-file form fields to include in the upload request.
    pub fn form_fields(&self) -> Vec<(&'static str, &'static str)> {
        let mut fields = vec![(FIELD_MODE, self.mode.as_str())];
        if self.mode == Mode::Advanced {
            fields.push((FIELD_NOISE_MODE, self.noise_mode.as_str()));
            fields.push((FIELD_ENHANCE_MODE, self.enhance_mode.as_str()));
            fields.push((FIELD_SEGMENT_MODE, self.segment_mode.as_str()));
        }
        fields
    }
}
