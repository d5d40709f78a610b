use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Frame shape requested for the first clip of a sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl Display for AspectRatio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "16:9" | "landscape" => Ok(Self::Landscape),
            "9:16" | "portrait" => Ok(Self::Portrait),
            other => Err(format!("unsupported aspect ratio {other:?} (expected 16:9 or 9:16)")),
        }
    }
}

/// Opaque reference returned by the generation service.
///
/// The engine stores it with each history entry and hands it back verbatim
/// when that entry is extended. Its contents are never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipAsset(serde_json::Value);

impl ClipAsset {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Completed clip produced by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedClip {
    pub media: Arc<[u8]>,
    pub asset: ClipAsset,
}

/// Failure reported by the generation service.
///
/// Network errors, policy rejections, malformed responses and failed jobs all
/// collapse into one human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    message: String,
}

impl GenerationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for GenerationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GenerationFailure {}

/// Outcome of one generation call.
pub type GenerationOutcome = std::result::Result<GeneratedClip, GenerationFailure>;

/// Video generation operations required by the engine.
///
/// Each call may suspend for a long time (the service polls a job until it
/// finishes). The engine issues at most one call at a time.
pub trait GenerationBackend {
    /// Generates the first clip of a sequence.
    fn request_new_clip(&self, prompt: &str, aspect_ratio: AspectRatio) -> GenerationOutcome;

    /// Generates a continuation of the clip identified by `asset`.
    fn request_extension(&self, asset: &ClipAsset, prompt: &str) -> GenerationOutcome;
}

/// One request issued by the session, tagged with the epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub(crate) epoch: u64,
    pub(crate) prompt: String,
    pub(crate) kind: GenerationKind,
}

/// Whether a request starts a sequence or extends its tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationKind {
    NewClip { aspect_ratio: AspectRatio },
    Extension { asset: ClipAsset },
}

impl GenerationRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn kind(&self) -> &GenerationKind {
        &self.kind
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.kind, GenerationKind::Extension { .. })
    }

    /// Runs the request against `backend`.
    pub fn dispatch<G>(&self, backend: &G) -> GenerationOutcome
    where
        G: GenerationBackend + ?Sized,
    {
        match &self.kind {
            GenerationKind::NewClip { aspect_ratio } => {
                backend.request_new_clip(&self.prompt, *aspect_ratio)
            }
            GenerationKind::Extension { asset } => backend.request_extension(asset, &self.prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[test]
    fn aspect_ratio_parses_and_serializes_as_ratio_text() {
        assert_eq!("9:16".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert_eq!(" 16:9 ".parse::<AspectRatio>(), Ok(AspectRatio::Landscape));
        assert!("4:3".parse::<AspectRatio>().is_err());

        let encoded = serde_json::to_string(&AspectRatio::Portrait).expect("serialize");
        assert_eq!(encoded, "\"9:16\"");
    }

    #[test]
    fn dispatch_routes_extension_with_the_stored_asset() {
        let backend = RecordingBackend::default();
        let asset = ClipAsset::new(json!({ "uri": "video/1" }));
        let request = GenerationRequest {
            epoch: 0,
            prompt: String::from("cat jumps"),
            kind: GenerationKind::Extension {
                asset: asset.clone(),
            },
        };

        request.dispatch(&backend).expect("extension should succeed");

        let calls = backend.calls.lock().expect("lock calls");
        assert_eq!(calls.as_slice(), [format!("extend {} cat jumps", asset.as_value())]);
    }

    #[test]
    fn dispatch_routes_new_clip_with_aspect_ratio() {
        let backend = RecordingBackend::default();
        let request = GenerationRequest {
            epoch: 0,
            prompt: String::from("a cat walking"),
            kind: GenerationKind::NewClip {
                aspect_ratio: AspectRatio::Portrait,
            },
        };

        request.dispatch(&backend).expect("new clip should succeed");

        let calls = backend.calls.lock().expect("lock calls");
        assert_eq!(calls.as_slice(), ["new 9:16 a cat walking"]);
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
    }

    impl GenerationBackend for RecordingBackend {
        fn request_new_clip(&self, prompt: &str, aspect_ratio: AspectRatio) -> GenerationOutcome {
            self.calls
                .lock()
                .expect("lock calls")
                .push(format!("new {aspect_ratio} {prompt}"));
            Ok(GeneratedClip {
                media: Arc::from(vec![1_u8]),
                asset: ClipAsset::new(json!({ "uri": "video/1" })),
            })
        }

        fn request_extension(&self, asset: &ClipAsset, prompt: &str) -> GenerationOutcome {
            self.calls
                .lock()
                .expect("lock calls")
                .push(format!("extend {} {prompt}", asset.as_value()));
            Ok(GeneratedClip {
                media: Arc::from(vec![2_u8]),
                asset: ClipAsset::new(json!({ "uri": "video/2" })),
            })
        }
    }
}
