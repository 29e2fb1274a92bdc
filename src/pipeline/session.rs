//! Classification session lifecycle.
//!
//! A session owns the state for one image-classification workflow: the staged
//! image, the consent gate, the status the UI observes, and the latest result
//! or error. Status moves through a fixed machine:
//!
//! ```text
//! idle / ready / error --classify--> loading-model --> predicting --> ready
//!                                          \                 \
//!                                           +----> error <---+
//! ```
//!
//! Precondition failures (no staged image, missing consent) are reported to
//! the caller without touching the status. A classify request issued while
//! another is in flight is ignored. Staging or clearing an image resets the
//! session to idle and invalidates any in-flight request, so a stale outcome
//! can never overwrite the state of a newer one.

use crate::core::cache::ModelCache;
use crate::core::config::ClassifierConfig;
use crate::core::errors::ClassificationError;
use crate::pipeline::engine::InferenceEngine;
use crate::pipeline::result::ClassificationResult;
use crate::processors::calibration::ConfidenceCalibrator;
use crate::processors::preprocess::ImagePreprocessor;
use image::RgbImage;
use std::sync::Arc;

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No classification requested yet, or the session was reset.
    Idle,
    /// The model is being acquired.
    LoadingModel,
    /// The model is loaded and inference is running.
    Predicting,
    /// The last classification completed; a result is available.
    Ready,
    /// The last classification failed; the cause is in `last_error`.
    Error,
}

impl SessionStatus {
    /// The stable string rendering used by UIs and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingModel => "loading-model",
            Self::Predicting => "predicting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(self, Self::LoadingModel | Self::Predicting)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a classify request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// Classification finished; the session is `Ready` and holds a result.
    Completed,
    /// The request was ignored: another classification was in flight, or the
    /// request went stale before it could commit.
    Ignored,
    /// Classification failed; the session is `Error` and holds the cause.
    Failed,
}

/// The staged input, kept in whichever form the caller supplied.
///
/// Raw bytes are decoded during the predicting phase so that a corrupt image
/// fails the classification, not the staging call.
#[derive(Debug, Clone)]
enum StagedImage {
    Decoded(RgbImage),
    Bytes(Vec<u8>),
}

/// One image-classification workflow.
///
/// Single-owner: the session is driven by one caller at a time and is not
/// `Sync`-shared. The heavyweight shared state (loaded models) lives in the
/// [`ModelCache`], which many sessions share.
#[derive(Debug)]
pub struct ClassificationSession {
    config: ClassifierConfig,
    cache: Arc<ModelCache>,
    preprocessor: ImagePreprocessor,
    engine: InferenceEngine,
    calibrator: ConfidenceCalibrator,
    status: SessionStatus,
    staged: Option<StagedImage>,
    consent: bool,
    result: Option<ClassificationResult>,
    last_error: Option<String>,
    /// Bumped whenever the staged input changes; outcomes carrying an older
    /// generation are discarded instead of committed.
    generation: u64,
}

impl ClassificationSession {
    /// Creates a session over a shared model cache.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::Config` if the configuration is invalid.
    pub fn new(
        config: ClassifierConfig,
        cache: Arc<ModelCache>,
    ) -> Result<Self, ClassificationError> {
        config.validate()?;
        Ok(Self {
            config,
            cache,
            preprocessor: ImagePreprocessor::new(),
            engine: InferenceEngine::new(),
            calibrator: ConfidenceCalibrator::new(),
            status: SessionStatus::Idle,
            staged: None,
            consent: false,
            result: None,
            last_error: None,
            generation: 0,
        })
    }

    /// The current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The result of the last completed classification, if any.
    pub fn result(&self) -> Option<&ClassificationResult> {
        self.result.as_ref()
    }

    /// The human-readable cause of the last failure, if any.
    ///
    /// Cleared when a new classification starts or the session resets.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether an image is currently staged.
    pub fn has_image(&self) -> bool {
        self.staged.is_some()
    }

    /// Records whether the user has consented to classification.
    pub fn set_consent(&mut self, consent: bool) {
        self.consent = consent;
    }

    /// Stages a decoded image, replacing any previous input.
    ///
    /// Resets the session to `Idle`: the previous result and error are
    /// discarded and any in-flight request is invalidated.
    pub fn stage_image(&mut self, image: RgbImage) {
        self.reset(Some(StagedImage::Decoded(image)));
    }

    /// Stages raw encoded image bytes, replacing any previous input.
    ///
    /// The bytes are decoded when classification runs, so corrupt input
    /// surfaces as a classification failure rather than a staging failure.
    pub fn stage_image_bytes(&mut self, bytes: Vec<u8>) {
        self.reset(Some(StagedImage::Bytes(bytes)));
    }

    /// Discards the staged image and resets the session to `Idle`.
    pub fn clear_image(&mut self) {
        self.reset(None);
    }

    fn reset(&mut self, staged: Option<StagedImage>) {
        self.staged = staged;
        self.status = SessionStatus::Idle;
        self.result = None;
        self.last_error = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Runs one classification over the staged image.
    ///
    /// Moves the session through `LoadingModel` and `Predicting` and commits
    /// either `Ready` with a calibrated result or `Error` with a cause. If a
    /// classification is already in flight the request is ignored and nothing
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::Precondition` when no image is staged or
    /// consent has not been given; the status is left untouched. Load and
    /// inference failures do not surface as `Err` — they commit the `Error`
    /// status and return [`ClassifyOutcome::Failed`].
    pub fn classify(&mut self) -> Result<ClassifyOutcome, ClassificationError> {
        if self.status.is_in_flight() {
            tracing::debug!(status = %self.status, "classify ignored, request already in flight");
            return Ok(ClassifyOutcome::Ignored);
        }
        if self.staged.is_none() {
            return Err(ClassificationError::precondition("no image staged"));
        }
        if !self.consent {
            return Err(ClassificationError::precondition(
                "consent required before classification",
            ));
        }

        let request = self.generation;
        self.result = None;
        self.last_error = None;

        self.status = SessionStatus::LoadingModel;
        tracing::info!(model_url = %self.config.model_url, "classification started");

        let model = match self
            .cache
            .acquire(&self.config.model_url, self.config.metadata_url.as_deref())
        {
            Ok(model) => model,
            Err(e) => return Ok(self.commit_failure(request, e)),
        };

        self.status = SessionStatus::Predicting;

        match self.run_prediction(&model) {
            Ok(result) => Ok(self.commit_success(request, result)),
            Err(e) => Ok(self.commit_failure(request, e)),
        }
    }

    fn run_prediction(
        &self,
        model: &crate::core::model::LoadedModel,
    ) -> Result<ClassificationResult, ClassificationError> {
        let staged = self
            .staged
            .as_ref()
            .ok_or_else(|| ClassificationError::precondition("no image staged"))?;

        let decoded;
        let image = match staged {
            StagedImage::Decoded(image) => image,
            StagedImage::Bytes(bytes) => {
                decoded = self.preprocessor.decode(bytes)?;
                &decoded
            }
        };

        let tensor = self
            .preprocessor
            .to_tensor(image, model.input_spec().spatial_size)?;

        let mut candidates = self.engine.predict(model, &tensor, self.config.topk)?;
        for candidate in &mut candidates {
            candidate.calibrated_probability = self.calibrator.calibrate(candidate.raw_probability);
        }

        Ok(ClassificationResult::new(candidates))
    }

    /// Commits a successful outcome, unless the request went stale.
    fn commit_success(&mut self, request: u64, result: ClassificationResult) -> ClassifyOutcome {
        if request != self.generation {
            tracing::debug!("stale classification outcome discarded");
            return ClassifyOutcome::Ignored;
        }
        if let Some(top) = result.top() {
            tracing::info!(
                label = %top.label,
                raw = top.raw_probability,
                calibrated = top.calibrated_probability,
                "classification completed"
            );
        }
        self.result = Some(result);
        self.status = SessionStatus::Ready;
        ClassifyOutcome::Completed
    }

    /// Commits a failed outcome, unless the request went stale.
    fn commit_failure(&mut self, request: u64, error: ClassificationError) -> ClassifyOutcome {
        if request != self.generation {
            tracing::debug!(error = %error, "stale classification failure discarded");
            return ClassifyOutcome::Ignored;
        }
        tracing::error!(error = %error, "classification failed");
        self.last_error = Some(error.to_string());
        self.status = SessionStatus::Error;
        ClassifyOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::ModelFetcher;
    use crate::core::model::{LabelMetadata, ModelInputSpec, ModelRuntime};
    use crate::core::tensor::{Tensor2D, Tensor4D};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FixedOutputRuntime {
        output: Vec<f32>,
    }

    impl ModelRuntime for FixedOutputRuntime {
        fn input_spec(&self) -> ModelInputSpec {
            ModelInputSpec { spatial_size: 4 }
        }
        fn run(&self, input: &Tensor4D) -> Result<Tensor2D, ClassificationError> {
            assert_eq!(input.shape(), &[1, 4, 4, 3]);
            Ok(Tensor2D::from_shape_vec((1, self.output.len()), self.output.clone()).unwrap())
        }
    }

    struct StubFetcher {
        output: Vec<f32>,
        labels: Option<Vec<String>>,
        model_fetches: AtomicUsize,
        fail_first: usize,
    }

    impl StubFetcher {
        fn new(output: Vec<f32>, labels: Option<Vec<&str>>) -> Self {
            Self {
                output,
                labels: labels.map(|l| l.into_iter().map(String::from).collect()),
                model_fetches: AtomicUsize::new(0),
                fail_first: 0,
            }
        }
    }

    impl ModelFetcher for StubFetcher {
        fn fetch_model(&self, url: &str) -> Result<Box<dyn ModelRuntime>, ClassificationError> {
            let n = self.model_fetches.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ClassificationError::model_load_msg(url, "host unreachable"));
            }
            Ok(Box::new(FixedOutputRuntime {
                output: self.output.clone(),
            }))
        }

        fn fetch_metadata(&self, url: &str) -> Result<LabelMetadata, ClassificationError> {
            match &self.labels {
                Some(labels) => Ok(LabelMetadata {
                    labels: labels.clone(),
                }),
                None => Err(ClassificationError::metadata_load_msg(url, "not found")),
            }
        }
    }

    fn session_with(fetcher: StubFetcher, topk: usize) -> ClassificationSession {
        let config = ClassifierConfig::new("http://models/histo.onnx")
            .with_metadata_url("http://models/histo.json")
            .with_topk(topk);
        let cache = Arc::new(ModelCache::with_fetcher(Arc::new(fetcher)));
        ClassificationSession::new(config, cache).unwrap()
    }

    fn tissue_fetcher() -> StubFetcher {
        StubFetcher::new(
            vec![0.02, 0.05, 0.88, 0.05],
            Some(vec!["Serous", "Endometrioid", "Mucinous", "Clear Cell"]),
        )
    }

    fn staged(mut session: ClassificationSession) -> ClassificationSession {
        session.stage_image(RgbImage::new(4, 4));
        session.set_consent(true);
        session
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(SessionStatus::Idle.to_string(), "idle");
        assert_eq!(SessionStatus::LoadingModel.to_string(), "loading-model");
        assert_eq!(SessionStatus::Predicting.to_string(), "predicting");
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
        assert_eq!(SessionStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_classify_without_image_is_rejected_without_transition() {
        let mut session = session_with(tissue_fetcher(), 1);
        session.set_consent(true);

        let result = session.classify();
        assert!(matches!(
            result,
            Err(ClassificationError::Precondition { .. })
        ));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.result().is_none());
    }

    #[test]
    fn test_classify_without_consent_is_rejected_without_transition() {
        let mut session = session_with(tissue_fetcher(), 1);
        session.stage_image(RgbImage::new(4, 4));

        let result = session.classify();
        assert!(matches!(
            result,
            Err(ClassificationError::Precondition { .. })
        ));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_high_confidence_prediction_end_to_end() {
        let mut session = staged(session_with(tissue_fetcher(), 1));

        let outcome = session.classify().unwrap();
        assert_eq!(outcome, ClassifyOutcome::Completed);
        assert_eq!(session.status(), SessionStatus::Ready);

        let result = session.result().unwrap();
        assert_eq!(result.candidates().len(), 1);
        let top = result.top().unwrap();
        assert_eq!(top.index, 2);
        assert_eq!(top.label, "Mucinous");
        assert!((top.raw_probability - 0.88).abs() < 1e-6);
        // Above the calibration bands: displayed as-is.
        assert!((top.calibrated_probability - 0.88).abs() < 1e-6);
    }

    #[test]
    fn test_low_confidence_prediction_is_boosted() {
        // A flat distribution: every channel at 0.25, tie broken by index.
        let fetcher = StubFetcher::new(vec![0.25, 0.25, 0.25, 0.25], None);
        let mut session = staged(session_with(fetcher, 1));

        session.classify().unwrap();
        let top = session.result().unwrap().top().unwrap();
        assert_eq!(top.index, 0);
        assert!((top.raw_probability - 0.25).abs() < 1e-6);
        assert!((top.calibrated_probability - 0.8125).abs() < 1e-6);
    }

    #[test]
    fn test_every_candidate_is_calibrated() {
        let fetcher = StubFetcher::new(vec![0.50, 0.25, 0.15, 0.10], None);
        let mut session = staged(session_with(fetcher, 4));

        session.classify().unwrap();
        let candidates = session.result().unwrap().candidates().to_vec();
        assert_eq!(candidates.len(), 4);
        assert!((candidates[0].calibrated_probability - 0.50).abs() < 1e-6);
        assert!((candidates[1].calibrated_probability - 0.8125).abs() < 1e-6);
        assert!((candidates[2].calibrated_probability - 0.4875).abs() < 1e-6);
        assert!((candidates[3].calibrated_probability - 0.325).abs() < 1e-6);
    }

    #[test]
    fn test_missing_metadata_synthesizes_labels() {
        let fetcher = StubFetcher::new(vec![0.02, 0.05, 0.88, 0.05], None);
        let mut session = staged(session_with(fetcher, 1));

        session.classify().unwrap();
        assert_eq!(session.result().unwrap().top().unwrap().label, "Class 2");
    }

    #[test]
    fn test_model_load_failure_reaches_error_and_retry_succeeds() {
        let fetcher = StubFetcher {
            fail_first: 1,
            ..tissue_fetcher()
        };
        let mut session = staged(session_with(fetcher, 1));

        let outcome = session.classify().unwrap();
        assert_eq!(outcome, ClassifyOutcome::Failed);
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.last_error().unwrap().contains("host unreachable"));
        assert!(session.result().is_none());

        // Retry is just another classify; the cache kept no failed entry.
        let outcome = session.classify().unwrap();
        assert_eq!(outcome, ClassifyOutcome::Completed);
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[test]
    fn test_corrupt_bytes_fail_during_prediction() {
        let mut session = session_with(tissue_fetcher(), 1);
        session.stage_image_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        session.set_consent(true);

        let outcome = session.classify().unwrap();
        assert_eq!(outcome, ClassifyOutcome::Failed);
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_encoded_bytes_classify_end_to_end() {
        let mut bytes = Vec::new();
        RgbImage::new(4, 4)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();

        let mut session = session_with(tissue_fetcher(), 1);
        session.stage_image_bytes(bytes);
        session.set_consent(true);

        assert_eq!(session.classify().unwrap(), ClassifyOutcome::Completed);
        assert_eq!(session.result().unwrap().top().unwrap().label, "Mucinous");
    }

    #[test]
    fn test_in_flight_request_ignores_reentrant_classify() {
        let mut session = staged(session_with(tissue_fetcher(), 1));

        for status in [SessionStatus::LoadingModel, SessionStatus::Predicting] {
            session.status = status;
            let outcome = session.classify().unwrap();
            assert_eq!(outcome, ClassifyOutcome::Ignored);
            assert_eq!(session.status(), status);
        }
    }

    #[test]
    fn test_staging_new_image_resets_to_idle() {
        let mut session = staged(session_with(tissue_fetcher(), 1));
        session.classify().unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);

        session.stage_image(RgbImage::new(4, 4));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.result().is_none());
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_clearing_image_resets_and_blocks_classify() {
        let mut session = staged(session_with(tissue_fetcher(), 1));
        session.classify().unwrap();

        session.clear_image();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(!session.has_image());
        assert!(session.classify().is_err());
    }

    #[test]
    fn test_stale_outcome_is_discarded() {
        let mut session = staged(session_with(tissue_fetcher(), 1));

        // Simulate a request whose input was replaced before it finished.
        let old_request = session.generation;
        session.stage_image(RgbImage::new(4, 4));

        let result = ClassificationResult::new(Vec::new());
        assert_eq!(
            session.commit_success(old_request, result),
            ClassifyOutcome::Ignored
        );
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.result().is_none());

        let error = ClassificationError::inference_msg("late failure");
        assert_eq!(
            session.commit_failure(old_request, error),
            ClassifyOutcome::Ignored
        );
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_model_loaded_once_across_classifies() {
        let config = ClassifierConfig::new("http://models/histo.onnx");
        let fetcher = Arc::new(StubFetcher::new(vec![0.1, 0.9], None));
        let cache = Arc::new(ModelCache::with_fetcher(fetcher.clone()));
        let mut session = ClassificationSession::new(config, cache).unwrap();
        session.stage_image(RgbImage::new(4, 4));
        session.set_consent(true);

        session.classify().unwrap();
        session.stage_image(RgbImage::new(4, 4));
        session.set_consent(true);
        session.classify().unwrap();

        assert_eq!(fetcher.model_fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let cache = Arc::new(ModelCache::with_fetcher(Arc::new(tissue_fetcher())));
        let result = ClassificationSession::new(ClassifierConfig::new(""), cache);
        assert!(matches!(result, Err(ClassificationError::Config { .. })));
    }
}
