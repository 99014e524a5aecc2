use crate::align::{AlignedRow, AlignmentReport, FeatureRecord, ModelFeatureSchema, align_with_report};
use crate::artifact::{LoadedArtifacts, ensure_and_load};
use crate::config::{PredictionSettings, Settings};
use crate::download::ArtifactFetcher;
use crate::error::RiskError;
use crate::form::PatientForm;
use crate::forest::SurvivalModel;
use crate::predict::predict;
use crate::render::{CurvePlot, RiskEstimate, render};
use crate::survival::{PredictionError, SurvivalFunction};
use itertools::Itertools;
use std::sync::{Arc, Mutex, OnceLock};

/// The loaded model and schema plus prediction settings, shared read-only by
/// every submission.
#[derive(Debug, Clone)]
pub struct AppContext {
    artifacts: LoadedArtifacts,
    prediction: PredictionSettings,
}

/// The outcome of one "Calculate risk" action.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub row: AlignedRow,
    pub alignment: AlignmentReport,
    pub function: SurvivalFunction,
    pub estimate: RiskEstimate,
    pub plot: CurvePlot,
}

impl AppContext {
    pub fn new(artifacts: LoadedArtifacts, prediction: PredictionSettings) -> Self {
        Self {
            artifacts,
            prediction,
        }
    }

    /// Fetches missing artifacts, loads both, and builds the context.
    pub fn initialize(settings: &Settings, fetcher: &dyn ArtifactFetcher) -> Result<Self, RiskError> {
        let artifacts = ensure_and_load(&settings.artifacts, fetcher)?;
        Ok(Self::new(artifacts, settings.prediction.clone()))
    }

    pub fn schema(&self) -> &ModelFeatureSchema {
        &self.artifacts.schema
    }

    pub fn model(&self) -> &dyn SurvivalModel {
        self.artifacts.model.as_ref()
    }

    pub fn horizon_years(&self) -> f64 {
        self.prediction.horizon_years
    }

    /// Aligns a record to the model schema, reporting likely encoding drift.
    pub fn align(&self, record: &FeatureRecord) -> (AlignedRow, AlignmentReport) {
        let (row, report) = align_with_report(record, self.schema());
        let threshold = self.prediction.fill_warning_threshold;
        if threshold > 0 && report.filled.len() >= threshold {
            log::warn!(
                "{} model column(s) were absent from the form and set to 0 ({}); the form's categorical options may not match the ones used in training",
                report.filled.len(),
                report.filled.iter().join(", ")
            );
        }
        if !report.dropped.is_empty() {
            log::warn!(
                "{} form column(s) are unknown to the model and were ignored ({})",
                report.dropped.len(),
                report.dropped.iter().join(", ")
            );
        }
        log::debug!("Alignment: {report}");
        (row, report)
    }

    pub fn predict(&self, row: &AlignedRow) -> Result<SurvivalFunction, PredictionError> {
        predict(self.model(), row)
    }

    /// Runs align, predict and render for one form submission.
    pub fn assess(&self, form: &PatientForm) -> Result<Assessment, RiskError> {
        let record = form.to_record();
        let (row, alignment) = self.align(&record);
        let function = self.predict(&row)?;
        let (estimate, plot) = render(&function, self.horizon_years())?;
        log::info!(
            "Survival at {} years: {:.6} (risk {:.6})",
            estimate.horizon_years,
            estimate.survival,
            estimate.risk
        );
        Ok(Assessment {
            row,
            alignment,
            function,
            estimate,
            plot,
        })
    }
}

/// Process-wide home for the context. The artifacts are loaded by the first
/// caller; every later caller, concurrent or not, receives the same instance.
#[derive(Debug)]
pub struct SharedContext {
    settings: Settings,
    loading: Mutex<()>,
    loaded: OnceLock<Arc<AppContext>>,
}

impl SharedContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            loading: Mutex::new(()),
            loaded: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Returns the loaded context, loading it first if nobody has yet.
    ///
    /// A failed load leaves the cell empty, so a later call may try again.
    pub fn get_or_load(&self, fetcher: &dyn ArtifactFetcher) -> Result<Arc<AppContext>, RiskError> {
        if let Some(context) = self.loaded.get() {
            return Ok(Arc::clone(context));
        }

        let serialized = self
            .loading
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(context) = self.loaded.get() {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(AppContext::initialize(&self.settings, fetcher)?);
        let stored = self.loaded.get_or_init(|| Arc::clone(&context));
        drop(serialized);
        Ok(Arc::clone(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DownloadError;
    use crate::forest::tests::toy_forest;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn context(columns: &[&str]) -> AppContext {
        let artifacts = LoadedArtifacts {
            model: Arc::new(toy_forest()),
            schema: ModelFeatureSchema::new(columns.iter().map(|c| c.to_string()).collect())
                .unwrap(),
        };
        AppContext::new(artifacts, PredictionSettings::default())
    }

    #[test]
    fn assessment_uses_the_form_values() {
        let ctx = context(&["Age", "AIDS_Yes"]);
        let mut form = PatientForm::default();
        form.set_value("Age", 60.0).unwrap();
        form.select("AIDS", "Yes").unwrap();

        let assessment = ctx.assess(&form).unwrap();
        assert_eq!(assessment.row.values().to_vec(), vec![60.0, 1.0]);
        let expected = 1.0 - (0.85 + 0.80 + 0.94) / 3.0;
        approx::assert_abs_diff_eq!(assessment.estimate.risk, expected, epsilon = 1e-12);
        // Everything else the form produces is unknown to this two-column model.
        assert!(assessment.alignment.filled.is_empty());
        assert!(!assessment.alignment.dropped.is_empty());
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl ArtifactFetcher for CountingFetcher {
        fn fetch(&self, _: &str, destination: &Path) -> Result<(), DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if destination.to_string_lossy().contains("rsf_model") {
                toml::to_string(&toy_forest()).map_err(|e| DownloadError::Network(e.to_string()))?
            } else {
                "features = [\"Age\", \"AIDS_Yes\"]\n".to_string()
            };
            fs::write(destination, body).map_err(|e| DownloadError::Io(e, destination.into()))
        }
    }

    #[test]
    fn concurrent_callers_share_one_load() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.artifacts.directory = dir.path().to_path_buf();
        settings.artifacts.model_url = Some("https://example.org/model".to_string());
        settings.artifacts.features_url = Some("https://example.org/features".to_string());

        let shared = SharedContext::new(settings);
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        assert!(!shared.is_loaded());

        let contexts: Vec<Arc<AppContext>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| shared.get_or_load(&fetcher).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(shared.is_loaded());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));

        shared.get_or_load(&fetcher).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
