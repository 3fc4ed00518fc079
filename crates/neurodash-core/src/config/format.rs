//! Dashboard data format: the declarative per-column schema.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ConfigError, ConfigResult};
use crate::models::columns;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    String,
    Boolean,
    Integer,
    Float,
    List,
    Date,
}

/// How a column is plotted in the operational view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    Categorical,
    Continuous,
    PerPatientCategorical,
    PerPatientContinuous,
    Temporal,
    NotPlottable,
}

/// A plot view selectable for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlotView {
    #[serde(rename = "Integrated")]
    Integrated,
    #[serde(rename = "Integrated - logarithmic")]
    IntegratedLog,
    #[serde(rename = "Temporal")]
    Temporal,
    #[serde(rename = "Temporal - % change")]
    TemporalPercentChange,
    #[serde(rename = "Temporal - proportion")]
    TemporalProportion,
    #[serde(rename = "Temporal - logarithmic")]
    TemporalLog,
}

impl PlotView {
    /// Views offered for categorical columns.
    pub const ALL: [PlotView; 5] = [
        PlotView::Integrated,
        PlotView::IntegratedLog,
        PlotView::Temporal,
        PlotView::TemporalPercentChange,
        PlotView::TemporalProportion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlotView::Integrated => "Integrated",
            PlotView::IntegratedLog => "Integrated - logarithmic",
            PlotView::Temporal => "Temporal",
            PlotView::TemporalPercentChange => "Temporal - % change",
            PlotView::TemporalProportion => "Temporal - proportion",
            PlotView::TemporalLog => "Temporal - logarithmic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            PlotView::Integrated,
            PlotView::IntegratedLog,
            PlotView::Temporal,
            PlotView::TemporalPercentChange,
            PlotView::TemporalProportion,
            PlotView::TemporalLog,
        ]
        .into_iter()
        .find(|v| v.as_str() == s)
    }

    pub fn is_logarithmic(&self) -> bool {
        matches!(self, PlotView::IntegratedLog | PlotView::TemporalLog)
    }
}

/// Schema entry for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Label shown in selection widgets and plot menus
    pub display_name: String,
    pub dtype: Dtype,
    /// Produced by the inference engine rather than read from file
    pub inferred: bool,
    pub in_selection_panel: bool,
    pub plot_type: PlotType,
    #[serde(default)]
    pub allowed_plot_views: Vec<PlotView>,
}

impl FieldSpec {
    /// Entry with the plot views its plot type allows.
    pub fn new(display_name: &str, dtype: Dtype, inferred: bool, in_panel: bool, plot_type: PlotType) -> Self {
        let allowed_plot_views = match plot_type {
            PlotType::Categorical => PlotView::ALL.to_vec(),
            PlotType::Continuous => vec![
                PlotView::Integrated,
                PlotView::IntegratedLog,
                PlotView::Temporal,
            ],
            PlotType::PerPatientCategorical | PlotType::PerPatientContinuous => {
                vec![PlotView::Integrated, PlotView::IntegratedLog]
            }
            PlotType::Temporal => vec![
                PlotView::Temporal,
                PlotView::TemporalPercentChange,
                PlotView::TemporalLog,
            ],
            PlotType::NotPlottable => Vec::new(),
        };
        Self {
            display_name: display_name.to_string(),
            dtype,
            inferred,
            in_selection_panel: in_panel,
            plot_type,
            allowed_plot_views,
        }
    }
}

/// Ordered column schema, as loaded from `dashboard_config.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFormat {
    fields: Vec<(String, FieldSpec)>,
}

impl DataFormat {
    pub fn new(fields: Vec<(String, FieldSpec)>) -> Self {
        Self { fields }
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let format: DataFormat = serde_json::from_str(json)?;
        if format.fields.is_empty() {
            return Err(ConfigError::Invalid("data format declares no fields".into()));
        }
        Ok(format)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Schema of the RIS export plus the six inferred fields.
    pub fn default_ris() -> Self {
        use Dtype::*;
        use PlotType::*;

        let spec = |name: &str, display: &str, dtype, inferred, panel, plot| {
            (name.to_string(), FieldSpec::new(display, dtype, inferred, panel, plot))
        };

        Self::new(vec![
            spec(columns::MRN, "Patient ID", String, false, false, NotPlottable),
            spec(columns::NAME, "Name", String, false, false, NotPlottable),
            spec(columns::EXAM_DATE, "Exam date", Date, false, true, Temporal),
            spec(columns::NARRATIVE, "Narrative", String, false, false, NotPlottable),
            spec(columns::PROCEDURE, "Procedure", String, false, true, Categorical),
            spec(columns::REQUESTING_CLINICIAN, "Requesting clinician", String, false, true, Categorical),
            spec(columns::ORDERING_DEPT, "Ordering department", String, false, true, Categorical),
            spec(columns::DEPT_SPECIALTY, "Department specialty", String, false, true, Categorical),
            spec(columns::REPORTING_CLINICIANS, "Reporting clinicians", String, false, true, Categorical),
            spec(columns::QUALITY_PRIORITY, "Priority", String, false, true, Categorical),
            spec(columns::PATIENT_CLASS, "Patient class", String, false, true, Categorical),
            spec(columns::SEX, "Sex", String, false, true, PerPatientCategorical),
            spec(columns::AGE, "Age", Integer, false, true, Continuous),
            spec(columns::USES_CONTRAST, "Uses contrast", Boolean, true, true, Categorical),
            spec(columns::NORMALITY_CLASS, "Normality class", String, true, true, Categorical),
            spec(columns::IS_COMPARATIVE, "Compared to previous imaging", Boolean, true, false, Categorical),
            spec(columns::REPORT_LENGTH_WORDS, "Report length (words)", Integer, true, false, Continuous),
            spec(columns::SECTIONS, "Sections", List, true, false, NotPlottable),
            spec(columns::PATHOLOGICAL_DOMAINS, "Pathological domains", List, true, true, NotPlottable),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn names_where(&self, pred: impl Fn(&FieldSpec) -> bool) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, spec)| pred(spec))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Columns an uploaded file must provide.
    pub fn required_columns(&self) -> Vec<String> {
        self.names_where(|s| !s.inferred)
    }

    /// Columns the inference engine produces.
    pub fn inferred_columns(&self) -> Vec<String> {
        self.names_where(|s| s.inferred)
    }

    pub fn date_columns(&self) -> Vec<String> {
        self.names_where(|s| s.dtype == Dtype::Date)
    }

    pub fn selection_columns(&self) -> Vec<String> {
        self.names_where(|s| s.in_selection_panel)
    }

    /// Columns summarised with the numeric describe.
    pub fn continuous_columns(&self) -> Vec<String> {
        self.names_where(|s| {
            matches!(s.plot_type, PlotType::Continuous | PlotType::PerPatientContinuous)
        })
    }

    /// Columns summarised with the categorical describe.
    pub fn categorical_columns(&self) -> Vec<String> {
        self.names_where(|s| {
            matches!(s.plot_type, PlotType::Categorical | PlotType::PerPatientCategorical)
        })
    }

    /// Display name to column name, for every plottable column.
    pub fn plottable(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|(_, s)| s.plot_type != PlotType::NotPlottable)
            .map(|(name, s)| (s.display_name.clone(), name.clone()))
            .collect()
    }

    pub fn dtype(&self, name: &str) -> Option<Dtype> {
        self.get(name).map(|s| s.dtype)
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::default_ris()
    }
}

impl Serialize for DataFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, spec) in &self.fields {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

struct DataFormatVisitor;

impl<'de> Visitor<'de> for DataFormatVisitor {
    type Value = DataFormat;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of column name to field spec")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DataFormat, A::Error> {
        let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, spec)) = access.next_entry::<String, FieldSpec>()? {
            fields.push((name, spec));
        }
        Ok(DataFormat { fields })
    }
}

impl<'de> Deserialize<'de> for DataFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DataFormatVisitor)
    }
}
