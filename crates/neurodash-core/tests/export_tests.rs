//! Export integration tests: enriched CSV round trip and PDF generation.

use chrono::NaiveDate;
use neurodash_core::analysis::OperationalSummary;
use neurodash_core::config::{DataFormat, InferenceOptions};
use neurodash_core::enrich::{InferenceEngine, InferredField};
use neurodash_core::export::{
    generate, records_to_csv, table_to_csv, write_export, Chart, ChartKind, ChartRenderer, Figure,
    ImageSource, RasterChartRenderer, ReportBundle, Series,
};
use neurodash_core::ingest::{load_reports, UploadedFile};
use neurodash_core::models::ReportSet;
use neurodash_nlp::{KeywordModelLoader, ModelPaths};

const RIS_EXPORT: &str = "\
MRN,Name,End Exam Date,Narrative,Procedure,Requesting Clinician,Ordering Dept,Dept Specialty,Reporting Clinicians,Quality Priority,Base Pt Class,Sex,Age
A1,Ann,02/03/2022 09:00,Acute infarct in the left frontal lobe . With oedema.,MRI Head,Dr R,Neuro,Neurology,\"Dr X\nDr Y\",Routine,Inpatient,F,41
A1,Ann,05/03/2022 09:00,No haemorrhage. Stable appearances.,CT Head with contrast,Dr R,Neuro,Neurology,Dr X,Routine,Inpatient,F,41
B2,Bob,03/03/2022 11:30,Normal study.,MRI Spine,Dr S,Ortho,Orthopaedics,Dr Y,Urgent,Outpatient,M,67
C3,Cat,13/03/2022 16:45,Glioma in the right temporal lobe.,MRI Head with gadolinium,Dr S,Onc,Oncology,Dr Z,Urgent,Inpatient,F,
";

fn enriched_reports() -> ReportSet {
    let format = DataFormat::default_ris();
    let file = UploadedFile::new("ris.csv", RIS_EXPORT.as_bytes().to_vec());
    let reports = load_reports(&[file], &format).unwrap();
    let engine = InferenceEngine::load(&KeywordModelLoader, &ModelPaths::default()).unwrap();
    engine
        .infer(&reports, &InferredField::ALL, &InferenceOptions::default())
        .unwrap()
}

fn keys(reports: &ReportSet) -> Vec<(Option<String>, Option<chrono::NaiveDateTime>)> {
    reports
        .records
        .iter()
        .map(|r| (r.patient_id(), r.exam_date()))
        .collect()
}

#[test]
fn test_enriched_csv_round_trip() {
    let reports = enriched_reports();
    assert!(reports.is_enriched());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selection.csv");
    write_export(&path, &records_to_csv(&reports.view()).unwrap()).unwrap();

    let reloaded = load_reports(&[UploadedFile::from_path(&path).unwrap()], &DataFormat::default_ris()).unwrap();
    assert_eq!(reloaded.len(), reports.len());
    assert_eq!(keys(&reloaded), keys(&reports));
    assert!(reloaded.is_enriched());

    for (before, after) in reports.records.iter().zip(&reloaded.records) {
        assert_eq!(before.uses_contrast(), after.uses_contrast());
        assert_eq!(before.pathological_domains(), after.pathological_domains());
        assert_eq!(before.narrative(), after.narrative());
        assert_eq!(before.age(), after.age());
    }
}

#[test]
fn test_narratives_cleaned_on_load() {
    let reports = enriched_reports();
    assert_eq!(
        reports.records[0].narrative(),
        "Acute infarct in the left frontal lobe. With oedema."
    );
}

#[test]
fn test_summary_csvs() {
    let reports = enriched_reports();
    let summary = OperationalSummary::compute(&reports.view(), &DataFormat::default_ris());

    let continuous = String::from_utf8(table_to_csv(&summary.continuous).unwrap()).unwrap();
    assert!(continuous.lines().next().unwrap().starts_with(",Age"));
    assert!(continuous.lines().any(|l| l.starts_with("count,3")));

    let categorical = String::from_utf8(table_to_csv(&summary.categorical).unwrap()).unwrap();
    assert!(categorical.lines().any(|l| l.starts_with("count,")));
}

#[test]
fn test_operational_pdf() {
    let reports = enriched_reports();
    let summary = OperationalSummary::compute(&reports.view(), &DataFormat::default_ris());
    let figure = Figure::single(
        Chart::new(ChartKind::Bars, "Sex")
            .categories(vec!["F".into(), "M".into()])
            .series(Series::dense("count", [3.0, 1.0])),
    );
    let png = RasterChartRenderer::new().render(&figure).unwrap();
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

    let bundle = ReportBundle::operational(
        NaiveDate::from_ymd_opt(2022, 4, 1).unwrap(),
        &summary.basic,
        &summary.categorical,
        &summary.continuous,
        ImageSource::bytes("sex.png", png),
    );
    let pdf = generate(&bundle).unwrap();
    assert!(pdf.as_bytes().starts_with(b"%PDF"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("operational.pdf");
    pdf.write_to(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap().len(), pdf.len());
}
