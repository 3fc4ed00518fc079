//! Rule-based reference models.
//!
//! These need no model artifacts and are deterministic, which makes them the
//! default suite for tests and for hosts without a model runtime. They match
//! whole words case-insensitively against fixed lexicons.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::capability::{
    DomainDetector, EntityExtractor, ModelLoader, ModelPaths, ModelSuite, Sectioner, TextClassifier,
};
use crate::domains::{
    default_domain_patterns, DESCRIPTOR_TERMS, LOCATION_TERMS, NEGATION_CUES, PATHOLOGICAL_DOMAINS,
    PATHOLOGY_TERMS,
};
use crate::extraction::{CategoryScores, Entity, NlpError, NlpResult, Section, IS_COMPARATIVE};

/// Build a case-insensitive whole-word alternation, longest terms first.
fn term_regex<S: AsRef<str>>(terms: &[S]) -> NlpResult<Regex> {
    let mut sorted: Vec<&str> = terms.iter().map(|t| t.as_ref()).collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = sorted
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
        .map_err(|e| NlpError::Load(format!("invalid pattern: {}", e)))
}

/// Byte ranges of the sentences in a text.
fn sentence_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, ch) in text.char_indices() {
        let is_break = match ch {
            '?' | '!' | ';' | '\n' => true,
            // "2.5 cm" is not a sentence end
            '.' => !bytes.get(i + 1).map(|b| b.is_ascii_digit()).unwrap_or(false),
            _ => false,
        };
        if is_break {
            bounds.push((start, i + ch.len_utf8()));
            start = i + ch.len_utf8();
        }
    }
    if start < text.len() {
        bounds.push((start, text.len()));
    }
    bounds
}

// =========================================================================
// Classifier
// =========================================================================

/// Scores 1.0 for the first label whose keywords appear, else for the fallback label.
pub struct KeywordClassifier {
    rules: Vec<(String, Regex)>,
    fallback: Option<String>,
}

impl KeywordClassifier {
    /// Create a classifier from ordered `(label, keywords)` rules.
    pub fn new(rules: &[(&str, &[&str])], fallback: Option<&str>) -> NlpResult<Self> {
        let rules = rules
            .iter()
            .map(|(label, keywords)| Ok((label.to_string(), term_regex(keywords)?)))
            .collect::<NlpResult<Vec<_>>>()?;
        Ok(Self {
            rules,
            fallback: fallback.map(str::to_string),
        })
    }

    /// Normal/abnormal report classifier.
    pub fn normality() -> NlpResult<Self> {
        Self::new(
            &[
                ("INCIDENTAL", &["incidental", "incidentally"]),
                ("CONTEXTUAL", &["for age", "age appropriate", "age-appropriate", "age related"]),
                (
                    "STOCK",
                    &[
                        "normal study",
                        "normal appearances",
                        "unremarkable",
                        "within normal limits",
                        "no intracranial abnormality",
                        "no abnormality",
                    ],
                ),
                ("ABNORMAL", PATHOLOGY_TERMS),
            ],
            Some("DEFACTO"),
        )
    }

    /// Comparison-to-prior-imaging classifier.
    pub fn comparative() -> NlpResult<Self> {
        Self::new(
            &[(
                IS_COMPARATIVE,
                &[
                    "compared",
                    "comparison",
                    "previous",
                    "prior",
                    "interval",
                    "since the last",
                    "unchanged",
                ],
            )],
            None,
        )
    }
}

impl TextClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> NlpResult<CategoryScores> {
        let mut scores: CategoryScores = self
            .rules
            .iter()
            .map(|(label, _)| (label.clone(), 0.0))
            .collect();
        if let Some(fallback) = &self.fallback {
            scores.insert(fallback.clone(), 0.0);
        }

        let hit = self
            .rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(label, _)| label.clone())
            .or_else(|| self.fallback.clone());

        if let Some(label) = hit {
            scores.insert(label, 1.0);
        }
        Ok(scores)
    }
}

// =========================================================================
// Entity extractor
// =========================================================================

/// Lexicon-based entity extractor with sentence-scoped negation and location links.
pub struct KeywordEntityExtractor {
    lexicons: Vec<(&'static str, Regex)>,
    negation: Regex,
    token: Regex,
}

impl KeywordEntityExtractor {
    pub fn new() -> NlpResult<Self> {
        Ok(Self {
            lexicons: vec![
                ("PATHOLOGY", term_regex(PATHOLOGY_TERMS)?),
                ("DESCRIPTOR", term_regex(DESCRIPTOR_TERMS)?),
                ("LOCATION", term_regex(LOCATION_TERMS)?),
            ],
            negation: term_regex(NEGATION_CUES)?,
            token: Regex::new(r"\w+(?:[-']\w+)*|[^\w\s]")
                .map_err(|e| NlpError::Load(e.to_string()))?,
        })
    }

    /// Whether a negation cue governs the span starting at `start` in its sentence.
    fn is_negated(&self, text: &str, sentence_start: usize, start: usize) -> bool {
        let preceding = &text[sentence_start..start];
        // a contrastive conjunction ends the negation scope
        let lower = preceding.to_lowercase();
        let scope = match lower.rfind(" but ") {
            Some(pos) => &lower[pos + 5..],
            None => lower.as_str(),
        };
        self.negation.is_match(scope)
    }
}

impl EntityExtractor for KeywordEntityExtractor {
    fn extract_entities(&self, text: &str) -> NlpResult<Vec<Entity>> {
        let mut spans: Vec<(usize, usize, &'static str)> = self
            .lexicons
            .iter()
            .flat_map(|(label, pattern)| pattern.find_iter(text).map(move |m| (m.start(), m.end(), *label)))
            .collect();
        // earliest first, longest first on ties
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut kept: Vec<(usize, usize, &'static str)> = Vec::new();
        for span in spans {
            if kept.last().map(|last| span.0 < last.1).unwrap_or(false) {
                continue;
            }
            kept.push(span);
        }

        let sentences = sentence_bounds(text);
        let sentence_of = |pos: usize| {
            sentences
                .iter()
                .copied()
                .find(|(s, e)| pos >= *s && pos < *e)
                .unwrap_or((0, text.len()))
        };

        let entities = kept
            .iter()
            .map(|&(start, end, label)| {
                let (s_start, s_end) = sentence_of(start);
                let related_locations = if label == "LOCATION" {
                    Vec::new()
                } else {
                    kept.iter()
                        .filter(|(ls, _, l)| *l == "LOCATION" && *ls >= s_start && *ls < s_end)
                        .map(|(ls, le, _)| text[*ls..*le].to_string())
                        .collect()
                };
                Entity {
                    text: text[start..end].to_string(),
                    label: label.to_string(),
                    start,
                    end,
                    is_negated: label != "LOCATION" && self.is_negated(text, s_start, start),
                    related_locations,
                }
            })
            .collect();

        Ok(entities)
    }

    fn token_count(&self, text: &str) -> NlpResult<usize> {
        Ok(self.token.find_iter(text).count())
    }
}

// =========================================================================
// Domain detector
// =========================================================================

/// Tags a narrative with every domain whose trigger patterns appear in it.
pub struct PatternDomainDetector {
    domains: Vec<(String, Regex)>,
}

impl PatternDomainDetector {
    /// Detector with the built-in trigger patterns.
    pub fn new() -> NlpResult<Self> {
        let domains = default_domain_patterns()
            .into_iter()
            .map(|(domain, patterns)| Ok((domain.to_string(), term_regex(patterns)?)))
            .collect::<NlpResult<Vec<_>>>()?;
        Ok(Self { domains })
    }

    /// Detector from a JSON file mapping domain names to trigger patterns.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> NlpResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let patterns: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
        Self::from_patterns(patterns)
    }

    /// Detector from domain → patterns; known domains keep their canonical order.
    pub fn from_patterns(patterns: BTreeMap<String, Vec<String>>) -> NlpResult<Self> {
        let mut entries: Vec<(String, Vec<String>)> = patterns.into_iter().collect();
        entries.sort_by_key(|(domain, _)| {
            PATHOLOGICAL_DOMAINS
                .iter()
                .position(|d| d == domain)
                .unwrap_or(PATHOLOGICAL_DOMAINS.len())
        });

        let domains = entries
            .into_iter()
            .filter(|(_, triggers)| !triggers.is_empty())
            .map(|(domain, triggers)| Ok((domain, term_regex(&triggers)?)))
            .collect::<NlpResult<Vec<_>>>()?;
        Ok(Self { domains })
    }
}

impl DomainDetector for PatternDomainDetector {
    fn extract_domains(&self, text: &str) -> NlpResult<Vec<String>> {
        Ok(self
            .domains
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .map(|(domain, _)| domain.clone())
            .collect())
    }
}

// =========================================================================
// Sectioner
// =========================================================================

/// Splits narratives at "Heading:" markers.
pub struct HeadingSectioner {
    heading: Regex,
}

impl HeadingSectioner {
    pub fn new() -> NlpResult<Self> {
        let heading = Regex::new(
            r"(?i)\b(clinical (?:details|history|indications?)|history|indications?|technique|findings|comparison|conclusions?|impression|opinion|comments?|summary)\s*:",
        )
        .map_err(|e| NlpError::Load(e.to_string()))?;
        Ok(Self { heading })
    }
}

impl Sectioner for HeadingSectioner {
    fn sections(&self, text: &str) -> NlpResult<Vec<Section>> {
        let headings: Vec<(usize, usize, String)> = self
            .heading
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str().to_lowercase().replace(' ', "_");
                Some((whole.start(), whole.end(), name))
            })
            .collect();

        let mut sections = Vec::new();
        let first_start = headings.first().map(|h| h.0).unwrap_or(text.len());
        let preamble = text[..first_start].trim();
        if !preamble.is_empty() {
            let label = if headings.is_empty() { "body" } else { "preamble" };
            sections.push(Section {
                label: label.to_string(),
                start: 0,
                end: first_start,
                text: preamble.to_string(),
            });
        }

        for (i, (start, content_start, label)) in headings.iter().enumerate() {
            let end = headings.get(i + 1).map(|h| h.0).unwrap_or(text.len());
            sections.push(Section {
                label: label.clone(),
                start: *start,
                end,
                text: text[*content_start..end].trim().to_string(),
            });
        }

        Ok(sections)
    }
}

// =========================================================================
// Loader
// =========================================================================

/// Loads the rule-based suite; a domain pattern file at `domainer` overrides the built-in patterns.
pub struct KeywordModelLoader;

impl ModelLoader for KeywordModelLoader {
    fn load(&self, paths: &ModelPaths) -> NlpResult<ModelSuite> {
        let domains = if paths.domainer.is_file() {
            info!(path = %paths.domainer.display(), "loading domain patterns");
            PatternDomainDetector::from_json_file(&paths.domainer)?
        } else {
            debug!("no domain pattern file, using built-in patterns");
            PatternDomainDetector::new()?
        };

        Ok(ModelSuite {
            normality: Box::new(KeywordClassifier::normality()?),
            comparative: Box::new(KeywordClassifier::comparative()?),
            info: Box::new(KeywordEntityExtractor::new()?),
            domains: Box::new(domains),
            sectioner: Box::new(HeadingSectioner::new()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::normality_class;

    #[test]
    fn test_normality_classifier() {
        let classifier = KeywordClassifier::normality().unwrap();

        let stock = classifier.classify("Normal appearances of the brain.").unwrap();
        assert_eq!(normality_class(&stock).unwrap(), "STOCK");

        let incidental = classifier
            .classify("Unremarkable. Incidental pineal cyst.")
            .unwrap();
        assert_eq!(normality_class(&incidental).unwrap(), "INCIDENTAL");

        let abnormal = classifier.classify("Large left MCA infarct.").unwrap();
        assert_eq!(normality_class(&abnormal).unwrap(), "ABNORMAL");

        let defacto = classifier.classify("MRI head performed.").unwrap();
        assert_eq!(classifier.label("MRI head performed.").unwrap(), "DEFACTO");
        assert_eq!(defacto.len(), 5);
    }

    #[test]
    fn test_comparative_classifier() {
        let classifier = KeywordClassifier::comparative().unwrap();
        let yes = classifier.classify("Compared to the prior study of 2019.").unwrap();
        assert_eq!(yes[IS_COMPARATIVE], 1.0);
        let no = classifier.classify("No acute abnormality.").unwrap();
        assert_eq!(no[IS_COMPARATIVE], 0.0);
    }

    #[test]
    fn test_entity_negation_and_relations() {
        let extractor = KeywordEntityExtractor::new().unwrap();
        let text = "Acute infarct in the left thalamus. No haemorrhage.";
        let entities = extractor.extract_entities(text).unwrap();

        let infarct = entities.iter().find(|e| e.text == "infarct").unwrap();
        assert!(!infarct.is_negated);
        assert_eq!(infarct.related_locations, vec!["thalamus".to_string()]);

        let bleed = entities.iter().find(|e| e.text == "haemorrhage").unwrap();
        assert!(bleed.is_negated);
        assert!(bleed.related_locations.is_empty());

        let acute = entities.iter().find(|e| e.text == "Acute").unwrap();
        assert_eq!(acute.label, "DESCRIPTOR");
    }

    #[test]
    fn test_negation_scope_ends_at_but() {
        let extractor = KeywordEntityExtractor::new().unwrap();
        let entities = extractor
            .extract_entities("No mass but there is hydrocephalus")
            .unwrap();
        let mass = entities.iter().find(|e| e.text == "mass").unwrap();
        let hydro = entities.iter().find(|e| e.text == "hydrocephalus").unwrap();
        assert!(mass.is_negated);
        assert!(!hydro.is_negated);
    }

    #[test]
    fn test_overlapping_terms_keep_longest() {
        let extractor = KeywordEntityExtractor::new().unwrap();
        let entities = extractor
            .extract_entities("Signal change in the temporal lobe.")
            .unwrap();
        let locations: Vec<_> = entities.iter().filter(|e| e.label == "LOCATION").collect();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].text, "temporal lobe");
    }

    #[test]
    fn test_token_count() {
        let extractor = KeywordEntityExtractor::new().unwrap();
        assert_eq!(extractor.token_count("No acute infarct.").unwrap(), 4);
        assert_eq!(extractor.token_count("").unwrap(), 0);
        assert_eq!(extractor.token_count("T2-weighted images").unwrap(), 2);
    }

    #[test]
    fn test_domain_detector() {
        let detector = PatternDomainDetector::new().unwrap();
        let domains = detector
            .extract_domains("Post-operative changes after craniotomy. Known seizures.")
            .unwrap();
        assert_eq!(
            domains,
            vec!["Interventional - Surgery".to_string(), "Epilepsy".to_string()]
        );
        assert!(detector.extract_domains("Normal study.").unwrap().is_empty());
    }

    #[test]
    fn test_domain_detector_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        std::fs::write(
            &path,
            r#"{"Traumatic": ["fall"], "Epilepsy": ["fits"], "Custom": ["zebra"], "Headache": []}"#,
        )
        .unwrap();

        let detector = PatternDomainDetector::from_json_file(&path).unwrap();
        let domains = detector
            .extract_domains("History of fits after a fall. Zebra sign.")
            .unwrap();
        assert_eq!(domains, vec!["Epilepsy", "Traumatic", "Custom"]);
    }

    #[test]
    fn test_sectioner() {
        let sectioner = HeadingSectioner::new().unwrap();
        let text = "MRI head. Clinical history: seizures. Findings: normal. Conclusion: normal study.";
        let sections = sectioner.sections(text).unwrap();

        let labels: Vec<_> = sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["preamble", "clinical_history", "findings", "conclusion"]);
        assert_eq!(sections[1].text, "seizures.");
        assert_eq!(sections[3].end, text.len());
    }

    #[test]
    fn test_sectioner_without_headings() {
        let sectioner = HeadingSectioner::new().unwrap();
        let sections = sectioner.sections("Normal study.").unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, "body");
        assert!(sectioner.sections("   ").unwrap().is_empty());
    }

    #[test]
    fn test_keyword_loader_defaults() {
        let paths = ModelPaths {
            domainer: "/nonexistent/patterns.json".into(),
            ..ModelPaths::default()
        };
        let suite = KeywordModelLoader.load(&paths).unwrap();
        let domains = suite.domains.extract_domains("subdural haematoma").unwrap();
        assert_eq!(domains, vec!["Traumatic".to_string()]);
    }

    #[test]
    fn test_sentence_bounds_skip_decimals() {
        let bounds = sentence_bounds("Lesion 2.5 cm. Stable");
        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[0], (0, 14));
    }
}
