//! Pathological domains and the lexicons of the rule-based models.

/// The fixed set of clinical categories a narrative may be tagged with.
pub const PATHOLOGICAL_DOMAINS: [&str; 16] = [
    "Interventional - Surgery",
    "Cerebrovascular",
    "Neoplastic & paraneoplastic",
    "Epilepsy",
    "Infectious",
    "Haematological",
    "Metabolic, Nutritional, & Toxic",
    "CSF disorders",
    "Ophthalmological",
    "Headache",
    "Endocrine",
    "Inflammatory & Autoimmune",
    "Neurodegenerative & Dementia",
    "Congenital & Developmental",
    "Traumatic",
    "Musculoskeletal",
];

/// Whether a column or label names one of the pathological domains.
pub fn is_pathological_domain(name: &str) -> bool {
    PATHOLOGICAL_DOMAINS.contains(&name)
}

/// Default trigger patterns per domain for the pattern domain detector.
pub fn default_domain_patterns() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        (
            "Interventional - Surgery",
            &["craniotomy", "craniectomy", "resection", "shunt", "coiling", "clipping", "postoperative", "post-operative", "surgical"],
        ),
        (
            "Cerebrovascular",
            &["infarct", "infarction", "ischaemia", "ischaemic", "ischemic", "haemorrhage", "hemorrhage", "aneurysm", "stroke", "small vessel", "cavernoma", "arteriovenous malformation"],
        ),
        (
            "Neoplastic & paraneoplastic",
            &["tumour", "tumor", "glioma", "glioblastoma", "meningioma", "metastasis", "metastases", "lymphoma", "neoplasm", "neoplastic", "schwannoma"],
        ),
        (
            "Epilepsy",
            &["seizure", "seizures", "epilepsy", "epileptic", "mesial temporal sclerosis", "hippocampal sclerosis"],
        ),
        (
            "Infectious",
            &["abscess", "encephalitis", "meningitis", "infection", "infective", "empyema"],
        ),
        (
            "Haematological",
            &["sickle cell", "thrombocytopenia", "coagulopathy", "anaemia", "anemia"],
        ),
        (
            "Metabolic, Nutritional, & Toxic",
            &["wernicke", "hepatic encephalopathy", "osmotic demyelination", "toxic", "metabolic"],
        ),
        (
            "CSF disorders",
            &["hydrocephalus", "csf leak", "intracranial hypotension", "intracranial hypertension", "ventriculomegaly"],
        ),
        (
            "Ophthalmological",
            &["optic neuritis", "orbit", "orbital", "globe", "papilloedema", "papilledema"],
        ),
        ("Headache", &["headache", "headaches", "migraine"]),
        (
            "Endocrine",
            &["pituitary", "adenoma", "macroadenoma", "microadenoma", "thyroid"],
        ),
        (
            "Inflammatory & Autoimmune",
            &["demyelination", "demyelinating", "multiple sclerosis", "vasculitis", "sarcoidosis", "neuromyelitis"],
        ),
        (
            "Neurodegenerative & Dementia",
            &["atrophy", "dementia", "alzheimer", "neurodegenerative", "volume loss"],
        ),
        (
            "Congenital & Developmental",
            &["chiari", "congenital", "developmental", "heterotopia", "dysplasia", "arachnoid cyst"],
        ),
        (
            "Traumatic",
            &["trauma", "traumatic", "fracture", "contusion", "subdural", "extradural", "diffuse axonal injury"],
        ),
        (
            "Musculoskeletal",
            &["spondylosis", "disc protrusion", "disc bulge", "degenerative disc", "vertebral", "canal stenosis"],
        ),
    ]
}

/// Pathology terms recognised by the keyword entity extractor.
pub const PATHOLOGY_TERMS: &[&str] = &[
    "infarct", "infarction", "haemorrhage", "hemorrhage", "haematoma", "hematoma",
    "tumour", "tumor", "mass", "lesion", "lesions", "atrophy", "hydrocephalus",
    "aneurysm", "oedema", "edema", "ischaemia", "ischemia", "stenosis", "cyst",
    "sclerosis", "fracture", "meningioma", "glioma", "metastasis", "metastases",
    "abscess", "demyelination", "contusion", "enhancement", "collection",
];

/// Descriptor terms recognised by the keyword entity extractor.
pub const DESCRIPTOR_TERMS: &[&str] = &[
    "acute", "subacute", "chronic", "small", "large", "mild", "moderate", "severe",
    "focal", "diffuse", "enhancing", "non-enhancing", "established", "new",
];

/// Location terms recognised by the keyword entity extractor.
pub const LOCATION_TERMS: &[&str] = &[
    "frontal lobe", "parietal lobe", "temporal lobe", "occipital lobe", "frontal",
    "parietal", "temporal", "occipital", "cerebellum", "cerebellar", "brainstem",
    "pons", "midbrain", "medulla", "thalamus", "basal ganglia", "hippocampus",
    "white matter", "corpus callosum", "ventricle", "ventricles", "pituitary",
    "orbit", "spinal cord", "cervical spine", "lumbar spine",
];

/// Words that deny a following finding within the same sentence.
pub const NEGATION_CUES: &[&str] = &[
    "no", "not", "without", "negative for", "absence of", "no evidence of", "nor", "free of",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_patterns() {
        let patterns = default_domain_patterns();
        assert_eq!(patterns.len(), PATHOLOGICAL_DOMAINS.len());
        for (domain, triggers) in patterns {
            assert!(is_pathological_domain(domain), "unknown domain {}", domain);
            assert!(!triggers.is_empty());
        }
    }

    #[test]
    fn test_is_pathological_domain() {
        assert!(is_pathological_domain("Epilepsy"));
        assert!(!is_pathological_domain("epilepsy"));
        assert!(!is_pathological_domain("uses_contrast"));
    }
}
