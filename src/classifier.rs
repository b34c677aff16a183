//! Message Classifier
//!
//! Local, dependency-free classification of user messages along two
//! independent axes: complexity tier (drives model choice) and module
//! tag (topic routing). Pure functions, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Complexity tier of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    /// Greetings, acknowledgments, very short messages
    Trivial,
    /// Default conversational questions
    Simple,
    /// Elaboration requests (explain in detail, analyze, prove, ...)
    Complex,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Trivial => "trivial",
            ComplexityTier::Simple => "simple",
            ComplexityTier::Complex => "complex",
        }
    }
}

/// Topic module of a message, independent of complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModuleTag {
    /// ENEM / entrance-exam prep
    ExamPrep,
    /// Lesson and teaching content
    LessonContent,
    /// Essay writing and grading
    EssayWriting,
    /// Default tutoring module
    General,
}

impl ModuleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleTag::ExamPrep => "enem",
            ModuleTag::LessonContent => "aula_interativa",
            ModuleTag::EssayWriting => "redacao",
            ModuleTag::General => "professor",
        }
    }

    /// Parse a client-supplied module name. Unknown names map to the
    /// default module rather than erroring.
    pub fn parse(s: &str) -> Option<ModuleTag> {
        match s.to_lowercase().as_str() {
            "enem" => Some(ModuleTag::ExamPrep),
            "aula_interativa" | "aula" => Some(ModuleTag::LessonContent),
            "redacao" | "redação" => Some(ModuleTag::EssayWriting),
            "professor" | "atendimento" => Some(ModuleTag::General),
            _ => None,
        }
    }
}

/// How the classification was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Module supplied explicitly by the caller
    ClientOverride,
    /// Keyword/length heuristics in this process
    LocalHeuristic,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::ClientOverride => "client_override",
            ClassificationSource::LocalHeuristic => "local_heuristic",
        }
    }
}

/// Result of classifying one message. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub tier: ComplexityTier,
    pub module: ModuleTag,
    pub source: ClassificationSource,
}

const TRIVIAL_MAX_CHARS: usize = 20;
const COMPLEX_MIN_CHARS: usize = 30;

static GREETING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(oi|ol[áa]|bom dia|boa tarde|boa noite|tudo bem|td bem|obrigad[oa]|valeu|ok|beleza|tchau)\b",
    )
    .unwrap()
});

// Elaboration-request stems. Substring match on the lowercased message,
// so "explic" covers explicar/explique/explicação.
static ELABORATION_KEYWORDS: &[&str] = &[
    "explique detalhadamente",
    "explicar detalhadamente",
    "explica[çc][ãa]o detalhada",
    "detalhadamente",
    "demonstr",
    "analis",
    "an[áa]lise",
    "justifi",
    "desenvolv",
    "compar",
    "sintetiz",
    "s[íi]ntese",
    "passo a passo",
    "prov[ae]\\b",
    "teorema",
    "deriv",
    "integr",
];

static ELABORATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i)({})", ELABORATION_KEYWORDS.join("|"))).unwrap()
});

// Module keyword sets, evaluated in fixed order: exam-prep first, then
// lesson-content, then essay-writing. First match wins.
static EXAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(enem|simulado|vestibular|gabarito|prova objetiva|tri|m[úu]ltipla escolha|quest[õo]es do enem)\b",
    )
    .unwrap()
});

static LESSON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\baulas?\b|\bslides?\b|explic|equa[çc][ãa]o|\bf[óo]rmula\b|conte[úu]do did[áa]tico|material did[áa]tico|atividade)",
    )
    .unwrap()
});

static ESSAY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(reda[çc][ãa]o|disserta|\btexto argumentativo\b|\bescrever um texto\b|corrigir meu texto)")
        .unwrap()
});

/// Classify a message. The input is expected to be trimmed and non-empty;
/// empty input is the caller's responsibility to reject.
pub fn classify(message: &str) -> ClassificationResult {
    ClassificationResult {
        tier: classify_tier(message),
        module: classify_module(message),
        source: ClassificationSource::LocalHeuristic,
    }
}

/// Complexity pass: length and keyword heuristics, in priority order.
pub fn classify_tier(message: &str) -> ComplexityTier {
    let trimmed = message.trim();
    let len = trimmed.chars().count();

    if len < TRIVIAL_MAX_CHARS || GREETING_PATTERN.is_match(trimmed) {
        return ComplexityTier::Trivial;
    }

    if len > COMPLEX_MIN_CHARS && ELABORATION_PATTERN.is_match(trimmed) {
        return ComplexityTier::Complex;
    }

    ComplexityTier::Simple
}

/// Topic pass: ordered keyword sets, first match wins.
pub fn classify_module(message: &str) -> ModuleTag {
    if EXAM_PATTERN.is_match(message) {
        ModuleTag::ExamPrep
    } else if LESSON_PATTERN.is_match(message) {
        ModuleTag::LessonContent
    } else if ESSAY_PATTERN.is_match(message) {
        ModuleTag::EssayWriting
    } else {
        ModuleTag::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_is_trivial() {
        assert_eq!(classify_tier("oi"), ComplexityTier::Trivial);
        assert_eq!(classify_tier("Olá, tudo bem com você por aí?"), ComplexityTier::Trivial);
        assert_eq!(classify_tier("bom dia"), ComplexityTier::Trivial);
    }

    #[test]
    fn test_trivial_length_boundary() {
        // 19 chars, no keyword -> trivial
        let msg19 = "a".repeat(19);
        assert_eq!(classify_tier(&msg19), ComplexityTier::Trivial);

        // 20 chars, no keyword -> not automatically trivial
        let msg20 = "a".repeat(20);
        assert_eq!(classify_tier(&msg20), ComplexityTier::Simple);
    }

    #[test]
    fn test_elaboration_is_complex() {
        let msg = "Explique detalhadamente como resolver uma equação de segundo grau usando a fórmula de Bhaskara";
        assert_eq!(classify_tier(msg), ComplexityTier::Complex);
        assert_eq!(classify_module(msg), ModuleTag::LessonContent);
    }

    #[test]
    fn test_elaboration_keyword_needs_length() {
        // Keyword present but too short for the complex tier
        assert_eq!(classify_tier("analise isso aqui já"), ComplexityTier::Simple);
    }

    #[test]
    fn test_default_is_simple() {
        assert_eq!(
            classify_tier("qual a capital da Austrália mesmo?"),
            ComplexityTier::Simple
        );
    }

    #[test]
    fn test_module_order_exam_first() {
        // Matches both exam and lesson vocab; exam-prep wins by order
        let msg = "quero um simulado com aulas de revisão";
        assert_eq!(classify_module(msg), ModuleTag::ExamPrep);
    }

    #[test]
    fn test_module_essay() {
        assert_eq!(
            classify_module("pode corrigir minha redação sobre meio ambiente?"),
            ModuleTag::EssayWriting
        );
    }

    #[test]
    fn test_module_default() {
        assert_eq!(classify_module("oi"), ModuleTag::General);
    }

    #[test]
    fn test_determinism() {
        let msg = "Explique detalhadamente a fotossíntese para mim por favor";
        let first = classify(msg);
        for _ in 0..10 {
            assert_eq!(classify(msg), first);
        }
    }

    #[test]
    fn test_module_parse() {
        assert_eq!(ModuleTag::parse("enem"), Some(ModuleTag::ExamPrep));
        assert_eq!(ModuleTag::parse("REDACAO"), Some(ModuleTag::EssayWriting));
        assert_eq!(ModuleTag::parse("banana"), None);
    }
}
