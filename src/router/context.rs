//! Keyword-based context classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RouterError;
use crate::provider::Message;

/// Kind of request a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    CodeGeneration,
    DataAnalysis,
    CreativeWriting,
    TechnicalSupport,
    Research,
    #[serde(rename = "general_chat")]
    General,
}

impl ContextType {
    /// Classification order. Earlier entries win ties.
    pub const ALL: [ContextType; 6] = [
        Self::CodeGeneration,
        Self::DataAnalysis,
        Self::CreativeWriting,
        Self::TechnicalSupport,
        Self::Research,
        Self::General,
    ];

    /// Key used for routing rules in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::DataAnalysis => "data_analysis",
            Self::CreativeWriting => "creative_writing",
            Self::TechnicalSupport => "technical_support",
            Self::Research => "research",
            Self::General => "general_chat",
        }
    }

    /// Lower-case keywords, English and Portuguese.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::CodeGeneration => &[
                "code", "function", "program", "script", "class", "def", "import", "debug",
                "bug", "compile", "refactor", "python", "javascript", "código", "programar",
                "função", "erro",
            ],
            Self::DataAnalysis => &[
                "data", "analysis", "analyze", "chart", "graph", "statistic", "csv", "excel",
                "spreadsheet", "table", "report", "dados", "análise", "gráfico", "estatística",
                "tabela", "relatório",
            ],
            Self::CreativeWriting => &[
                "story", "poem", "creative", "narrative", "character", "screenplay", "fiction",
                "lyrics", "história", "poema", "criativo", "narrativa", "personagem", "roteiro",
                "ficção",
            ],
            Self::TechnicalSupport => &[
                "configure", "install", "error", "problem", "solution", "tutorial", "how to",
                "troubleshoot", "configurar", "instalar", "erro", "problema", "solução",
                "como fazer",
            ],
            Self::Research => &[
                "research", "information", "study", "article", "reference", "source",
                "bibliography", "pesquisar", "informação", "estudo", "artigo", "referência",
                "fonte", "bibliografia",
            ],
            Self::General => &[],
        }
    }

    /// Total keyword occurrences in an already lower-cased message.
    fn score(&self, message_lower: &str) -> usize {
        self.keywords()
            .iter()
            .map(|kw| message_lower.matches(kw).count())
            .sum()
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            other => Self::ALL
                .into_iter()
                .find(|c| c.as_str() == other)
                .ok_or_else(|| RouterError::UnknownContext(other.to_string())),
        }
    }
}

/// Classify a message by keyword occurrences.
///
/// The category with the strictly highest count wins, ties go to the earlier
/// category in [`ContextType::ALL`], and a message with no hits is
/// [`ContextType::General`]. The history does not influence the result.
pub fn classify(message: &str, _history: &[Message]) -> ContextType {
    let lower = message.to_lowercase();
    let mut best = ContextType::General;
    let mut best_score = 0;

    for context in ContextType::ALL {
        let score = context.score(&lower);
        if score > best_score {
            best = context;
            best_score = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_hits() {
        assert_eq!(classify("write a function", &[]), ContextType::CodeGeneration);
        assert_eq!(classify("hello there", &[]), ContextType::General);
        assert_eq!(classify("", &[]), ContextType::General);
        assert_eq!(
            classify("Plot a chart from this CSV data", &[]),
            ContextType::DataAnalysis
        );
        assert_eq!(
            classify("Escreva um poema sobre o mar", &[]),
            ContextType::CreativeWriting
        );
        assert_eq!(
            classify("Find a reference article for my study", &[]),
            ContextType::Research
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("WRITE A FUNCTION", &[]), ContextType::CodeGeneration);
    }

    #[test]
    fn test_occurrences_counted() {
        // one code hit ("bug") against two technical hits
        assert_eq!(
            classify("install fails, how to fix this bug", &[]),
            ContextType::TechnicalSupport
        );
    }

    #[test]
    fn test_tie_goes_to_earlier_category() {
        // "code" (code generation) vs "story" (creative writing), one hit each
        assert_eq!(classify("code story", &[]), ContextType::CodeGeneration);
        // "chart" (data analysis) vs "article" (research)
        assert_eq!(classify("chart article", &[]), ContextType::DataAnalysis);
    }

    #[test]
    fn test_parse_round_names() {
        for context in ContextType::ALL {
            assert_eq!(context.as_str().parse::<ContextType>().unwrap(), context);
        }
        assert_eq!("general".parse::<ContextType>().unwrap(), ContextType::General);
        assert!("nonsense".parse::<ContextType>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&ContextType::General).unwrap(),
            "\"general_chat\""
        );
        assert_eq!(
            serde_json::to_string(&ContextType::CodeGeneration).unwrap(),
            "\"code_generation\""
        );
    }
}
