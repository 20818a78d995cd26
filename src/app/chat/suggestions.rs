use std::collections::HashMap;

use crate::services::retrieval::RecipeCandidate;

pub const NONE_OF_THESE: &str = "❌ لا أريد أي من هذه الخيارات";
pub const CHOOSE_PROMPT: &str = "اختر رقم من الاختيارات التالية:";

/// Pending "pick one of these recipes" question
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionState {
    original_question: String,
    titles: Vec<String>,
    documents: HashMap<String, String>,
}

/// What a numeric reply refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Choice<'a> {
    Recipe { title: &'a str, document: &'a str },
    NoneOfThese,
    Invalid,
}

impl SuggestionState {
    /// Unique titles in ranking order; `None` when there is nothing to offer.
    ///
    /// Duplicate titles keep the document of their best-ranked candidate.
    pub fn new(original_question: impl Into<String>, candidates: Vec<RecipeCandidate>) -> Option<Self> {
        let mut titles = Vec::new();
        let mut documents = HashMap::new();
        for candidate in candidates {
            if documents.contains_key(&candidate.title) {
                continue;
            }
            titles.push(candidate.title.clone());
            documents.insert(candidate.title, candidate.document);
        }
        if titles.is_empty() {
            return None;
        }
        Some(Self {
            original_question: original_question.into(),
            titles,
            documents,
        })
    }

    pub fn original_question(&self) -> &str {
        &self.original_question
    }

    /// Titles followed by the "none of these" entry
    pub fn options(&self) -> Vec<String> {
        let mut options = self.titles.clone();
        options.push(NONE_OF_THESE.to_string());
        options
    }

    /// Resolves a 0-based index into the list from [`options`](Self::options)
    pub fn resolve(&self, index: usize) -> Choice<'_> {
        if index == self.titles.len() {
            return Choice::NoneOfThese;
        }
        let Some(title) = self.titles.get(index) else {
            return Choice::Invalid;
        };
        match self.documents.get(title) {
            Some(document) => Choice::Recipe { title, document },
            None => Choice::Invalid,
        }
    }
}

/// Parses a 1-based option number typed by the user.
///
/// Western, Arabic-Indic and Persian digits are accepted.
pub fn parse_choice_number(input: &str) -> Option<usize> {
    let trimmed = input.trim().trim_end_matches(['.', ')', '-']);
    if trimmed.is_empty() {
        return None;
    }
    let ascii: String = trimmed
        .chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from_u32(c as u32 - 0x0660 + '0' as u32).unwrap_or(c),
            '\u{06F0}'..='\u{06F9}' => char::from_u32(c as u32 - 0x06F0 + '0' as u32).unwrap_or(c),
            other => other,
        })
        .collect();
    ascii.parse().ok()
}
