//! Translation of captions and category labels into the user's language.
//!
//! Two independent backends are configured: one tuned for long free-form text
//! (captions) and one for short labels (categories).

pub mod deepl;
pub mod papago;

use anyhow::Result as AnyResult;
use std::fmt;

use crate::config::{TranslationConfig, TranslatorConfig, TranslatorProviderType};
use crate::error::{AnnotationError, Result};

pub use deepl::DeepLTranslator;
pub use papago::PapagoTranslator;

/// A single translation backend with a fixed source and target language.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> AnyResult<String>;

    /// Get the provider name for logs
    fn provider_name(&self) -> &'static str;
}

/// Which backend profile a piece of text goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Caption,
    Label,
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextKind::Caption => "caption",
            TextKind::Label => "label",
        })
    }
}

pub fn create_translator(config: &TranslatorConfig) -> Box<dyn Translator> {
    match config.provider {
        TranslatorProviderType::DeepL => Box::new(DeepLTranslator::new(config)),
        TranslatorProviderType::Papago => Box::new(PapagoTranslator::new(config)),
    }
}

pub struct TranslationGateway {
    caption: Box<dyn Translator>,
    label: Box<dyn Translator>,
}

impl TranslationGateway {
    pub fn new(caption: Box<dyn Translator>, label: Box<dyn Translator>) -> Self {
        Self { caption, label }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(
            create_translator(&config.caption),
            create_translator(&config.label),
        )
    }

    /// Translate `text` with the backend for `kind`. A blank result counts as a failure.
    pub fn translate(&self, text: &str, kind: TextKind) -> Result<String> {
        let translator = match kind {
            TextKind::Caption => &self.caption,
            TextKind::Label => &self.label,
        };

        let translated = translator
            .translate(text)
            .map_err(|e| AnnotationError::Translation {
                kind,
                reason: format!("{} ({}): {:#}", translator.provider_name(), text, e),
            })?;

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(AnnotationError::Translation {
                kind,
                reason: format!(
                    "{} returned an empty translation for {:?}",
                    translator.provider_name(),
                    text
                ),
            });
        }

        tracing::debug!(
            %kind,
            provider = translator.provider_name(),
            source = text,
            translated,
            "Translated"
        );
        Ok(translated.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTranslator;

    #[test]
    fn test_kind_selects_backend() {
        let caption = FakeTranslator::with(&[("a dog on grass", "잔디 위의 개")]);
        let label = FakeTranslator::with(&[("dog", "개")]);
        let caption_calls = caption.calls.clone();
        let label_calls = label.calls.clone();
        let gateway = TranslationGateway::new(Box::new(caption), Box::new(label));

        assert_eq!(
            gateway.translate("a dog on grass", TextKind::Caption).unwrap(),
            "잔디 위의 개"
        );
        assert_eq!(gateway.translate("dog", TextKind::Label).unwrap(), "개");

        assert_eq!(*caption_calls.lock().unwrap(), vec!["a dog on grass"]);
        assert_eq!(*label_calls.lock().unwrap(), vec!["dog"]);
    }

    #[test]
    fn test_failure_carries_kind() {
        let gateway = TranslationGateway::new(
            Box::new(FakeTranslator::default()),
            Box::new(FakeTranslator::default().failing_on("cat")),
        );
        match gateway.translate("cat", TextKind::Label) {
            Err(AnnotationError::Translation { kind, reason }) => {
                assert_eq!(kind, TextKind::Label);
                assert!(reason.contains("quota exceeded"));
            }
            other => panic!("expected translation error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_translation_is_error() {
        let gateway = TranslationGateway::new(
            Box::new(FakeTranslator::with(&[("x", "   ")])),
            Box::new(FakeTranslator::default()),
        );
        assert!(matches!(
            gateway.translate("x", TextKind::Caption),
            Err(AnnotationError::Translation {
                kind: TextKind::Caption,
                ..
            })
        ));
    }

    #[test]
    fn test_result_is_trimmed() {
        let gateway = TranslationGateway::new(
            Box::new(FakeTranslator::default()),
            Box::new(FakeTranslator::with(&[("outdoor", " 야외\n")])),
        );
        assert_eq!(gateway.translate("outdoor", TextKind::Label).unwrap(), "야외");
    }
}
