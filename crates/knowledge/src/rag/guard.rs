//! Domain guard: greetings and off-topic questions get a fixed reply
//! before any retrieval or generation happens.

use regex::Regex;
use tessera_core::config::DomainGuardSettings;
use tessera_core::{AppError, AppResult};

/// How a question relates to the corpus domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Greeting,
    InDomain,
    OffTopic,
}

#[derive(Debug, Clone)]
pub struct DomainGuard {
    greetings: Vec<String>,
    keywords: Vec<String>,
    patterns: Vec<Regex>,
    greeting_reply: String,
    off_topic_reply: String,
}

impl DomainGuard {
    /// `None` when the guard is disabled.
    ///
    /// # Errors
    /// `InvalidConfiguration` if a pattern is not a valid regular expression.
    pub fn from_settings(settings: &DomainGuardSettings) -> AppResult<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }

        let patterns = settings
            .patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p)).map_err(|e| {
                    AppError::InvalidConfiguration(format!(
                        "Invalid rag.domainGuard pattern '{}': {}",
                        p, e
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(Self {
            greetings: lowercase(&settings.greetings),
            keywords: lowercase(&settings.keywords),
            patterns,
            greeting_reply: settings.greeting_reply.clone(),
            off_topic_reply: settings.off_topic_reply.clone(),
        }))
    }

    pub fn classify(&self, question: &str) -> Scope {
        let q = question.trim().to_lowercase();

        let is_greeting = self.greetings.iter().any(|g| {
            q == *g || q.strip_prefix(g.as_str()).is_some_and(|rest| {
                rest.starts_with(' ') || rest.starts_with(',')
            })
        });
        if is_greeting {
            return Scope::Greeting;
        }

        if self.patterns.iter().any(|re| re.is_match(&q))
            || self.keywords.iter().any(|k| q.contains(k.as_str()))
        {
            Scope::InDomain
        } else {
            Scope::OffTopic
        }
    }

    /// Fixed reply for `scope`, or `None` when the question should be answered.
    pub fn reply(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Greeting => Some(self.greeting_reply.as_str()),
            Scope::OffTopic => Some(self.off_topic_reply.as_str()),
            Scope::InDomain => None,
        }
    }
}

fn lowercase(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> DomainGuard {
        DomainGuard::from_settings(&DomainGuardSettings::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_greetings() {
        let guard = guard();
        assert_eq!(guard.classify("Bonjour"), Scope::Greeting);
        assert_eq!(guard.classify("  hello, who are you?"), Scope::Greeting);
        assert_eq!(guard.classify("Good morning"), Scope::Greeting);
        assert_eq!(guard.classify("history of Carthage"), Scope::InDomain);
        assert_eq!(guard.classify("hiking near Tunis"), Scope::OffTopic);
    }

    #[test]
    fn test_domain_keywords_and_patterns() {
        let guard = guard();
        assert_eq!(guard.classify("When was Carthage founded?"), Scope::InDomain);
        assert_eq!(
            guard.classify("Parle-moi de l'amphithéâtre d'El Jem"),
            Scope::InDomain
        );
        assert_eq!(guard.classify("Who lived in Kerkuan?"), Scope::InDomain);
        assert_eq!(guard.classify("What is the capital of France?"), Scope::OffTopic);
    }

    #[test]
    fn test_replies() {
        let guard = guard();
        assert!(guard.reply(Scope::Greeting).unwrap().starts_with("Hello!"));
        assert!(guard.reply(Scope::OffTopic).unwrap().starts_with("Sorry"));
        assert!(guard.reply(Scope::InDomain).is_none());
    }

    #[test]
    fn test_disabled_and_invalid_settings() {
        let disabled = DomainGuardSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(DomainGuard::from_settings(&disabled).unwrap().is_none());

        let invalid = DomainGuardSettings {
            patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            DomainGuard::from_settings(&invalid),
            Err(AppError::InvalidConfiguration(_))
        ));
    }
}
