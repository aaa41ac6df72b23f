//! Reply content filter

/// Denylist match over assistant replies.
#[derive(Debug, Clone)]
pub struct ContentGuard {
    markers: Vec<String>,
    refusal: String,
}

impl ContentGuard {
    pub fn new(markers: &[String], project_name: &str) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
            refusal: format!(
                "Warning: Inappropriate content detected. I'm {}, here to help with your budget and expenses.",
                project_name
            ),
        }
    }

    pub fn is_unsafe(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.markers.iter().any(|m| !m.is_empty() && lowered.contains(m.as_str()))
    }

    /// Replace unsafe content with the refusal text.
    pub fn screen(&self, content: String) -> (String, bool) {
        if self.is_unsafe(&content) {
            (self.refusal.clone(), true)
        } else {
            (content, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    fn guard() -> ContentGuard {
        let config = AgentConfig::default();
        ContentGuard::new(&config.unsafe_markers, &config.project_name)
    }

    #[test]
    fn test_flags_markers_case_insensitively() {
        let guard = guard();
        assert!(guard.is_unsafe("This is Inappropriate content"));
        assert!(guard.is_unsafe("contains HATE SPEECH"));
        assert!(!guard.is_unsafe("Your budget is ready."));
    }

    #[test]
    fn test_screen_replaces_content() {
        let (content, flagged) = guard().screen("explicit content here".to_string());
        assert!(flagged);
        assert_eq!(
            content,
            "Warning: Inappropriate content detected. I'm Aza Man, here to help with your budget and expenses."
        );

        let (content, flagged) = guard().screen("Budget created!".to_string());
        assert!(!flagged);
        assert_eq!(content, "Budget created!");
    }
}
