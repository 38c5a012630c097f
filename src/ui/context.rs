//! UI context for deciding between styled and plain output

use std::io::IsTerminal;

/// CI environment indicators that force plain output
const CI_VARS: [&str; 8] = [
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Whether stdout is an interactive terminal outside CI
    styled: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            styled: Self::detect_styled(),
        }
    }

    /// Plain output regardless of environment (for testing or piping)
    pub fn plain() -> Self {
        Self { styled: false }
    }

    /// Whether output should carry colors
    pub fn use_styled_output(&self) -> bool {
        self.styled
    }

    fn detect_styled() -> bool {
        // Build tools usually pipe our stdout into logs
        if !std::io::stdout().is_terminal() {
            return false;
        }

        if std::env::var("CI").is_ok() {
            return false;
        }

        !CI_VARS.iter().any(|var| std::env::var(var).is_ok())
    }
}
