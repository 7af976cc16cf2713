//! Fetch strategies: the closed set of techniques for retrieving a target.
//!
//! Strategies are ordered simplest-first; the fetch engine walks this order,
//! escalating to more expensive techniques as cheaper ones fail. The headless
//! variants delegate to an injected renderer and only enter the trial order
//! when one is available.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One concrete technique for fetching a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// Plain GET with a stable library User-Agent.
    Plain,
    /// GET with a randomized browser fingerprint (rotating User-Agent,
    /// standard navigation headers).
    RotatingHeaders,
    /// Hardened request profile for anti-bot filtering: cookie store plus
    /// the full `Sec-Fetch-*` header set.
    AntiBot,
    /// Headless Chromium render via the injected renderer.
    HeadlessChromium,
    /// Headless Firefox render via the injected renderer.
    HeadlessFirefox,
    /// Headless WebKit render via the injected renderer.
    HeadlessWebkit,
}

/// Capability class of a strategy. When a Simple strategy is actively
/// blocked, the fetch engine skips the remaining Simple strategies and
/// escalates straight to the Advanced ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyClass {
    Simple,
    Advanced,
}

impl FetchStrategy {
    /// Returns the human-readable name of this strategy.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::RotatingHeaders => "rotating-headers",
            Self::AntiBot => "anti-bot",
            Self::HeadlessChromium => "headless-chromium",
            Self::HeadlessFirefox => "headless-firefox",
            Self::HeadlessWebkit => "headless-webkit",
        }
    }

    /// Capability class used for blocked-skip decisions.
    pub fn class(&self) -> StrategyClass {
        match self {
            Self::Plain | Self::RotatingHeaders => StrategyClass::Simple,
            Self::AntiBot | Self::HeadlessChromium | Self::HeadlessFirefox | Self::HeadlessWebkit => {
                StrategyClass::Advanced
            }
        }
    }

    /// Whether this strategy needs an injected page renderer.
    pub fn needs_renderer(&self) -> bool {
        matches!(
            self,
            Self::HeadlessChromium | Self::HeadlessFirefox | Self::HeadlessWebkit
        )
    }

    /// Default trial order, simplest to most expensive.
    pub fn default_order() -> &'static [FetchStrategy] {
        &[
            Self::Plain,
            Self::RotatingHeaders,
            Self::AntiBot,
            Self::HeadlessChromium,
            Self::HeadlessFirefox,
            Self::HeadlessWebkit,
        ]
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_simplest_first() {
        let order = FetchStrategy::default_order();
        assert_eq!(order[0], FetchStrategy::Plain);
        assert_eq!(order[1], FetchStrategy::RotatingHeaders);
        // Simple strategies precede every Advanced one.
        let first_advanced = order
            .iter()
            .position(|s| s.class() == StrategyClass::Advanced)
            .expect("some advanced strategy");
        assert!(order[..first_advanced]
            .iter()
            .all(|s| s.class() == StrategyClass::Simple));
    }

    #[test]
    fn classes_match_capability() {
        assert_eq!(FetchStrategy::Plain.class(), StrategyClass::Simple);
        assert_eq!(FetchStrategy::RotatingHeaders.class(), StrategyClass::Simple);
        assert_eq!(FetchStrategy::AntiBot.class(), StrategyClass::Advanced);
        assert_eq!(
            FetchStrategy::HeadlessChromium.class(),
            StrategyClass::Advanced
        );
    }

    #[test]
    fn renderer_requirement() {
        assert!(!FetchStrategy::Plain.needs_renderer());
        assert!(!FetchStrategy::AntiBot.needs_renderer());
        assert!(FetchStrategy::HeadlessFirefox.needs_renderer());
        assert!(FetchStrategy::HeadlessWebkit.needs_renderer());
    }

    #[test]
    fn display_uses_kebab_names() {
        assert_eq!(FetchStrategy::Plain.to_string(), "plain");
        assert_eq!(FetchStrategy::AntiBot.to_string(), "anti-bot");
        assert_eq!(
            FetchStrategy::HeadlessChromium.to_string(),
            "headless-chromium"
        );
    }

    #[test]
    fn strategy_is_hashable_and_copyable() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(FetchStrategy::Plain);
        set.insert(FetchStrategy::Plain);
        assert_eq!(set.len(), 1);
    }
}
