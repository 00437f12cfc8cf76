//! Capability Probe
//!
//! Answers whether the host is touch-capable and whether it enforces an
//! autoplay policy. The answer decides how the session manager reacts when a
//! start is refused.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment override for the detected platform class
pub const PLATFORM_ENV: &str = "CLIPDECK_PLATFORM";

pub trait CapabilityProbe: Send + Sync {
    fn is_touch_capable(&self) -> bool;

    fn is_constrained_autoplay_platform(&self) -> bool;
}

/// Coarse platform class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformClass {
    /// Detect from the compile target and `CLIPDECK_PLATFORM`
    #[default]
    Auto,
    Desktop,
    /// Touch-first device without a strict autoplay policy
    Touch,
    /// Mobile-class device: touch input and audio only after a gesture
    Constrained,
}

impl PlatformClass {
    fn touch(self) -> bool {
        matches!(self, PlatformClass::Touch | PlatformClass::Constrained)
    }

    fn constrained(self) -> bool {
        matches!(self, PlatformClass::Constrained)
    }
}

impl FromStr for PlatformClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(PlatformClass::Auto),
            "desktop" => Ok(PlatformClass::Desktop),
            "touch" => Ok(PlatformClass::Touch),
            "constrained" | "mobile" => Ok(PlatformClass::Constrained),
            other => Err(format!("unknown platform class '{}'", other)),
        }
    }
}

fn target_class() -> PlatformClass {
    if cfg!(any(target_os = "android", target_os = "ios")) {
        PlatformClass::Constrained
    } else {
        PlatformClass::Desktop
    }
}

fn detect_from_env() -> PlatformClass {
    match std::env::var(PLATFORM_ENV) {
        Ok(value) => match value.parse::<PlatformClass>() {
            Ok(PlatformClass::Auto) => target_class(),
            Ok(class) => class,
            Err(e) => {
                warn!("Ignoring {}: {}", PLATFORM_ENV, e);
                target_class()
            }
        },
        Err(_) => target_class(),
    }
}

static DETECTED: OnceLock<PlatformClass> = OnceLock::new();

/// Probe backed by platform detection, computed once per process.
///
/// An explicit class from configuration wins over detection.
#[derive(Debug, Clone, Copy)]
pub struct PlatformProbe {
    class: PlatformClass,
}

impl PlatformProbe {
    pub fn detect() -> Self {
        Self::with_override(PlatformClass::Auto)
    }

    pub fn with_override(class: PlatformClass) -> Self {
        let class = match class {
            PlatformClass::Auto => *DETECTED.get_or_init(|| {
                let detected = detect_from_env();
                debug!("Detected platform class: {:?}", detected);
                detected
            }),
            explicit => explicit,
        };
        Self { class }
    }

    pub fn class(&self) -> PlatformClass {
        self.class
    }
}

impl CapabilityProbe for PlatformProbe {
    fn is_touch_capable(&self) -> bool {
        self.class.touch()
    }

    fn is_constrained_autoplay_platform(&self) -> bool {
        self.class.constrained()
    }
}

/// Fixed answers, for hosts that already know their platform and for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe {
    pub touch: bool,
    pub constrained: bool,
}

impl StaticProbe {
    pub fn desktop() -> Self {
        Self::default()
    }

    pub fn mobile() -> Self {
        Self {
            touch: true,
            constrained: true,
        }
    }
}

impl CapabilityProbe for StaticProbe {
    fn is_touch_capable(&self) -> bool {
        self.touch
    }

    fn is_constrained_autoplay_platform(&self) -> bool {
        self.constrained
    }
}

/// Reaction to `AutoplayBlocked` from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayStrategy {
    /// Retry the start once silently before parking in `BlockedPending`
    ImmediateRetry,
    /// Park in `BlockedPending` at once; the next gesture retries
    WaitForGesture,
}

impl AutoplayStrategy {
    pub fn select(probe: &dyn CapabilityProbe) -> Self {
        if probe.is_touch_capable() || probe.is_constrained_autoplay_platform() {
            AutoplayStrategy::WaitForGesture
        } else {
            AutoplayStrategy::ImmediateRetry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            AutoplayStrategy::select(&StaticProbe::desktop()),
            AutoplayStrategy::ImmediateRetry
        );
        assert_eq!(
            AutoplayStrategy::select(&StaticProbe::mobile()),
            AutoplayStrategy::WaitForGesture
        );
        let touch_only = StaticProbe {
            touch: true,
            constrained: false,
        };
        assert_eq!(
            AutoplayStrategy::select(&touch_only),
            AutoplayStrategy::WaitForGesture
        );
    }

    #[test]
    fn test_platform_class_parsing() {
        assert_eq!("Desktop".parse::<PlatformClass>(), Ok(PlatformClass::Desktop));
        assert_eq!("mobile".parse::<PlatformClass>(), Ok(PlatformClass::Constrained));
        assert!("toaster".parse::<PlatformClass>().is_err());
    }

    #[test]
    fn test_explicit_override_skips_detection() {
        let probe = PlatformProbe::with_override(PlatformClass::Touch);
        assert!(probe.is_touch_capable());
        assert!(!probe.is_constrained_autoplay_platform());
    }
}
