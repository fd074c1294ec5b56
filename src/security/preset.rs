//! Security preset resolution.
//!
//! A preset is a fixed set of overrides applied on top of the configured
//! security options. Resolution works on a clone, so the caller's value is
//! never touched and resolving twice gives the same result as resolving once.

use std::cmp::{max, min};

use crate::config::{Preset, SecurityConfig, SECURE_MAX_REQUESTS, SECURE_MIN_WINDOW_MS};

/// Applies the configured preset and returns the effective security options.
///
/// - `off` disables every optional stage and HTTPS.
/// - `secure` forces proxy trust, an allowlist-only CORS policy, security
///   headers and a rate limit of at most 200 requests per 10+ minutes.
///   The IP allowlist and HTTPS settings are kept as configured.
/// - `dev` leaves the options untouched.
pub fn resolve(security: &SecurityConfig) -> SecurityConfig {
    let mut resolved = security.clone();

    match resolved.preset {
        Preset::Off => {
            resolved.cors.enabled = false;
            resolved.helmet.enabled = false;
            resolved.rate_limit.enabled = false;
            resolved.ip_allowlist.enabled = false;
            resolved.https.enabled = false;
        }
        Preset::Secure => {
            resolved.trust_proxy = true;
            resolved.cors.enabled = true;
            resolved.cors.allow_all_in_dev = false;
            resolved.rate_limit.enabled = true;
            resolved.rate_limit.window_ms = max(resolved.rate_limit.window_ms, SECURE_MIN_WINDOW_MS);
            resolved.rate_limit.max = min(resolved.rate_limit.max, SECURE_MAX_REQUESTS);
            resolved.helmet.enabled = true;
        }
        Preset::Dev => {}
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everything_on(preset: Preset) -> SecurityConfig {
        let mut security = SecurityConfig {
            preset,
            ..SecurityConfig::default()
        };
        security.cors.enabled = true;
        security.helmet.enabled = true;
        security.rate_limit.enabled = true;
        security.ip_allowlist.enabled = true;
        security.https.enabled = true;
        security.https.redirect_http_to_https = true;
        security
    }

    fn everything_off(preset: Preset) -> SecurityConfig {
        let mut security = SecurityConfig {
            preset,
            trust_proxy: false,
            ..SecurityConfig::default()
        };
        security.cors.enabled = false;
        security.helmet.enabled = false;
        security.rate_limit.enabled = false;
        security.rate_limit.window_ms = 1000;
        security.rate_limit.max = 5000;
        security.ip_allowlist.enabled = false;
        security
    }

    #[test]
    fn test_off_disables_every_stage() {
        let resolved = resolve(&everything_on(Preset::Off));
        assert!(!resolved.cors.enabled);
        assert!(!resolved.helmet.enabled);
        assert!(!resolved.rate_limit.enabled);
        assert!(!resolved.ip_allowlist.enabled);
        assert!(!resolved.https.enabled);
        // Not an `.enabled` flag; passed through.
        assert!(resolved.https.redirect_http_to_https);
    }

    #[test]
    fn test_secure_forces_hardening() {
        let mut input = everything_off(Preset::Secure);
        input.cors.allow_all_in_dev = true;

        let resolved = resolve(&input);
        assert!(resolved.trust_proxy);
        assert!(resolved.cors.enabled);
        assert!(!resolved.cors.allow_all_in_dev);
        assert!(resolved.helmet.enabled);
        assert!(resolved.rate_limit.enabled);
        assert_eq!(resolved.rate_limit.window_ms, SECURE_MIN_WINDOW_MS);
        assert_eq!(resolved.rate_limit.max, SECURE_MAX_REQUESTS);
        assert!(!resolved.ip_allowlist.enabled);
        assert_eq!(resolved.https, input.https);
    }

    #[test]
    fn test_secure_keeps_stricter_limits() {
        let mut input = SecurityConfig {
            preset: Preset::Secure,
            ..SecurityConfig::default()
        };
        input.rate_limit.window_ms = 60 * 60 * 1000;
        input.rate_limit.max = 20;
        input.ip_allowlist.enabled = true;

        let resolved = resolve(&input);
        assert_eq!(resolved.rate_limit.window_ms, 60 * 60 * 1000);
        assert_eq!(resolved.rate_limit.max, 20);
        assert!(resolved.ip_allowlist.enabled);
    }

    #[test]
    fn test_dev_is_identity() {
        for input in [everything_on(Preset::Dev), everything_off(Preset::Dev)] {
            assert_eq!(resolve(&input), input);
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for preset in [Preset::Dev, Preset::Secure, Preset::Off] {
            for input in [everything_on(preset), everything_off(preset)] {
                let once = resolve(&input);
                assert_eq!(resolve(&once), once, "preset {}", preset);
            }
        }
    }

    #[test]
    fn test_resolve_does_not_mutate_input() {
        for preset in [Preset::Dev, Preset::Secure, Preset::Off] {
            let input = everything_off(preset);
            let snapshot = input.clone();
            let _ = resolve(&input);
            assert_eq!(input, snapshot);
        }
    }
}
