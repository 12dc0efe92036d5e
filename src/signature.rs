//! Custom tracking function signatures.
//!
//! Callers describe in-house tracking wrappers with a short textual form:
//!
//! ```text
//! trackEvent                               // event at 0, properties at 1
//! Analytics.log(EVENT_NAME, PROPERTIES)
//! track(userId, EVENT_NAME, PROPERTIES, ctx)  // userId and ctx become properties
//! ```

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SignatureParseError;

lazy_static! {
    static ref SIGNATURE_RE: Regex =
        Regex::new(r"^\s*([A-Za-z0-9_$.:]+)\s*(?:\(([^)]*)\))?\s*$").unwrap();
}

const EVENT_TOKEN: &str = "EVENT_NAME";
const PROPERTIES_TOKEN: &str = "PROPERTIES";

/// A positional parameter that is neither the event name nor the properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraParam {
    pub index: usize,
    pub name: String,
}

/// A parsed custom tracking function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSignature {
    /// The function name as written (`track`, `Analytics.log`, `Mod::Track.call`).
    pub function_name: String,
    /// `function_name` split on `.` and `::`.
    pub segments: Vec<String>,
    pub event_index: usize,
    /// Equals the parameter count when the list has no `PROPERTIES` slot.
    pub properties_index: usize,
    pub extra_params: Vec<ExtraParam>,
}

impl CustomSignature {
    /// Exact match against a callee path, compared right to left.
    pub fn matches<S: AsRef<str>>(&self, callee: &[S]) -> bool {
        self.segments.len() == callee.len()
            && self
                .segments
                .iter()
                .rev()
                .zip(callee.iter().rev())
                .all(|(want, got)| want == got.as_ref())
    }
}

impl FromStr for CustomSignature {
    type Err = SignatureParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Err(SignatureParseError::Empty);
        }

        let caps = SIGNATURE_RE
            .captures(raw)
            .ok_or_else(|| SignatureParseError::Malformed(raw.to_string()))?;

        let function_name = caps[1].to_string();
        let segments: Vec<String> = function_name
            .split("::")
            .flat_map(|part| part.split('.'))
            .map(str::to_string)
            .collect();
        if segments.iter().any(String::is_empty) {
            return Err(SignatureParseError::Malformed(raw.to_string()));
        }

        let Some(params) = caps.get(2) else {
            return Ok(CustomSignature {
                function_name,
                segments,
                event_index: 0,
                properties_index: 1,
                extra_params: Vec::new(),
            });
        };

        let params: Vec<&str> = params
            .as_str()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut event_index = None;
        let mut properties_index = None;
        let mut extra_params = Vec::new();

        for (index, param) in params.iter().enumerate() {
            if param.eq_ignore_ascii_case(EVENT_TOKEN) {
                if event_index.replace(index).is_some() {
                    return Err(SignatureParseError::DuplicateToken(
                        raw.to_string(),
                        EVENT_TOKEN,
                    ));
                }
            } else if param.eq_ignore_ascii_case(PROPERTIES_TOKEN) {
                if properties_index.replace(index).is_some() {
                    return Err(SignatureParseError::DuplicateToken(
                        raw.to_string(),
                        PROPERTIES_TOKEN,
                    ));
                }
            } else {
                extra_params.push(ExtraParam {
                    index,
                    name: param.to_string(),
                });
            }
        }

        let event_index =
            event_index.ok_or_else(|| SignatureParseError::MissingEventName(raw.to_string()))?;

        Ok(CustomSignature {
            function_name,
            segments,
            event_index,
            properties_index: properties_index.unwrap_or(params.len()),
            extra_params,
        })
    }
}

/// Parse every signature, failing on the first malformed one.
pub fn parse_signatures<S: AsRef<str>>(
    raw: &[S],
) -> Result<Vec<CustomSignature>, SignatureParseError> {
    raw.iter().map(|s| s.as_ref().parse()).collect()
}

/// Find the first signature matching a callee path.
pub fn find_match<'a, S: AsRef<str>>(
    signatures: &'a [CustomSignature],
    callee: &[S],
) -> Option<&'a CustomSignature> {
    signatures.iter().find(|sig| sig.matches(callee))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_defaults() {
        let sig: CustomSignature = "customTrackFunction".parse().unwrap();
        assert_eq!(sig.function_name, "customTrackFunction");
        assert_eq!(sig.event_index, 0);
        assert_eq!(sig.properties_index, 1);
        assert!(sig.extra_params.is_empty());
    }

    #[test]
    fn test_extra_params_interleaved() {
        let sig: CustomSignature = "customTrackFunction5(userId, EVENT_NAME, PROPERTIES, ctx)"
            .parse()
            .unwrap();
        assert_eq!(sig.event_index, 1);
        assert_eq!(sig.properties_index, 2);
        assert_eq!(
            sig.extra_params,
            vec![
                ExtraParam { index: 0, name: "userId".into() },
                ExtraParam { index: 3, name: "ctx".into() },
            ]
        );
    }

    #[test]
    fn test_missing_properties_defaults_to_last() {
        let sig: CustomSignature = "track(userId, EVENT_NAME)".parse().unwrap();
        assert_eq!(sig.event_index, 1);
        assert_eq!(sig.properties_index, 2);
    }

    #[test]
    fn test_tokens_are_case_insensitive() {
        let sig: CustomSignature = "track(event_name, properties)".parse().unwrap();
        assert_eq!(sig.event_index, 0);
        assert_eq!(sig.properties_index, 1);
    }

    #[test]
    fn test_missing_event_name_is_an_error() {
        let err = "track(userId, PROPERTIES)".parse::<CustomSignature>().unwrap_err();
        assert!(matches!(err, SignatureParseError::MissingEventName(_)));

        let err = "track()".parse::<CustomSignature>().unwrap_err();
        assert!(matches!(err, SignatureParseError::MissingEventName(_)));
    }

    #[test]
    fn test_malformed_and_empty() {
        assert_eq!("  ".parse::<CustomSignature>(), Err(SignatureParseError::Empty));
        assert!(matches!(
            "track(EVENT_NAME".parse::<CustomSignature>(),
            Err(SignatureParseError::Malformed(_))
        ));
        assert!(matches!(
            "a..b".parse::<CustomSignature>(),
            Err(SignatureParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_duplicate_token_rejected() {
        assert!(matches!(
            "track(EVENT_NAME, EVENT_NAME)".parse::<CustomSignature>(),
            Err(SignatureParseError::DuplicateToken(_, "EVENT_NAME"))
        ));
    }

    #[test]
    fn test_dotted_and_ruby_paths_match_exactly() {
        let sig: CustomSignature = "this.props.customTrackFunction6(EVENT_NAME, PROPERTIES)"
            .parse()
            .unwrap();
        assert!(sig.matches(&["this", "props", "customTrackFunction6"]));
        assert!(!sig.matches(&["props", "customTrackFunction6"]));
        assert!(!sig.matches(&["this", "Props", "customTrackFunction6"]));

        let ruby: CustomSignature = "Telemetry::Client.track".parse().unwrap();
        assert_eq!(ruby.segments, vec!["Telemetry", "Client", "track"]);
    }

    #[test]
    fn test_parse_signatures_fails_on_first_bad_entry() {
        let raw = vec!["ok".to_string(), "bad(PROPERTIES)".to_string()];
        assert!(parse_signatures(&raw).is_err());

        let sigs = parse_signatures(&["a", "b.c(EVENT_NAME)"]).unwrap();
        assert_eq!(find_match(&sigs, &["b", "c"]).map(|s| s.function_name.as_str()), Some("b.c"));
        assert!(find_match(&sigs, &["c"]).is_none());
    }
}
