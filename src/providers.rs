//! Built-in analytics providers and their call shapes.
//!
//! Lookup keys are `receiver.method` with the receiver lower-cased, so
//! `mParticle.logEvent` and `mparticle.logEvent` resolve to the same provider
//! while method names stay exact.

use std::fmt;
use std::str::FromStr;

use phf::phf_map;
use serde::{Deserialize, Serialize};

/// Where a tracking call sends its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Segment,
    Mixpanel,
    Amplitude,
    Rudderstack,
    Mparticle,
    Posthog,
    Pendo,
    Heap,
    Datadog,
    Snowplow,
    Gtm,
    #[serde(rename = "googleanalytics")]
    GoogleAnalytics,
    Custom,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Segment => "segment",
            Source::Mixpanel => "mixpanel",
            Source::Amplitude => "amplitude",
            Source::Rudderstack => "rudderstack",
            Source::Mparticle => "mparticle",
            Source::Posthog => "posthog",
            Source::Pendo => "pendo",
            Source::Heap => "heap",
            Source::Datadog => "datadog",
            Source::Snowplow => "snowplow",
            Source::Gtm => "gtm",
            Source::GoogleAnalytics => "googleanalytics",
            Source::Custom => "custom",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "segment" => Ok(Source::Segment),
            "mixpanel" => Ok(Source::Mixpanel),
            "amplitude" => Ok(Source::Amplitude),
            "rudderstack" => Ok(Source::Rudderstack),
            "mparticle" => Ok(Source::Mparticle),
            "posthog" => Ok(Source::Posthog),
            "pendo" => Ok(Source::Pendo),
            "heap" => Ok(Source::Heap),
            "datadog" => Ok(Source::Datadog),
            "snowplow" => Ok(Source::Snowplow),
            "gtm" => Ok(Source::Gtm),
            "googleanalytics" => Ok(Source::GoogleAnalytics),
            "custom" => Ok(Source::Custom),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

/// JavaScript and TypeScript member calls.
static JS_MEMBER_CALLS: phf::Map<&'static str, Source> = phf_map! {
    "analytics.track" => Source::Segment,
    "mixpanel.track" => Source::Mixpanel,
    "amplitude.track" => Source::Amplitude,
    "amplitude.logEvent" => Source::Amplitude,
    "rudderanalytics.track" => Source::Rudderstack,
    "mparticle.logEvent" => Source::Mparticle,
    "posthog.capture" => Source::Posthog,
    "pendo.track" => Source::Pendo,
    "heap.track" => Source::Heap,
    "datadogrum.addAction" => Source::Datadog,
    "dd_rum.addAction" => Source::Datadog,
    "tracker.track" => Source::Snowplow,
    "snowplow.track" => Source::Snowplow,
    "datalayer.push" => Source::Gtm,
};

/// JavaScript and TypeScript bare function calls.
static JS_FUNCTION_CALLS: phf::Map<&'static str, Source> = phf_map! {
    "gtag" => Source::GoogleAnalytics,
};

static PYTHON_MEMBER_CALLS: phf::Map<&'static str, Source> = phf_map! {
    "analytics.track" => Source::Segment,
    "segment.track" => Source::Segment,
    "mp.track" => Source::Mixpanel,
    "mixpanel.track" => Source::Mixpanel,
    "rudder_analytics.track" => Source::Rudderstack,
    "rudderanalytics.track" => Source::Rudderstack,
    "posthog.capture" => Source::Posthog,
    "tracker.track_struct_event" => Source::Snowplow,
};

static RUBY_MEMBER_CALLS: phf::Map<&'static str, Source> = phf_map! {
    "analytics.track" => Source::Segment,
    "segment.track" => Source::Segment,
    "rudder.track" => Source::Rudderstack,
    "rudderanalytics.track" => Source::Rudderstack,
    "rudder_analytics.track" => Source::Rudderstack,
    "tracker.track" => Source::Mixpanel,
    "mixpanel.track" => Source::Mixpanel,
    "posthog.capture" => Source::Posthog,
    "amplitudeapi.track" => Source::Amplitude,
    "tracker.track_struct_event" => Source::Snowplow,
    "snowplow.track_struct_event" => Source::Snowplow,
};

/// Go providers keyed by the composite literal type passed to the client.
static GO_EVENT_TYPES: phf::Map<&'static str, Source> = phf_map! {
    "analytics.track" => Source::Segment,
    "posthog.capture" => Source::Posthog,
    "amplitude.event" => Source::Amplitude,
    "mixpanel.event" => Source::Mixpanel,
    "structuredevent" => Source::Snowplow,
};

/// Provider tables for one language family.
#[derive(Debug, Clone, Copy)]
pub struct ProviderTable {
    members: &'static phf::Map<&'static str, Source>,
    functions: Option<&'static phf::Map<&'static str, Source>>,
}

pub const JAVASCRIPT: ProviderTable = ProviderTable {
    members: &JS_MEMBER_CALLS,
    functions: Some(&JS_FUNCTION_CALLS),
};

pub const PYTHON: ProviderTable = ProviderTable {
    members: &PYTHON_MEMBER_CALLS,
    functions: None,
};

pub const RUBY: ProviderTable = ProviderTable {
    members: &RUBY_MEMBER_CALLS,
    functions: None,
};

impl ProviderTable {
    /// Match a callee path. The receiver is the segment right before the method,
    /// so `window.DD_RUM.addAction` matches `dd_rum.addAction`.
    pub fn lookup<S: AsRef<str>>(&self, callee: &[S]) -> Option<Source> {
        match callee {
            [] => None,
            [function] => self
                .functions
                .and_then(|table| table.get(function.as_ref()).copied()),
            [.., receiver, method] => {
                let key = format!("{}.{}", receiver.as_ref().to_lowercase(), method.as_ref());
                self.members.get(key.as_str()).copied()
            }
        }
    }
}

/// Match a Go composite literal type such as `analytics.Track` or `sp.StructuredEvent`.
pub fn go_event_type(type_name: &str) -> Option<Source> {
    let type_name = type_name.trim_start_matches(['*', '&']);
    let lowered = type_name.to_lowercase();
    if let Some(source) = GO_EVENT_TYPES.get(lowered.as_str()) {
        return Some(*source);
    }
    let bare = lowered.rsplit('.').next().unwrap_or(&lowered);
    GO_EVENT_TYPES.get(bare).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_is_case_insensitive() {
        assert_eq!(JAVASCRIPT.lookup(&["mParticle", "logEvent"]), Some(Source::Mparticle));
        assert_eq!(JAVASCRIPT.lookup(&["mparticle", "logEvent"]), Some(Source::Mparticle));
        assert_eq!(JAVASCRIPT.lookup(&["Analytics", "track"]), Some(Source::Segment));
        assert_eq!(JAVASCRIPT.lookup(&["analytics", "Track"]), None);
    }

    #[test]
    fn test_nested_receivers() {
        assert_eq!(
            JAVASCRIPT.lookup(&["window", "DD_RUM", "addAction"]),
            Some(Source::Datadog)
        );
        assert_eq!(
            JAVASCRIPT.lookup(&["window", "dataLayer", "push"]),
            Some(Source::Gtm)
        );
    }

    #[test]
    fn test_functions_only_where_declared() {
        assert_eq!(JAVASCRIPT.lookup(&["gtag"]), Some(Source::GoogleAnalytics));
        assert_eq!(RUBY.lookup(&["gtag"]), None);
        assert_eq!(PYTHON.lookup::<&str>(&[]), None);
    }

    #[test]
    fn test_go_event_types() {
        assert_eq!(go_event_type("analytics.Track"), Some(Source::Segment));
        assert_eq!(go_event_type("*posthog.Capture"), Some(Source::Posthog));
        assert_eq!(go_event_type("sp.StructuredEvent"), Some(Source::Snowplow));
        assert_eq!(go_event_type("amplitude.Event"), Some(Source::Amplitude));
        assert_eq!(go_event_type("foo.Bar"), None);
    }

    #[test]
    fn test_source_round_trips_through_strings() {
        for source in [Source::GoogleAnalytics, Source::Custom, Source::Datadog] {
            assert_eq!(source.as_str().parse::<Source>(), Ok(source));
        }
        assert_eq!(
            serde_json::to_string(&Source::GoogleAnalytics).unwrap(),
            "\"googleanalytics\""
        );
    }
}
