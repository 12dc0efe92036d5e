//! Tracking events and their directory-level aggregation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::providers::Source;
use crate::schema::{merge_properties, Properties};

/// One detected tracking call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingEvent {
    pub event_name: String,
    pub source: Source,
    pub properties: Properties,
    pub file_path: PathBuf,
    /// 1-based line of the call.
    pub line: usize,
    /// Enclosing function, or `global` at module scope.
    pub function_name: String,
}

impl TrackingEvent {
    fn dedupe_key(&self) -> (Source, &str, usize, &str) {
        (self.source, &self.event_name, self.line, &self.function_name)
    }
}

/// Drop repeated detections of the same call, keeping the first.
pub fn dedupe_events(events: Vec<TrackingEvent>) -> Vec<TrackingEvent> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(events.len());
    for event in events {
        let key = {
            let (source, name, line, function) = event.dedupe_key();
            (source, name.to_string(), line, function.to_string())
        };
        if seen.insert(key) {
            kept.push(event);
        }
    }
    kept
}

/// Where an event is fired from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImplementation {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    pub line: usize,
    pub function: String,
    pub destination: Source,
}

/// Aggregated view of one event name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub implementations: Vec<EventImplementation>,
    pub properties: Properties,
}

/// Event name to aggregated entry.
pub type EventMap = BTreeMap<String, EventEntry>;

/// Accumulates events from many files into an `EventMap`.
#[derive(Debug)]
pub struct EventCatalog {
    root: PathBuf,
    events: EventMap,
}

impl EventCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            events: EventMap::new(),
        }
    }

    /// Fold one event in. A repeated implementation site is recorded once;
    /// properties are union-merged with the newer schema winning.
    pub fn add(&mut self, event: TrackingEvent) {
        let implementation = EventImplementation {
            path: relative_path(&self.root, &event.file_path),
            line: event.line,
            function: event.function_name,
            destination: event.source,
        };

        let entry = self.events.entry(event.event_name).or_default();
        if !entry.implementations.contains(&implementation) {
            entry.implementations.push(implementation);
        }
        merge_properties(&mut entry.properties, event.properties);
    }

    pub fn extend<I: IntoIterator<Item = TrackingEvent>>(&mut self, events: I) {
        for event in events {
            self.add(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_map(self) -> EventMap {
        self.events
    }
}

/// Render `path` relative to `root` with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rendered = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if rendered.is_empty() {
        // Single-file scans are rooted at the file itself.
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertySchema;

    fn event(name: &str, file: &str, line: usize, props: &[(&str, PropertySchema)]) -> TrackingEvent {
        TrackingEvent {
            event_name: name.to_string(),
            source: Source::Segment,
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            file_path: PathBuf::from("/repo").join(file),
            line,
            function_name: "doSignup".to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first_of_identical_keys() {
        let a = event("Signed Up", "a.js", 3, &[("plan", PropertySchema::string())]);
        let b = event("Signed Up", "a.js", 3, &[("other", PropertySchema::number())]);
        let c = event("Signed Up", "a.js", 4, &[]);

        let kept = dedupe_events(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(kept, vec![a.clone(), c.clone()]);

        let reversed = dedupe_events(vec![c.clone(), b.clone(), a]);
        assert_eq!(reversed.len(), 2);
        assert_eq!(reversed[1], b);
    }

    #[test]
    fn test_dedupe_distinguishes_source() {
        let a = event("x", "a.js", 1, &[]);
        let mut b = a.clone();
        b.source = Source::Custom;
        assert_eq!(dedupe_events(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_catalog_unions_properties_across_files() {
        let mut catalog = EventCatalog::new("/repo");
        catalog.add(event(
            "Signed Up",
            "src/a.js",
            10,
            &[("plan", PropertySchema::string()), ("trial", PropertySchema::boolean())],
        ));
        catalog.add(event(
            "Signed Up",
            "src/b.js",
            20,
            &[("plan", PropertySchema::number()), ("source", PropertySchema::string())],
        ));

        let map = catalog.into_map();
        let entry = &map["Signed Up"];
        assert_eq!(entry.implementations.len(), 2);
        assert_eq!(entry.implementations[0].path, "src/a.js");
        assert_eq!(entry.implementations[1].line, 20);
        assert_eq!(entry.properties.len(), 3);
        assert_eq!(entry.properties["plan"], PropertySchema::number());
    }

    #[test]
    fn test_catalog_records_repeated_site_once() {
        let mut catalog = EventCatalog::new("/repo");
        catalog.add(event("x", "a.js", 1, &[]));
        catalog.add(event("x", "a.js", 1, &[]));
        assert_eq!(catalog.into_map()["x"].implementations.len(), 1);
    }

    #[test]
    fn test_relative_path_for_single_file_root() {
        let root = Path::new("/repo/a.js");
        assert_eq!(relative_path(root, root), "a.js");
        assert_eq!(relative_path(Path::new("/repo"), Path::new("/repo/x/y.go")), "x/y.go");
    }
}
