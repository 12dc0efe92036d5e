//! Output formatting for scan results.
//!
//! Supports three output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the event map, keyed by event name
//! - YAML: the same document as JSON

use colored::*;
use serde::Serialize;

use crate::event::EventEntry;
use crate::orchestrator::ScanOutcome;
use crate::schema::PropertySchema;

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Pretty,
    Json,
    Yaml,
}

/// Render the event map as pretty-printed JSON.
pub fn render_json<T: Serialize + ?Sized>(events: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(events)
}

/// Render the event map as YAML.
pub fn render_yaml<T: Serialize + ?Sized>(events: &T) -> serde_yaml::Result<String> {
    serde_yaml::to_string(events)
}

/// Compact one-line description of a schema, e.g. `{id: string, tags: string[]}`.
pub fn describe_schema(schema: &PropertySchema) -> String {
    match schema {
        PropertySchema::Primitive { ty } => ty.to_string(),
        PropertySchema::Array { items } => match items.as_ref() {
            PropertySchema::Primitive { ty } if ty.as_str().contains(' ') => {
                format!("({})[]", ty)
            }
            other => format!("{}[]", describe_schema(other)),
        },
        PropertySchema::Object { fields } if fields.is_empty() => "{}".to_string(),
        PropertySchema::Object { fields } => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(name, schema)| format!("{}: {}", name, describe_schema(schema)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Write results in pretty (human-readable) format.
pub fn write_pretty(path: &str, outcome: &ScanOutcome) {
    println!();
    print!("  ");
    print!("{}", "trackscan".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    println!();

    write_summary(outcome);
    println!();

    for (name, entry) in &outcome.events {
        write_event(name, entry);
        println!();
    }
}

fn write_summary(outcome: &ScanOutcome) {
    let plural = if outcome.events.len() != 1 { "s" } else { "" };
    print!(
        "  {} event{} in {} files",
        outcome.events.len().to_string().bold(),
        plural,
        outcome.files_scanned
    );
    if outcome.files_failed > 0 {
        print!(
            "  {}",
            format!("({} skipped)", outcome.files_failed).yellow()
        );
    }
    println!();
}

fn write_event(name: &str, entry: &EventEntry) {
    println!("  {}", name.green().bold());

    for implementation in &entry.implementations {
        print!("    {:<16}", implementation.destination.as_str().dimmed());
        print!("{}", implementation.path.blue());
        print!("{}", format!(":{}", implementation.line).dimmed());
        println!("  {}", implementation.function);
    }

    if !entry.properties.is_empty() {
        println!("    {}", "Properties:".bold());
        for (property, schema) in &entry.properties {
            println!("      {:<24} {}", property, describe_schema(schema));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMap;
    use crate::schema::Properties;

    #[test]
    fn test_describe_nested_schema() {
        let mut item = Properties::new();
        item.insert("sku".into(), PropertySchema::string());
        item.insert("qty".into(), PropertySchema::number());
        let schema = PropertySchema::array(PropertySchema::object(item));
        assert_eq!(describe_schema(&schema), "{qty: number, sku: string}[]");

        let union = PropertySchema::array(PropertySchema::label("number | string"));
        assert_eq!(describe_schema(&union), "(number | string)[]");
        assert_eq!(describe_schema(&PropertySchema::object(Properties::new())), "{}");
    }

    #[test]
    fn test_json_and_yaml_agree() {
        let events = EventMap::new();
        assert_eq!(render_json(&events).unwrap(), "{}");
        assert_eq!(render_yaml(&events).unwrap().trim(), "{}");
    }
}
