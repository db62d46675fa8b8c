use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge an ontology with external data and derive occurrence statistics",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge a data table into an ontology and write the annotated tree
    Annotate(AnnotateArgs),
    /// Report which nodes lack the node key or size fields after merging
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// JSON ontology file with nested `children`
    #[arg(long = "ontology")]
    pub ontology: Option<PathBuf>,
    /// Delimited file with additional data to merge into the ontology
    #[arg(short = 'i', long = "in-data")]
    pub in_data: Option<PathBuf>,
    /// MASST profile (YAML) providing the ontology path and key fields
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Ontology field compared against the data key column [default: name]
    #[arg(long = "node-key")]
    pub node_key: Option<String>,
    /// Data column compared against the ontology node key [default: group_value]
    #[arg(long = "data-key")]
    pub data_key: Option<String>,
    /// Delimiter of the data file (supports ',', 'tab', ';', '|'); tab unless `.csv`
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the data file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AnnotateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output JSON file (stdout if omitted or `-`)
    #[arg(short = 'o', long = "out-tree")]
    pub out_tree: Option<PathBuf>,
    /// Pretty-print the output JSON (true or false)
    #[arg(long = "pretty", default_value_t = true, action = clap::ArgAction::Set, value_parser = parse_bool)]
    pub pretty: bool,
    /// Set `field=value` on every node after annotation (value parsed as JSON when possible)
    #[arg(long = "set-field", action = clap::ArgAction::Append, value_parser = parse_assignment)]
    pub set_fields: Vec<(String, Value)>,
    /// Set `field=value` on both pie_data entries of every node
    #[arg(long = "set-pie-field", action = clap::ArgAction::Append, value_parser = parse_assignment)]
    pub set_pie_fields: Vec<(String, Value)>,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        other => Err(format!("Invalid boolean '{other}'")),
    }
}

/// Parses `field=value`; the value is JSON when it parses as such, text otherwise.
pub fn parse_assignment(value: &str) -> Result<(String, Value), String> {
    let (field, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected field=value, got '{value}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err("Field name cannot be empty".to_string());
    }
    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), parsed))
}
